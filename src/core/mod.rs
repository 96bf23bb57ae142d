//! Buffers, stream descriptors, windows, and shared DSP plumbing.

pub mod buffer;
pub mod fft;
pub mod quiet;
pub mod ring_buffer;
pub mod types;
pub mod window;

pub use buffer::{AudioBlock, AudioBuffer, ChannelViews, ChannelViewsMut, MAX_INLINE_CHANNELS};
pub use types::*;
