//! Channel-major audio storage and mutable block views.

use smallvec::SmallVec;

use crate::core::types::Sample;
use crate::error::FxError;

/// Number of channel pointers kept inline before spilling to the heap.
pub const MAX_INLINE_CHANNELS: usize = 8;

/// Per-channel read-only slices, inline for common channel counts.
pub type ChannelViews<'a> = SmallVec<[&'a [Sample]; MAX_INLINE_CHANNELS]>;

/// Per-channel mutable slices, inline for common channel counts.
pub type ChannelViewsMut<'a> = SmallVec<[&'a mut [Sample]; MAX_INLINE_CHANNELS]>;

/// Non-interleaved audio buffer.
///
/// Samples are stored channel by channel. Each channel owns a run of
/// `capacity` frames of which the first `num_frames` are visible, so the
/// buffer can grow up to its capacity without moving memory.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Vec<Sample>,
    num_channels: usize,
    num_frames: usize,
    capacity: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer of the given shape.
    ///
    /// # Errors
    /// `BadParameter` for zero channels, `ResourceExhausted` if the storage
    /// cannot be allocated.
    pub fn new(num_channels: usize, num_frames: usize) -> Result<Self, FxError> {
        let mut buffer = Self::with_capacity(num_channels, num_frames)?;
        buffer.num_frames = num_frames;
        Ok(buffer)
    }

    /// Creates an empty buffer with room for `capacity` frames per channel.
    pub fn with_capacity(num_channels: usize, capacity: usize) -> Result<Self, FxError> {
        if num_channels == 0 {
            return Err(FxError::bad_parameter("audio buffer needs at least one channel"));
        }
        let data = zeroed(num_channels, capacity)?;
        Ok(Self {
            data,
            num_channels,
            num_frames: 0,
            capacity,
        })
    }

    /// Builds a buffer by copying equally sized channel slices.
    pub fn from_channels<C: AsRef<[Sample]>>(channels: &[C]) -> Result<Self, FxError> {
        let num_frames = channels.first().map_or(0, |c| c.as_ref().len());
        if channels.iter().any(|c| c.as_ref().len() != num_frames) {
            return Err(FxError::bad_parameter(
                "all channels must have the same number of frames",
            ));
        }
        let mut buffer = Self::new(channels.len(), num_frames)?;
        for (ch, src) in channels.iter().enumerate() {
            buffer.channel_mut(ch).copy_from_slice(src.as_ref());
        }
        Ok(buffer)
    }

    /// Wraps a single channel of samples.
    pub fn from_mono(samples: Vec<Sample>) -> Self {
        let num_frames = samples.len();
        Self {
            data: samples,
            num_channels: 1,
            num_frames,
            capacity: num_frames,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Frames each channel can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_frames == 0
    }

    /// Read access to one channel.
    ///
    /// # Panics
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        assert!(channel < self.num_channels, "channel index out of range");
        let start = channel * self.capacity;
        &self.data[start..start + self.num_frames]
    }

    /// Write access to one channel.
    ///
    /// # Panics
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        assert!(channel < self.num_channels, "channel index out of range");
        let start = channel * self.capacity;
        &mut self.data[start..start + self.num_frames]
    }

    /// Iterates over the visible frames of every channel.
    pub fn channels(&self) -> impl Iterator<Item = &[Sample]> + '_ {
        (0..self.num_channels).map(move |ch| self.channel(ch))
    }

    /// Copies the buffer out as one vector per channel.
    pub fn to_channels(&self) -> Vec<Vec<Sample>> {
        self.channels().map(<[Sample]>::to_vec).collect()
    }

    /// Read-only views of frames `start..start + len` on every channel.
    ///
    /// # Panics
    /// Panics if the range exceeds `num_frames()`.
    pub fn views(&self, start: usize, len: usize) -> ChannelViews<'_> {
        assert!(start + len <= self.num_frames, "view range out of bounds");
        self.channels().map(|c| &c[start..start + len]).collect()
    }

    /// Mutable block over frames `start..start + len` on every channel.
    ///
    /// # Panics
    /// Panics if the range exceeds `num_frames()`.
    pub fn block_mut(&mut self, start: usize, len: usize) -> AudioBlock<'_> {
        assert!(start + len <= self.num_frames, "block range out of bounds");
        if self.capacity == 0 {
            let channels = (0..self.num_channels).map(|_| <&mut [Sample]>::default()).collect();
            return AudioBlock { channels };
        }
        let channels = self
            .data
            .chunks_mut(self.capacity)
            .take(self.num_channels)
            .map(|c| &mut c[start..start + len])
            .collect();
        AudioBlock { channels }
    }

    /// Reserves room for at least `capacity` frames per channel.
    pub fn reserve_frames(&mut self, capacity: usize) -> Result<(), FxError> {
        if capacity <= self.capacity {
            return Ok(());
        }
        self.reallocate(self.num_channels, capacity, self.num_frames)
    }

    /// Resizes the buffer.
    ///
    /// With `keep_existing`, the first `min(old, new)` frames of each
    /// surviving channel are preserved; otherwise the contents are zeroed.
    /// With `avoid_reallocating`, existing capacity is reused whenever it
    /// suffices. Frames that become visible are always zero.
    pub fn set_size(
        &mut self,
        num_channels: usize,
        num_frames: usize,
        keep_existing: bool,
        avoid_reallocating: bool,
    ) -> Result<(), FxError> {
        if num_channels == 0 {
            return Err(FxError::bad_parameter("audio buffer needs at least one channel"));
        }

        let fits = num_channels == self.num_channels && num_frames <= self.capacity;
        let exact = num_channels == self.num_channels && num_frames == self.capacity;
        if fits && (avoid_reallocating || exact) {
            if keep_existing {
                let visible = self.num_frames;
                if num_frames > visible {
                    for ch in 0..num_channels {
                        let start = ch * self.capacity;
                        self.data[start + visible..start + num_frames].fill(0.0);
                    }
                }
            } else {
                self.data.fill(0.0);
            }
            self.num_frames = num_frames;
            return Ok(());
        }

        let keep = if keep_existing { self.num_frames.min(num_frames) } else { 0 };
        self.reallocate(num_channels, num_frames, keep)?;
        self.num_frames = num_frames;
        Ok(())
    }

    /// Changes the visible length, keeping contents and capacity where possible.
    pub fn set_num_frames(&mut self, num_frames: usize) -> Result<(), FxError> {
        self.set_size(self.num_channels, num_frames, true, true)
    }

    /// Zeroes every visible frame.
    pub fn clear(&mut self) {
        let frames = self.num_frames;
        for ch in 0..self.num_channels {
            let start = ch * self.capacity;
            self.data[start..start + frames].fill(0.0);
        }
    }

    fn reallocate(&mut self, num_channels: usize, capacity: usize, keep: usize) -> Result<(), FxError> {
        let mut data = zeroed(num_channels, capacity)?;
        if capacity > 0 {
            for (ch, dst) in data.chunks_mut(capacity).enumerate().take(self.num_channels) {
                let start = ch * self.capacity;
                dst[..keep].copy_from_slice(&self.data[start..start + keep]);
            }
        }
        self.data = data;
        self.num_channels = num_channels;
        self.capacity = capacity;
        self.num_frames = self.num_frames.min(capacity);
        Ok(())
    }
}

impl PartialEq for AudioBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.num_channels == other.num_channels
            && self.num_frames == other.num_frames
            && self.channels().zip(other.channels()).all(|(a, b)| a == b)
    }
}

fn zeroed(num_channels: usize, capacity: usize) -> Result<Vec<Sample>, FxError> {
    let total = num_channels
        .checked_mul(capacity)
        .ok_or_else(|| FxError::ResourceExhausted("audio buffer size overflows".to_string()))?;
    let mut data = Vec::new();
    data.try_reserve_exact(total)?;
    data.resize(total, 0.0);
    Ok(data)
}

/// Mutable per-channel view of a range of frames.
///
/// Processors read and write the same block: input and output alias.
#[derive(Debug)]
pub struct AudioBlock<'a> {
    channels: ChannelViewsMut<'a>,
}

impl<'a> AudioBlock<'a> {
    /// Wraps caller-owned channel slices. All slices must share a length.
    pub fn from_slices(channels: ChannelViewsMut<'a>) -> Result<Self, FxError> {
        let len = channels.first().map_or(0, |c| c.len());
        if channels.iter().any(|c| c.len() != len) {
            return Err(FxError::bad_parameter("block channels differ in length"));
        }
        Ok(Self { channels })
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        &self.channels[channel][..]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        &mut self.channels[channel][..]
    }

    /// Read-only views of every channel.
    pub fn views(&self) -> ChannelViews<'_> {
        self.channels.iter().map(|c| &**c).collect()
    }

    /// All channel slices, for APIs that write per-channel output.
    #[inline]
    pub fn as_mut_slices(&mut self) -> &mut [&'a mut [Sample]] {
        &mut self.channels
    }

    /// Iterates over the channel slices for in-place writes.
    #[inline]
    pub fn channels_mut(&mut self) -> std::slice::IterMut<'_, &'a mut [Sample]> {
        self.channels.iter_mut()
    }

    pub fn fill(&mut self, value: Sample) {
        for ch in self.channels.iter_mut() {
            ch.fill(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buf = AudioBuffer::new(2, 16).unwrap();
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.num_frames(), 16);
        assert!(buf.channels().all(|c| c.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn zero_channels_rejected() {
        assert!(matches!(
            AudioBuffer::new(0, 10),
            Err(FxError::BadParameter(_))
        ));
    }

    #[test]
    fn from_channels_rejects_ragged_input() {
        let err = AudioBuffer::from_channels(&[vec![0.0; 4], vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, FxError::BadParameter(_)));
    }

    #[test]
    fn grow_within_capacity_keeps_data_and_zeroes_new_frames() {
        let mut buf = AudioBuffer::with_capacity(2, 8).unwrap();
        buf.set_num_frames(3).unwrap();
        buf.channel_mut(0).copy_from_slice(&[1.0, 2.0, 3.0]);
        buf.channel_mut(1).copy_from_slice(&[4.0, 5.0, 6.0]);
        buf.set_num_frames(2).unwrap();
        buf.set_num_frames(6).unwrap();
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.channel(0), &[1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(buf.channel(1), &[4.0, 5.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn grow_past_capacity_reallocates_and_keeps_data() {
        let mut buf = AudioBuffer::from_channels(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        buf.set_size(2, 5, true, true).unwrap();
        assert_eq!(buf.capacity(), 5);
        assert_eq!(buf.channel(0), &[1.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(buf.channel(1), &[3.0, 4.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn shrink_without_avoid_realloc_trims_capacity() {
        let mut buf = AudioBuffer::new(1, 10).unwrap();
        buf.set_size(1, 4, true, false).unwrap();
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.num_frames(), 4);
    }

    #[test]
    fn block_mut_writes_through() {
        let mut buf = AudioBuffer::new(2, 6).unwrap();
        {
            let mut block = buf.block_mut(2, 3);
            assert_eq!(block.num_channels(), 2);
            assert_eq!(block.num_frames(), 3);
            block.fill(0.5);
        }
        assert_eq!(buf.channel(0), &[0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(buf.channel(1), &[0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn channels_mut_edits_each_channel_in_place() {
        let mut buf = AudioBuffer::from_channels(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        {
            let mut block = buf.block_mut(1, 2);
            for (gain, channel) in [2.0, -1.0].into_iter().zip(block.channels_mut()) {
                for s in &mut channel[..] {
                    *s *= gain;
                }
            }
        }
        assert_eq!(buf.channel(0), &[1.0, 4.0, 6.0]);
        assert_eq!(buf.channel(1), &[4.0, -5.0, -6.0]);
    }

    #[test]
    fn block_of_empty_buffer_has_all_channels() {
        let mut buf = AudioBuffer::new(3, 0).unwrap();
        let block = buf.block_mut(0, 0);
        assert_eq!(block.num_channels(), 3);
        assert_eq!(block.num_frames(), 0);
    }

    #[test]
    fn equality_ignores_spare_capacity() {
        let mut a = AudioBuffer::with_capacity(1, 8).unwrap();
        a.set_num_frames(2).unwrap();
        a.channel_mut(0).copy_from_slice(&[1.0, 2.0]);
        let b = AudioBuffer::from_mono(vec![1.0, 2.0]);
        assert_eq!(a, b);
    }
}
