//! Scoped suppression of the stretcher's stderr diagnostics.
//!
//! Stretchers print construction warnings (extreme ratios, unusual rates)
//! straight to stderr. Library callers that render offline wrap
//! construction in a [`SuppressStderr`] guard so those lines never reach the
//! terminal. Suppression is process-wide: while any guard is alive, every
//! stretcher in the process is quiet.

use std::sync::atomic::{AtomicUsize, Ordering};

static SUPPRESS_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// RAII guard that silences stderr diagnostics until dropped.
///
/// Guards nest; output resumes when the last one drops, including when it
/// drops during unwinding.
#[derive(Debug)]
#[must_use = "suppression ends when the guard is dropped"]
pub struct SuppressStderr {
    _private: (),
}

impl SuppressStderr {
    pub fn acquire() -> Self {
        SUPPRESS_DEPTH.fetch_add(1, Ordering::AcqRel);
        Self { _private: () }
    }
}

impl Drop for SuppressStderr {
    fn drop(&mut self) {
        SUPPRESS_DEPTH.fetch_sub(1, Ordering::AcqRel);
    }
}

/// True while at least one [`SuppressStderr`] guard is alive.
#[inline]
pub fn stderr_suppressed() -> bool {
    SUPPRESS_DEPTH.load(Ordering::Acquire) > 0
}

/// `eprintln!` that honours [`SuppressStderr`].
macro_rules! diag {
    ($($arg:tt)*) => {
        if !$crate::core::quiet::stderr_suppressed() {
            eprintln!($($arg)*);
        }
    };
}
pub(crate) use diag;
