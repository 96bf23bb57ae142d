//! FFT constants and the process-wide planner shared by every stretcher.

use parking_lot::{const_mutex, MappedMutexGuard, Mutex, MutexGuard};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Planner cache shared by all stretchers. Holding the lock serialises
/// stretcher construction and destruction.
static PLANNER: Mutex<Option<FftPlanner<f32>>> = const_mutex(None);

/// Exclusive access to the shared planner.
pub type PlannerGuard = MappedMutexGuard<'static, FftPlanner<f32>>;

/// Locks the shared planner, creating it on first use.
pub fn lock_planner() -> PlannerGuard {
    MutexGuard::map(PLANNER.lock(), |slot| slot.get_or_insert_with(FftPlanner::new))
}
