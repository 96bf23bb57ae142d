//! Analysis/synthesis windows for the phase vocoder.

use std::f64::consts::PI;

/// Generates a periodic Hann window.
///
/// Unlike the symmetric form, the periodic window sums to a constant under
/// overlap-add at any hop that divides `size / 2`.
pub fn hann_periodic(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = (2.0 * PI * i as f64) / n;
            (0.5 * (1.0 - x.cos())) as f32
        })
        .collect()
}

/// Constant sum of the squared periodic Hann window under overlap-add.
///
/// Applying the window at analysis and again at synthesis yields
/// `Σ w² = 3·size / (8·hop)` for hops of at most `size / 4`.
#[inline]
pub fn hann_squared_overlap_gain(size: usize, hop: usize) -> f32 {
    if hop == 0 {
        return 1.0;
    }
    (3.0 * size as f64 / (8.0 * hop as f64)) as f32
}

/// Applies a window function to a slice in-place.
#[inline]
pub fn apply_window(data: &mut [f32], window: &[f32]) {
    for (sample, &w) in data.iter_mut().zip(window.iter()) {
        *sample *= w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn periodic_hann_shape() {
        let w = hann_periodic(1024);
        assert_eq!(w.len(), 1024);
        assert!(w[0].abs() < 1e-6);
        assert_relative_eq!(w[512], 1.0, epsilon = 1e-6);
        // Periodic: w[i] == w[N - i]
        for i in 1..512 {
            assert!((w[i] - w[1024 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn squared_overlap_is_constant() {
        for &(size, hop) in &[(1024usize, 256usize), (2048, 256)] {
            let w = hann_periodic(size);
            let gain = hann_squared_overlap_gain(size, hop);
            for n in 0..hop {
                let sum: f32 = (0..size / hop).map(|k| w[n + k * hop].powi(2)).sum();
                assert_relative_eq!(sum, gain, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn degenerate_sizes() {
        assert!(hann_periodic(0).is_empty());
        assert_eq!(hann_periodic(1), vec![1.0]);
    }

    #[test]
    fn test_apply_window() {
        let window = vec![0.5, 1.0, 0.5];
        let mut data = vec![2.0, 3.0, 4.0];
        apply_window(&mut data, &window);
        assert_eq!(data, vec![1.0, 3.0, 2.0]);
    }
}
