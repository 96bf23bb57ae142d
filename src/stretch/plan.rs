//! Block planning for time-varying stretch and pitch curves.
//!
//! A realtime stretcher can only change its ratios between `process`
//! calls, so blocks are cut at the points where a curve changes value.

use crate::core::types::{semitones_to_pitch_scale, Control};
use crate::error::FxError;

/// Smallest block the planner shortens a chunk to.
pub const MIN_BLOCK: usize = 1024;
/// Slice length for the offline study pass.
pub const STUDY_BLOCK: usize = 2048;

/// Picks the next block length for a curve-driven stream.
///
/// Finds the distance `d` from `offset` to the next change in `curve` (or
/// to its end). Returns `d` clamped to `[MIN_BLOCK, max_block]` when it is
/// shorter than `current`, otherwise `current`.
///
/// # Errors
/// `Internal` if `offset` is not inside the curve.
pub fn choose_chunk_size(
    current: usize,
    offset: usize,
    curve: &[f64],
    max_block: usize,
) -> Result<usize, FxError> {
    let Some(&value) = curve.get(offset) else {
        return Err(FxError::internal(format!(
            "chunk offset {offset} outside curve of length {}",
            curve.len()
        )));
    };
    let distance = curve[offset + 1..]
        .iter()
        .position(|&v| v != value)
        .map_or(curve.len() - offset, |i| i + 1);

    if distance < current {
        Ok(distance.max(MIN_BLOCK).min(max_block))
    } else {
        Ok(current)
    }
}

/// One block of a [`StretchPlan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedChunk {
    pub offset: usize,
    pub len: usize,
    /// New time ratio to apply before processing, for stretch curves.
    pub time_ratio: Option<f64>,
    /// New pitch scale to apply before processing, for pitch curves.
    pub pitch_scale: Option<f64>,
    pub is_last: bool,
}

/// Lazy sequence of process blocks covering an input of `total` frames.
///
/// Blocks are `max_block` long unless a curve changes value sooner. Each
/// block carries the curve values read at its first frame.
#[derive(Debug, Clone)]
pub struct StretchPlan<'a> {
    stretch: Control<'a>,
    pitch: Control<'a>,
    total: usize,
    max_block: usize,
    offset: usize,
}

impl<'a> StretchPlan<'a> {
    pub fn new(stretch: Control<'a>, pitch: Control<'a>, total: usize, max_block: usize) -> Self {
        Self {
            stretch,
            pitch,
            total,
            max_block: max_block.max(1),
            offset: 0,
        }
    }

    fn next_chunk(&mut self) -> Result<PlannedChunk, FxError> {
        let offset = self.offset;
        let remaining = self.total - offset;
        let mut len = self.max_block.min(remaining);
        let mut time_ratio = None;
        let mut pitch_scale = None;

        if let Control::Curve(curve) = self.stretch {
            len = choose_chunk_size(len, offset, curve, self.max_block)?;
            time_ratio = Some(1.0 / curve[offset]);
        }
        if let Control::Curve(curve) = self.pitch {
            len = len.min(choose_chunk_size(len, offset, curve, self.max_block)?);
            pitch_scale = Some(semitones_to_pitch_scale(curve[offset]));
        }
        let len = len.min(remaining);

        self.offset += len;
        Ok(PlannedChunk {
            offset,
            len,
            time_ratio,
            pitch_scale,
            is_last: self.offset >= self.total,
        })
    }
}

impl Iterator for StretchPlan<'_> {
    type Item = Result<PlannedChunk, FxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.total {
            return None;
        }
        let chunk = self.next_chunk();
        if chunk.is_err() {
            self.offset = self.total;
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_curve_keeps_current() {
        let curve = vec![1.5; 10_000];
        assert_eq!(choose_chunk_size(4096, 0, &curve, 8192).unwrap(), 4096);
        assert_eq!(choose_chunk_size(4096, 9000, &curve, 8192).unwrap(), 1024);
    }

    #[test]
    fn cuts_at_next_change() {
        let mut curve = vec![1.0; 10_000];
        curve[3000..].fill(2.0);
        assert_eq!(choose_chunk_size(8192, 0, &curve, 8192).unwrap(), 3000);
        assert_eq!(choose_chunk_size(8192, 1000, &curve, 8192).unwrap(), 2000);
        assert_eq!(choose_chunk_size(8192, 3000, &curve, 8192).unwrap(), 7000);
    }

    #[test]
    fn short_runs_clamp_to_min_block() {
        let mut curve = vec![1.0; 4000];
        curve[10] = 2.0;
        assert_eq!(choose_chunk_size(2048, 0, &curve, 8192).unwrap(), MIN_BLOCK);
    }

    #[test]
    fn offset_past_end_is_internal() {
        let curve = vec![1.0; 8];
        assert!(matches!(
            choose_chunk_size(4, 8, &curve, 8),
            Err(FxError::Internal(_))
        ));
    }

    #[test]
    fn constant_plan_uses_max_blocks() {
        let chunks: Vec<_> = StretchPlan::new(Control::Constant(2.0), Control::Constant(0.0), 20_000, 8192)
            .collect::<Result<_, _>>()
            .unwrap();
        let lens: Vec<usize> = chunks.iter().map(|c| c.len).collect();
        assert_eq!(lens, vec![8192, 8192, 3616]);
        assert!(chunks.iter().all(|c| c.time_ratio.is_none() && c.pitch_scale.is_none()));
        assert_eq!(chunks.iter().filter(|c| c.is_last).count(), 1);
        assert!(chunks[2].is_last);
    }

    #[test]
    fn pitch_curve_intersects_stretch_curve() {
        let mut stretch = vec![1.0; 12_000];
        stretch[5000..].fill(0.5);
        let mut pitch = vec![0.0; 12_000];
        pitch[3000..].fill(12.0);
        let chunks: Vec<_> = StretchPlan::new((&stretch).into(), (&pitch).into(), 12_000, 8192)
            .collect::<Result<_, _>>()
            .unwrap();
        let bounds: Vec<(usize, usize)> = chunks.iter().map(|c| (c.offset, c.len)).collect();
        assert_eq!(bounds, vec![(0, 3000), (3000, 2000), (5000, 7000)]);
        assert_eq!(chunks[0].pitch_scale, Some(1.0));
        assert_eq!(chunks[1].pitch_scale, Some(2.0));
        assert_eq!(chunks[2].time_ratio, Some(2.0));
    }
}
