use fxchain::stretch::choose_chunk_size;
use fxchain::{FxError, MIN_BLOCK};
use proptest::prelude::*;

proptest! {
    #[test]
    fn result_stays_within_bounds(
        values in prop::collection::vec(0u8..4, 1..4000),
        offset_frac in 0.0f64..1.0,
        current in 1usize..20_000,
        max_block in MIN_BLOCK..600_000usize,
    ) {
        let curve: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        let offset = ((curve.len() as f64 * offset_frac) as usize).min(curve.len() - 1);
        let chosen = choose_chunk_size(current, offset, &curve, max_block).unwrap();
        prop_assert!(chosen >= current.min(MIN_BLOCK));
        prop_assert!(chosen <= current.max(max_block));
    }

    #[test]
    fn flat_window_keeps_current(
        level in -10.0f64..10.0,
        current in 1usize..5000,
        offset in 0usize..3000,
        tail in 0usize..3000,
        max_block in MIN_BLOCK..100_000usize,
    ) {
        let mut curve = vec![level + 1.0; offset];
        curve.extend(std::iter::repeat(level).take(current));
        curve.extend(std::iter::repeat(level - 1.0).take(tail));
        let chosen = choose_chunk_size(current, offset, &curve, max_block).unwrap();
        prop_assert_eq!(chosen, current);
    }
}

#[test]
fn offset_past_end_is_an_internal_error() {
    assert!(matches!(
        choose_chunk_size(100, 10, &[1.0; 10], 8192),
        Err(FxError::Internal(_))
    ));
}

#[test]
fn cuts_at_the_first_change() {
    let mut curve = vec![1.0; 20_000];
    curve[6000..].fill(0.5);
    assert_eq!(choose_chunk_size(8192, 0, &curve, 8192).unwrap(), 6000);
    assert_eq!(choose_chunk_size(8192, 5500, &curve, 8192).unwrap(), MIN_BLOCK);
    assert_eq!(choose_chunk_size(4096, 0, &curve, 8192).unwrap(), 4096);
}
