//! Multi-input axis merging

use crate::profile::MergeOp;

/// Combine raw samples taken in the same tick.
///
/// `samples` is used as scratch space and may be reordered. Accumulating
/// operators sum in sorted order so the result depends only on the multiset
/// of samples. An empty slice yields 0.0.
pub fn combine(op: MergeOp, samples: &mut [f32]) -> f32 {
    match samples.len() {
        0 => return 0.0,
        1 if op != MergeOp::Sum => return samples[0],
        _ => {}
    }

    match op {
        MergeOp::Average => sorted_sum(samples) / samples.len() as f32,
        MergeOp::Maximum => samples.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        MergeOp::Minimum => samples.iter().copied().fold(f32::INFINITY, f32::min),
        MergeOp::Sum => sorted_sum(samples).clamp(-1.0, 1.0),
    }
}

fn sorted_sum(samples: &mut [f32]) -> f32 {
    samples.sort_unstable_by(f32::total_cmp);
    samples.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_inputs() {
        assert_eq!(combine(MergeOp::Average, &mut [0.2, 0.8]), 0.5);
        assert_eq!(combine(MergeOp::Maximum, &mut [0.2, 0.8]), 0.8);
        assert_eq!(combine(MergeOp::Minimum, &mut [0.2, 0.8]), 0.2);
        assert_eq!(combine(MergeOp::Sum, &mut [0.2, 0.8]), 1.0);
    }

    #[test]
    fn test_sum_clamps() {
        assert_eq!(combine(MergeOp::Sum, &mut [0.7, 0.8]), 1.0);
        assert_eq!(combine(MergeOp::Sum, &mut [-0.7, -0.8, -0.1]), -1.0);
        assert_eq!(combine(MergeOp::Sum, &mut [1.5]), 1.0);
    }

    #[test]
    fn test_single_input_passthrough() {
        for op in [MergeOp::Average, MergeOp::Maximum, MergeOp::Minimum] {
            assert_eq!(combine(op, &mut [-0.3]), -0.3);
        }
    }

    #[test]
    fn test_no_inputs() {
        assert_eq!(combine(MergeOp::Maximum, &mut []), 0.0);
    }

    #[test]
    fn test_order_independent() {
        let a = combine(MergeOp::Average, &mut [0.1, 0.7, -0.35, 0.9]);
        let b = combine(MergeOp::Average, &mut [0.9, -0.35, 0.1, 0.7]);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
