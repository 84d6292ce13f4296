//! Score post-processing: softmax, top-k selection and priority ordering

use crate::classifier::LabelScore;
use candle_core::{DType, Device, IndexOp, Tensor, D};
use cerberus_core::Result;
use std::cmp::Ordering;

/// Display order applied when results are sorted by priority.
///
/// Labels outside this list are dropped by [`order_by_priority`].
pub const LABEL_PRIORITY: [&str; 4] = ["high", "medium", "low", "neutral"];

/// Convert raw logits for a single input into a host-side probability
/// distribution.
///
/// Accepts `(1, num_labels)` or `(num_labels,)`. The logits are detached,
/// copied to the CPU and widened to `f64` before a max-subtracted softmax.
pub fn probabilities(logits: &Tensor) -> Result<Vec<f64>> {
    let row = match logits.rank() {
        1 => logits.clone(),
        2 => logits.i(0).map_err(|e| {
            cerberus_core::Error::model(format!("Failed to select logits row: {}", e))
        })?,
        rank => {
            return Err(cerberus_core::Error::model(format!(
                "Expected logits of rank 1 or 2, got rank {}",
                rank
            )))
        }
    };

    let host = row
        .detach()
        .to_device(&Device::Cpu)
        .and_then(|t| t.to_dtype(DType::F64))
        .map_err(|e| {
            cerberus_core::Error::model(format!("Failed to move logits to host: {}", e))
        })?;

    candle_nn::ops::softmax(&host, D::Minus1)
        .and_then(|probs| probs.to_vec1::<f64>())
        .map_err(|e| cerberus_core::Error::model(format!("Softmax failed: {}", e)))
}

/// Validate a requested `top_k` against the number of labels
pub fn validate_top_k(top_k: Option<i64>, num_labels: usize) -> Result<Option<usize>> {
    match top_k {
        None => Ok(None),
        Some(k) if k >= 1 && (k as u64) <= num_labels as u64 => Ok(Some(k as usize)),
        Some(k) => Err(cerberus_core::Error::invalid_argument(format!(
            "top_k must be in 1..={}, got {}",
            num_labels, k
        ))),
    }
}

/// Descending by score, ascending by index on ties
fn by_score_desc(probs: &[f64]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
    move |a: &usize, b: &usize| probs[*b].total_cmp(&probs[*a]).then(a.cmp(b))
}

/// Label indices in result order.
///
/// With `top_k`, a partial selection finds the `k` best before sorting them;
/// otherwise every index is sorted. Equal scores keep label-index order.
pub fn rank(probs: &[f64], top_k: Option<usize>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..probs.len()).collect();
    let cmp = by_score_desc(probs);

    match top_k {
        Some(k) if k < indices.len() => {
            if k == 0 {
                return Vec::new();
            }
            indices.select_nth_unstable_by(k - 1, &cmp);
            indices.truncate(k);
            indices.sort_unstable_by(&cmp);
        }
        _ => indices.sort_by(&cmp),
    }

    indices
}

/// Pair ranked indices with label names
pub fn build_results(probs: &[f64], indices: &[usize], labels: &[String]) -> Vec<LabelScore> {
    indices
        .iter()
        .map(|&idx| {
            let label = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{}", idx));
            LabelScore::new(label, probs[idx])
        })
        .collect()
}

/// Reorder results to follow [`LABEL_PRIORITY`].
///
/// Only labels in the priority list survive; anything else in `results` is
/// dropped.
pub fn order_by_priority(results: Vec<LabelScore>) -> Vec<LabelScore> {
    let mut slots: Vec<Option<LabelScore>> = results.into_iter().map(Some).collect();

    LABEL_PRIORITY
        .iter()
        .filter_map(|priority| {
            // The last occurrence wins when a label repeats.
            slots
                .iter_mut()
                .rev()
                .find(|slot| matches!(slot, Some(s) if s.label == *priority))
                .and_then(Option::take)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn logits(values: &[f64]) -> Tensor {
        Tensor::new(values, &Device::Cpu)
            .unwrap()
            .unsqueeze(0)
            .unwrap()
    }

    #[test]
    fn test_zero_logits_are_uniform() {
        let probs = probabilities(&logits(&[0.0, 0.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(probs.len(), 5);
        for p in probs {
            assert!((p - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_large_logits_do_not_overflow() {
        let probs = probabilities(&logits(&[1000.0, 999.0, -1000.0])).unwrap();
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[0] > probs[1]);
        assert!(probs[2] < 1e-12);
    }

    #[test]
    fn test_f32_logits_are_widened() {
        let t = Tensor::new(&[[1.0f32, 2.0, 3.0]], &Device::Cpu).unwrap();
        let probs = probabilities(&t).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_rank_three_logits() {
        let t = Tensor::zeros((1, 1, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(probabilities(&t).is_err());
    }

    #[test]
    fn test_validate_top_k_bounds() {
        assert_eq!(validate_top_k(None, 4).unwrap(), None);
        assert_eq!(validate_top_k(Some(1), 4).unwrap(), Some(1));
        assert_eq!(validate_top_k(Some(4), 4).unwrap(), Some(4));

        for bad in [0, 5, -1, i64::MIN] {
            let err = validate_top_k(Some(bad), 4).unwrap_err();
            assert!(matches!(err, cerberus_core::Error::InvalidArgument(_)), "top_k={}", bad);
        }
    }

    #[test]
    fn test_rank_full_sort_is_stable() {
        let probs = [0.05, 0.2, 0.05, 0.7];
        assert_eq!(rank(&probs, None), vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_rank_top_k() {
        let probs = [0.05, 0.2, 0.05, 0.7];
        assert_eq!(rank(&probs, Some(2)), vec![3, 1]);
        assert_eq!(rank(&probs, Some(3)), vec![3, 1, 0]);
        assert_eq!(rank(&probs, Some(4)), vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_build_results_with_placeholder_labels() {
        let probs = [0.6, 0.4];
        let results = build_results(&probs, &[1, 0], &labels(&["neutral"]));
        assert_eq!(results[0], LabelScore::new("LABEL_1", 0.4));
        assert_eq!(results[1], LabelScore::new("neutral", 0.6));
    }

    #[test]
    fn test_priority_order() {
        let results = vec![
            LabelScore::new("neutral", 0.4),
            LabelScore::new("high", 0.3),
            LabelScore::new("low", 0.2),
            LabelScore::new("medium", 0.1),
        ];

        let ordered = order_by_priority(results);
        let names: Vec<&str> = ordered.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(names, vec!["high", "medium", "low", "neutral"]);
    }

    #[test]
    fn test_priority_order_drops_unknown_labels() {
        let results = vec![
            LabelScore::new("drawings", 0.5),
            LabelScore::new("neutral", 0.3),
            LabelScore::new("high", 0.2),
        ];

        let ordered = order_by_priority(results);
        let names: Vec<&str> = ordered.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(names, vec!["high", "neutral"]);
    }

    proptest! {
        #[test]
        fn prop_softmax_sums_to_one(values in prop::collection::vec(-80.0f64..80.0, 1..12)) {
            let probs = probabilities(&logits(&values)).unwrap();
            prop_assert_eq!(probs.len(), values.len());
            prop_assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }

        #[test]
        fn prop_top_k_holds_the_best_scores(
            probs in prop::collection::vec(0.0f64..1.0, 1..12),
            k_seed in 0usize..64,
        ) {
            let k = k_seed % probs.len() + 1;
            let picked = rank(&probs, Some(k));
            prop_assert_eq!(picked.len(), k);

            let weakest_kept = picked.iter().map(|&i| probs[i]).fold(f64::INFINITY, f64::min);
            for idx in (0..probs.len()).filter(|i| !picked.contains(i)) {
                prop_assert!(probs[idx] <= weakest_kept);
            }

            let full = rank(&probs, None);
            prop_assert_eq!(&full[..k], picked.as_slice());
        }
    }
}
