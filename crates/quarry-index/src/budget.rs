//! Greedy token-budgeted batch packing.

pub use quarry_llm::tiered::estimate_tokens;

/// Split `items` into contiguous batches whose summed token estimate stays
/// under `ceiling` (already net of any fixed prompt overhead).
///
/// Greedy and order-preserving, not optimal bin-packing: batches may be
/// under-full, which buys determinism and single-pass streaming. An item
/// whose own count exceeds the ceiling still gets a batch of its own;
/// items are never split. Empty input yields one empty batch; call sites
/// filter it out before spending an LLM call on it.
pub fn pack_batches<T>(
    items: impl IntoIterator<Item = T>,
    ceiling: usize,
    count: impl Fn(&T) -> usize,
) -> Vec<Vec<T>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut tokens = 0usize;

    for item in items {
        let cnt = count(&item);
        if !current.is_empty() && tokens + cnt > ceiling {
            batches.push(std::mem::take(&mut current));
            tokens = 0;
        }
        tokens += cnt;
        current.push(item);
    }

    batches.push(current);
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenated_batches_reproduce_input() {
        let items: Vec<usize> = vec![3, 9, 1, 7, 7, 2, 11, 5];
        let batches = pack_batches(items.clone(), 12, |n| *n);
        let rejoined: Vec<usize> = batches.into_iter().flatten().collect();
        assert_eq!(rejoined, items);
    }

    #[test]
    fn no_batch_exceeds_ceiling_except_oversized_singleton() {
        let items: Vec<usize> = vec![3, 9, 1, 30, 7, 2];
        let batches = pack_batches(items, 12, |n| *n);
        for batch in &batches {
            let total: usize = batch.iter().sum();
            assert!(total <= 12 || batch.len() == 1);
        }
    }

    #[test]
    fn adjacent_items_over_ceiling_split_into_singletons() {
        let batches = pack_batches(vec![10usize, 15, 8], 20, |n| *n);
        assert_eq!(batches, vec![vec![10], vec![15], vec![8]]);
    }

    #[test]
    fn items_under_ceiling_share_a_batch() {
        let batches = pack_batches(vec![5usize, 5, 5], 20, |n| *n);
        assert_eq!(batches, vec![vec![5, 5, 5]]);
    }

    #[test]
    fn oversized_item_gets_own_batch() {
        let batches = pack_batches(vec![100usize, 1], 20, |n| *n);
        assert_eq!(batches, vec![vec![100], vec![1]]);
    }

    #[test]
    fn oversized_first_item_does_not_create_empty_batch() {
        let batches = pack_batches(vec![100usize], 20, |n| *n);
        assert_eq!(batches, vec![vec![100]]);
    }

    #[test]
    fn empty_input_yields_one_empty_batch() {
        let batches = pack_batches(Vec::<usize>::new(), 20, |n| *n);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }

    #[test]
    fn exact_fit_stays_in_batch() {
        let batches = pack_batches(vec![10usize, 10], 20, |n| *n);
        assert_eq!(batches, vec![vec![10, 10]]);
    }

    #[test]
    fn packs_strings_by_token_estimate() {
        let items = vec!["a".repeat(40), "b".repeat(60), "c".repeat(32)];
        // 10, 15, and 8 tokens under the chars/4 heuristic.
        let batches = pack_batches(items, 20, |s| estimate_tokens(s));
        assert_eq!(batches.len(), 3);
    }
}
