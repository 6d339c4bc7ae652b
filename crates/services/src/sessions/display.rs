use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use syneval_core::model::{OptionId, Trial};

/// Mapping from on-screen position to canonical option position for one
/// rendering of a trial.
///
/// Answers are stored by canonical position only; a display position is
/// translated through the order it was rendered with at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayOrder {
    canonical: Vec<usize>,
}

impl DisplayOrder {
    /// Options shown in canonical order.
    #[must_use]
    pub fn identity(option_count: usize) -> Self {
        Self {
            canonical: (0..option_count).collect(),
        }
    }

    /// A uniformly shuffled order.
    #[must_use]
    pub fn shuffled<R: Rng + ?Sized>(option_count: usize, rng: &mut R) -> Self {
        let mut canonical: Vec<usize> = (0..option_count).collect();
        canonical.shuffle(rng);
        Self { canonical }
    }

    /// Rebuild an order echoed back by the presentation layer.
    ///
    /// Returns `None` unless `canonical` is a permutation of `0..len`.
    #[must_use]
    pub fn from_canonical(canonical: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; canonical.len()];
        for &c in &canonical {
            match seen.get_mut(c) {
                Some(slot) if !*slot => *slot = true,
                _ => return None,
            }
        }
        Some(Self { canonical })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Canonical positions in display order.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.canonical
    }

    #[must_use]
    pub fn canonical_index(&self, display_position: usize) -> Option<usize> {
        self.canonical.get(display_position).copied()
    }

    #[must_use]
    pub fn display_position(&self, canonical_index: usize) -> Option<usize> {
        self.canonical.iter().position(|&c| c == canonical_index)
    }

    /// The trial's options as they appear on screen.
    #[must_use]
    pub fn arrange(&self, trial: &Trial) -> Vec<OptionId> {
        self.canonical
            .iter()
            .filter_map(|&c| trial.options().get(c).copied())
            .collect()
    }
}

/// Everything the presentation layer needs to render one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialPresentation {
    pub trial_index: usize,
    pub total_trials: usize,
    pub order: DisplayOrder,
    /// Options in display order.
    pub options: Vec<OptionId>,
    /// Earlier answer for this trial, as a display position in `order`.
    pub previous_choice: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use syneval_core::model::ClassId;

    fn trial() -> Trial {
        Trial::new(
            0,
            vec![OptionId::new(7), OptionId::new(8), OptionId::new(9)],
            (0..3).map(ClassId::new).collect(),
            0,
        )
        .unwrap()
    }

    #[test]
    fn shuffled_order_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let order = DisplayOrder::shuffled(4, &mut rng);
            let mut sorted = order.as_slice().to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn translates_both_ways() {
        let order = DisplayOrder::from_canonical(vec![2, 0, 1]).unwrap();
        assert_eq!(order.canonical_index(0), Some(2));
        assert_eq!(order.display_position(2), Some(0));
        assert_eq!(order.canonical_index(3), None);
        assert_eq!(
            order.arrange(&trial()),
            vec![OptionId::new(9), OptionId::new(7), OptionId::new(8)]
        );
    }

    #[test]
    fn rejects_non_permutations() {
        assert!(DisplayOrder::from_canonical(vec![0, 0, 1]).is_none());
        assert!(DisplayOrder::from_canonical(vec![0, 3, 1]).is_none());
        assert!(DisplayOrder::from_canonical(vec![1, 0]).is_some());
    }
}
