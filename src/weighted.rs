use crate::error::LoadError;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

/// Items picked with probability proportional to their weight
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    items: Vec<(T, u32)>,
    index: WeightedIndex<u32>,
}

impl<T> WeightedTable<T> {
    pub fn new(items: Vec<(T, u32)>) -> Result<Self, LoadError> {
        if items.is_empty() {
            return Err(LoadError::InvalidWeights {
                reason: "no tasks registered".to_string(),
            });
        }
        let index = WeightedIndex::new(items.iter().map(|(_, w)| *w)).map_err(|e| {
            LoadError::InvalidWeights {
                reason: e.to_string(),
            }
        })?;
        Ok(Self { items, index })
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.index.sample(rng)].0
    }

    pub fn total_weight(&self) -> u32 {
        self.items.iter().map(|(_, w)| *w).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(T, u32)> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_rejects_empty_table() {
        let table: Result<WeightedTable<&str>, _> = WeightedTable::new(vec![]);
        assert!(matches!(table, Err(LoadError::InvalidWeights { .. })));
    }

    #[test]
    fn test_rejects_all_zero_weights() {
        let table = WeightedTable::new(vec![("a", 0), ("b", 0)]);
        assert!(table.is_err());
    }

    #[test]
    fn test_zero_weight_never_chosen() {
        let table = WeightedTable::new(vec![("never", 0), ("always", 5)]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_eq!(*table.choose(&mut rng), "always");
        }
    }

    #[test]
    fn test_proportional_selection() {
        // Same weights as the profile scenario: 8 / 2 / 1 / 1
        let table = WeightedTable::new(vec![
            ("view", 8),
            ("update", 2),
            ("other", 1),
            ("list", 1),
        ])
        .unwrap();
        assert_eq!(table.total_weight(), 12);
        assert_eq!(table.len(), 4);

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<&str, u32> = HashMap::new();
        let draws = 60_000;
        for _ in 0..draws {
            *counts.entry(*table.choose(&mut rng)).or_default() += 1;
        }

        let share = |k: &str| counts[k] as f64 / draws as f64;
        assert!((share("view") - 8.0 / 12.0).abs() < 0.02);
        assert!((share("update") - 2.0 / 12.0).abs() < 0.02);
        assert!((share("other") - 1.0 / 12.0).abs() < 0.02);
        assert!((share("list") - 1.0 / 12.0).abs() < 0.02);
    }
}
