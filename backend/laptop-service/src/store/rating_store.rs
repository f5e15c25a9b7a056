use dashmap::DashMap;

/// Running score total for one laptop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rating {
    pub count: u32,
    pub sum: f64,
}

impl Rating {
    /// `sum / count`, `None` before the first score
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Per-laptop rating accumulator
///
/// Each `add` holds only the shard lock for its own key, so raters of
/// different laptops never contend.
#[derive(Debug, Default)]
pub struct RatingStore {
    ratings: DashMap<String, Rating>,
}

impl RatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one score to `laptop_id` and return the updated totals
    pub fn add(&self, laptop_id: &str, score: f64) -> Rating {
        let mut rating = self.ratings.entry(laptop_id.to_string()).or_default();
        rating.count += 1;
        rating.sum += score;
        *rating
    }

    #[cfg(test)]
    pub(crate) fn get(&self, laptop_id: &str) -> Option<Rating> {
        self.ratings.get(laptop_id).map(|rating| *rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_accumulates() {
        let store = RatingStore::new();

        assert_eq!(store.add("a", 3.0), Rating { count: 1, sum: 3.0 });
        assert_eq!(store.add("a", 5.0), Rating { count: 2, sum: 8.0 });
        assert_eq!(store.add("b", 10.0), Rating { count: 1, sum: 10.0 });

        assert_eq!(store.get("a").unwrap().average(), Some(4.0));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_average_undefined_without_scores() {
        assert_eq!(Rating::default().average(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds() {
        let store = Arc::new(RatingStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        store.add("shared", 2.0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let rating = store.get("shared").unwrap();
        assert_eq!(rating.count, 800);
        assert_eq!(rating.sum, 1600.0);
    }
}
