//! Seeded sampling of the candidate pool

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use roulette_core::{Outcome, Warning};

/// Fresh random source for a seed
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draw `count` items from `pool`
///
/// Up to the pool size, items are distinct. Beyond it every item is taken
/// once, the remainder is drawn with replacement, and the whole sequence is
/// shuffled.
pub fn select<T: Clone, R: Rng + ?Sized>(rng: &mut R, pool: &[T], count: usize) -> Outcome<Vec<T>> {
    if count == 0 || pool.is_empty() {
        return Outcome::clean(Vec::new());
    }

    if count <= pool.len() {
        return Outcome::clean(pool.choose_multiple(rng, count).cloned().collect());
    }

    let mut picked = pool.to_vec();
    for _ in pool.len()..count {
        picked.push(pool[rng.gen_range(0..pool.len())].clone());
    }
    picked.shuffle(rng);

    Outcome::warned(
        picked,
        Warning::PoolShortfall {
            requested: count,
            available: pool.len(),
        },
    )
}

/// [`select`] with a random source re-seeded from `seed`
pub fn select_seeded<T: Clone>(pool: &[T], count: usize, seed: u64) -> Outcome<Vec<T>> {
    select(&mut seeded_rng(seed), pool, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_select_distinct() {
        let pool: Vec<u32> = (0..10).collect();
        for seed in 0..20 {
            for count in 0..=10 {
                let picked = select_seeded(&pool, count, seed);
                assert_eq!(picked.value.len(), count);
                assert!(!picked.has_warnings());
                let unique: HashSet<_> = picked.value.iter().collect();
                assert_eq!(unique.len(), count);
                assert!(picked.value.iter().all(|v| pool.contains(v)));
            }
        }
    }

    #[test]
    fn test_select_with_replacement() {
        let pool = vec!["a", "b", "c", "d", "e"];
        for seed in 0..20 {
            let picked = select_seeded(&pool, 8, seed);
            assert_eq!(picked.value.len(), 8);
            for item in &pool {
                assert!(picked.value.contains(item));
            }
            assert_eq!(
                picked.warnings,
                vec![Warning::PoolShortfall {
                    requested: 8,
                    available: 5
                }]
            );
        }
    }

    #[test]
    fn test_select_deterministic() {
        let pool: Vec<u32> = (0..50).collect();
        for count in [3, 50, 120] {
            assert_eq!(
                select_seeded(&pool, count, 7).value,
                select_seeded(&pool, count, 7).value
            );
        }
        assert_ne!(
            select_seeded(&pool, 10, 1).value,
            select_seeded(&pool, 10, 2).value
        );
    }

    #[test]
    fn test_extra_draws_cover_pool() {
        let pool = vec![0usize, 1, 2];
        let mut counts = [0usize; 3];
        for seed in 0..200 {
            for v in select_seeded(&pool, 6, seed).value {
                counts[v] += 1;
            }
        }
        // Each item appears once per run plus roughly a third of the extras
        for count in counts {
            assert!(count > 200 + 150, "skewed counts: {:?}", counts);
        }
    }

    #[test]
    fn test_select_empty() {
        let empty: Vec<u32> = Vec::new();
        assert!(select_seeded(&empty, 5, 0).value.is_empty());
        assert!(select_seeded(&[1, 2], 0, 0).value.is_empty());
    }
}
