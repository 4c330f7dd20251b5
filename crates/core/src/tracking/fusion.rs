//! Temporal fusion of per-track signal histories.
//!
//! Age is the truncated arithmetic mean, gender the majority vote (ties go
//! to the most recently observed of the tied classes) and embedding the
//! element-wise mean. Each falls back to a fixed default on empty history.

use crate::detection::domain::raw_detection::Gender;

use super::history::BoundedHistory;

/// Stabilized signals for one track.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedSignals {
    pub age: u32,
    pub gender: Gender,
    pub embedding: Vec<f32>,
}

pub fn fuse_age(history: &BoundedHistory<u32>, default: u32) -> u32 {
    if history.is_empty() {
        return default;
    }
    let sum: u64 = history.iter().map(|&a| a as u64).sum();
    (sum / history.len() as u64) as u32
}

pub fn fuse_gender(history: &BoundedHistory<Gender>, default: Gender) -> Gender {
    let female = history.iter().filter(|&&g| g == Gender::Female).count();
    let male = history.len() - female;
    if female > male {
        Gender::Female
    } else if male > female {
        Gender::Male
    } else {
        history.latest().copied().unwrap_or(default)
    }
}

/// Mean accumulated in f64 over rows matching the latest row's dimension.
/// An empty history yields `default_dim` zeros.
pub fn fuse_embedding(history: &BoundedHistory<Vec<f32>>, default_dim: usize) -> Vec<f32> {
    let dim = history.latest().map_or(default_dim, Vec::len);
    let mut acc = vec![0.0f64; dim];
    let mut rows = 0usize;
    for row in history.iter().filter(|row| row.len() == dim) {
        for (a, v) in acc.iter_mut().zip(row) {
            *a += *v as f64;
        }
        rows += 1;
    }
    if rows == 0 {
        return vec![0.0; dim];
    }
    acc.into_iter().map(|a| (a / rows as f64) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn history<T>(capacity: usize, items: impl IntoIterator<Item = T>) -> BoundedHistory<T> {
        let mut h = BoundedHistory::new(capacity);
        for item in items {
            h.push(item);
        }
        h
    }

    #[rstest]
    #[case::empty(vec![], 25)]
    #[case::single(vec![40], 40)]
    #[case::truncated_mean(vec![20, 22, 21, 23, 24], 22)]
    #[case::rounds_down(vec![30, 31], 30)]
    fn test_fuse_age(#[case] ages: Vec<u32>, #[case] expected: u32) {
        assert_eq!(fuse_age(&history(7, ages), 25), expected);
    }

    #[rstest]
    #[case::empty_defaults_male(vec![], Gender::Male)]
    #[case::majority_male(vec![Gender::Male, Gender::Male, Gender::Female], Gender::Male)]
    #[case::majority_female(vec![Gender::Female, Gender::Male, Gender::Female], Gender::Female)]
    #[case::tie_latest_female(vec![Gender::Male, Gender::Female], Gender::Female)]
    #[case::tie_latest_male(vec![Gender::Female, Gender::Male], Gender::Male)]
    fn test_fuse_gender(#[case] genders: Vec<Gender>, #[case] expected: Gender) {
        assert_eq!(fuse_gender(&history(7, genders), Gender::Male), expected);
    }

    #[test]
    fn test_fuse_gender_default_is_configurable() {
        assert_eq!(
            fuse_gender(&BoundedHistory::new(7), Gender::Female),
            Gender::Female
        );
    }

    #[test]
    fn test_fuse_embedding_empty_is_zero_vector() {
        let fused = fuse_embedding(&BoundedHistory::new(5), 512);
        assert_eq!(fused.len(), 512);
        assert!(fused.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fuse_embedding_elementwise_mean() {
        let h = history(5, [vec![1.0, 0.0, 2.0], vec![3.0, 2.0, 0.0]]);
        let fused = fuse_embedding(&h, 3);
        assert_relative_eq!(fused[0], 2.0);
        assert_relative_eq!(fused[1], 1.0);
        assert_relative_eq!(fused[2], 1.0);
    }

    #[test]
    fn test_fuse_embedding_uses_latest_dimension() {
        let h = history(5, [vec![9.0], vec![1.0, 3.0]]);
        assert_eq!(fuse_embedding(&h, 512), vec![1.0, 3.0]);
    }

    #[test]
    fn test_fusion_idempotent_under_repeated_observation() {
        let ages = history(7, [33; 7]);
        let genders = history(7, [Gender::Female; 7]);
        let embeddings = history(5, vec![vec![0.6f32, 0.8]; 5]);

        assert_eq!(fuse_age(&ages, 25), 33);
        assert_eq!(fuse_gender(&genders, Gender::Male), Gender::Female);
        let fused = fuse_embedding(&embeddings, 2);
        assert_relative_eq!(fused[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(fused[1], 0.8, epsilon = 1e-6);
    }
}
