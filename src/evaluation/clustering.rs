use rayon::prelude::*;
use serde::Serialize;

use crate::model::ClusterModel;

/// 学習済みクラスタの内部評価指標（ユークリッド距離）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusteringQuality {
    pub non_empty_clusters: usize,
    /// -1〜1。大きいほど良い。非空クラスタが2未満、またはサンプル数と同数なら `None`。
    pub silhouette: Option<f32>,
    /// 0以上。小さいほど良い。非空クラスタが2未満なら `None`。
    pub davies_bouldin: Option<f32>,
}

impl ClusteringQuality {
    #[must_use]
    pub fn of(model: &ClusterModel) -> Self {
        Self {
            non_empty_clusters: distinct_labels(&model.labels),
            silhouette: silhouette_score(&model.embeddings, &model.labels),
            davies_bouldin: davies_bouldin_score(&model.embeddings, &model.labels),
        }
    }
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn distinct_labels(labels: &[usize]) -> usize {
    let Some(&max) = labels.iter().max() else {
        return 0;
    };
    let mut seen = vec![false; max + 1];
    for &label in labels {
        seen[label] = true;
    }
    seen.into_iter().filter(|present| *present).count()
}

/// 平均シルエット係数。単独クラスタに属するサンプルの係数は 0 とする。
#[must_use]
pub fn silhouette_score(embeddings: &[Vec<f32>], labels: &[usize]) -> Option<f32> {
    let n = embeddings.len();
    let used = distinct_labels(labels);
    if n != labels.len() || used < 2 || used >= n {
        return None;
    }
    let n_labels = labels.iter().max().map_or(0, |max| max + 1);
    let mut sizes = vec![0_usize; n_labels];
    for &label in labels {
        sizes[label] += 1;
    }

    let total: f32 = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = labels[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let mut sums = vec![0.0_f32; n_labels];
            for j in 0..n {
                if i != j {
                    sums[labels[j]] += euclidean_distance(&embeddings[i], &embeddings[j]);
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let a = sums[own] / (sizes[own] - 1) as f32;
            #[allow(clippy::cast_precision_loss)]
            let b = (0..n_labels)
                .filter(|&label| label != own && sizes[label] > 0)
                .map(|label| sums[label] / sizes[label] as f32)
                .fold(f32::INFINITY, f32::min);
            let denominator = a.max(b);
            if denominator > 0.0 {
                (b - a) / denominator
            } else {
                0.0
            }
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let score = total / n as f32;
    Some(score)
}

/// Davies–Bouldin 指数。重心が一致するクラスタ対は比較から外す。
#[must_use]
pub fn davies_bouldin_score(embeddings: &[Vec<f32>], labels: &[usize]) -> Option<f32> {
    if embeddings.len() != labels.len() || distinct_labels(labels) < 2 {
        return None;
    }
    let dimension = embeddings.first().map(Vec::len)?;
    let n_labels = labels.iter().max().map_or(0, |max| max + 1);

    let mut centroids = vec![vec![0.0_f32; dimension]; n_labels];
    let mut sizes = vec![0_usize; n_labels];
    for (embedding, &label) in embeddings.iter().zip(labels) {
        for (sum, value) in centroids[label].iter_mut().zip(embedding) {
            *sum += value;
        }
        sizes[label] += 1;
    }
    for (centroid, &size) in centroids.iter_mut().zip(&sizes) {
        if size > 0 {
            #[allow(clippy::cast_precision_loss)]
            let size = size as f32;
            for value in centroid.iter_mut() {
                *value /= size;
            }
        }
    }

    let mut scatter = vec![0.0_f32; n_labels];
    for (embedding, &label) in embeddings.iter().zip(labels) {
        scatter[label] += euclidean_distance(embedding, &centroids[label]);
    }
    for (value, &size) in scatter.iter_mut().zip(&sizes) {
        if size > 0 {
            #[allow(clippy::cast_precision_loss)]
            let size = size as f32;
            *value /= size;
        }
    }

    let used: Vec<usize> = (0..n_labels).filter(|&label| sizes[label] > 0).collect();
    let total: f32 = used
        .iter()
        .map(|&i| {
            used.iter()
                .filter(|&&j| j != i)
                .map(|&j| {
                    let separation = euclidean_distance(&centroids[i], &centroids[j]);
                    if separation > 0.0 {
                        (scatter[i] + scatter[j]) / separation
                    } else {
                        0.0
                    }
                })
                .fold(0.0_f32, f32::max)
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let score = total / used.len() as f32;
    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separated() -> (Vec<Vec<f32>>, Vec<usize>) {
        (
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![10.0, 0.0],
                vec![10.0, 1.0],
            ],
            vec![0, 0, 1, 1],
        )
    }

    #[test]
    fn well_separated_clusters_score_high_silhouette() {
        let (embeddings, labels) = separated();
        let score = silhouette_score(&embeddings, &labels).unwrap();
        // a = 1, b = (10 + sqrt(101)) / 2
        let b = (10.0 + 101.0_f32.sqrt()) / 2.0;
        assert!((score - (b - 1.0) / b).abs() < 1e-5);
    }

    #[test]
    fn davies_bouldin_matches_hand_computation() {
        let (embeddings, labels) = separated();
        let score = davies_bouldin_score(&embeddings, &labels).unwrap();
        // scatter 0.5 per cluster, centroid separation 10.
        assert!((score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn single_cluster_has_no_scores() {
        let embeddings = vec![vec![0.0], vec![1.0]];
        assert_eq!(silhouette_score(&embeddings, &[0, 0]), None);
        assert_eq!(davies_bouldin_score(&embeddings, &[0, 0]), None);
    }

    #[test]
    fn one_sample_per_cluster_has_no_silhouette() {
        let embeddings = vec![vec![0.0], vec![1.0]];
        assert_eq!(silhouette_score(&embeddings, &[0, 1]), None);
        assert!(davies_bouldin_score(&embeddings, &[0, 1]).is_some());
    }

    #[test]
    fn quality_ignores_empty_cluster_indices() {
        let model = ClusterModel::from_assignments(
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![10.0, 0.0], vec![10.0, 1.0]],
            vec![0, 0, 2, 2],
            3,
            2,
            "test",
        )
        .unwrap();
        let quality = ClusteringQuality::of(&model);
        assert_eq!(quality.non_empty_clusters, 2);
        assert!(quality.silhouette.unwrap() > 0.8);
        assert!((quality.davies_bouldin.unwrap() - 0.1).abs() < 1e-6);
    }
}
