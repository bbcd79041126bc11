use rayon::prelude::*;

use crate::embedding::cosine_similarity;

/// Average-linkage agglomerative clustering over cosine distance.
///
/// Builds the full dendrogram with the nearest-neighbor chain algorithm and cuts
/// it at exactly `n_clusters` flat clusters. Cluster labels are numbered by the
/// first sample that belongs to each cluster, so labelling is deterministic.
#[derive(Debug, Clone)]
pub struct Agglomerative {
    pub assignments: Vec<usize>,
    pub n_clusters: usize,
}

/// One dendrogram merge: slot `a` folded into slot `b` at `height`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    a: usize,
    b: usize,
    height: f32,
}

impl Agglomerative {
    /// Runs the clustering.
    ///
    /// # Arguments
    /// * `data` - List of data points (vectors).
    /// * `n_clusters` - Number of flat clusters to produce.
    ///
    /// With fewer points than clusters every point gets its own cluster and the
    /// remaining cluster indices stay empty.
    #[must_use]
    pub fn fit(data: &[Vec<f32>], n_clusters: usize) -> Self {
        let n = data.len();
        if n == 0 || n_clusters == 0 {
            return Self {
                assignments: vec![],
                n_clusters,
            };
        }
        if n <= n_clusters {
            return Self {
                assignments: (0..n).collect(),
                n_clusters,
            };
        }

        let mut distances = cosine_distance_matrix(data);
        let merges = nn_chain(&mut distances, n);

        // Reducible linkage: sorting by height (stable) yields a valid dendrogram order.
        let mut ordered = merges;
        ordered.sort_by(|x, y| x.height.total_cmp(&y.height));

        let mut forest = UnionFind::new(n);
        for merge in ordered.iter().take(n - n_clusters) {
            forest.union(merge.a, merge.b);
        }

        let mut label_of_root = vec![usize::MAX; n];
        let mut next_label = 0;
        let mut assignments = Vec::with_capacity(n);
        for sample in 0..n {
            let root = forest.find(sample);
            if label_of_root[root] == usize::MAX {
                label_of_root[root] = next_label;
                next_label += 1;
            }
            assignments.push(label_of_root[root]);
        }

        Self {
            assignments,
            n_clusters,
        }
    }

    /// Number of members per cluster index, including empty clusters.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.assignments {
            sizes[label] += 1;
        }
        sizes
    }
}

fn cosine_distance_matrix(data: &[Vec<f32>]) -> Vec<f32> {
    let n = data.len();
    let mut matrix = vec![0.0_f32; n * n];
    matrix.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, cell) in row.iter_mut().enumerate() {
            if i != j {
                *cell = 1.0 - cosine_similarity(&data[i], &data[j]);
            }
        }
    });
    matrix
}

fn nn_chain(distances: &mut [f32], n: usize) -> Vec<Merge> {
    let mut active = vec![true; n];
    let mut sizes = vec![1_usize; n];
    let mut merges = Vec::with_capacity(n - 1);
    let mut chain: Vec<usize> = Vec::with_capacity(n);

    for _ in 0..n - 1 {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|alive| *alive) {
                chain.push(first);
            }
        }

        let (a, b) = loop {
            let Some(&tip) = chain.last() else {
                unreachable!("chain is seeded before extension");
            };
            // Prefer the previous chain element on ties so reciprocal pairs terminate.
            let previous = chain.len().checked_sub(2).map(|idx| chain[idx]);
            let mut nearest = previous;
            let mut nearest_distance = previous.map_or(f32::INFINITY, |p| distances[tip * n + p]);
            for candidate in 0..n {
                if candidate == tip || !active[candidate] {
                    continue;
                }
                let distance = distances[tip * n + candidate];
                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = Some(candidate);
                }
            }
            let Some(next) = nearest else {
                unreachable!("at least two active clusters remain");
            };
            if Some(next) == previous {
                chain.pop();
                chain.pop();
                break (tip, next);
            }
            chain.push(next);
        };

        let height = distances[a * n + b];
        merges.push(Merge { a, b, height });

        // Lance-Williams update for average linkage; the merged cluster lives in slot `b`.
        #[allow(clippy::cast_precision_loss)]
        let (size_a, size_b) = (sizes[a] as f32, sizes[b] as f32);
        for k in 0..n {
            if !active[k] || k == a || k == b {
                continue;
            }
            let merged =
                (size_a * distances[k * n + a] + size_b * distances[k * n + b]) / (size_a + size_b);
            distances[k * n + b] = merged;
            distances[b * n + k] = merged;
        }
        active[a] = false;
        sizes[b] += sizes[a];
    }

    merges
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_a] = root_b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.05, 0.0],
            vec![0.0, 0.1, 1.0],
            vec![0.95, 0.0, 0.1],
            vec![0.05, 0.0, 0.9],
            vec![0.9, 0.1, 0.0],
        ]
    }

    #[test]
    fn separates_obvious_groups() {
        let result = Agglomerative::fit(&two_groups(), 2);
        assert_eq!(result.assignments, vec![0, 1, 0, 1, 0]);
        assert_eq!(result.cluster_sizes(), vec![3, 2]);
    }

    #[test]
    fn produces_exactly_requested_cluster_count() {
        let data: Vec<Vec<f32>> = (0..12)
            .map(|i| {
                let angle = f32::from(u8::try_from(i).unwrap()) * 0.5;
                vec![angle.cos(), angle.sin(), 0.2]
            })
            .collect();
        let result = Agglomerative::fit(&data, 4);
        let sizes = result.cluster_sizes();
        assert_eq!(sizes.len(), 4);
        assert!(sizes.iter().all(|size| *size > 0));
        assert_eq!(sizes.iter().sum::<usize>(), 12);
    }

    #[test]
    fn fewer_points_than_clusters_leaves_empty_clusters() {
        let data = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let result = Agglomerative::fit(&data, 4);
        assert_eq!(result.assignments, vec![0, 1]);
        assert_eq!(result.cluster_sizes(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn identical_points_collapse_first() {
        let data = vec![
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.7, 0.7],
        ];
        let result = Agglomerative::fit(&data, 3);
        assert_eq!(result.assignments[0], result.assignments[1]);
        assert_ne!(result.assignments[2], result.assignments[3]);
    }

    #[test]
    fn clustering_is_deterministic() {
        let first = Agglomerative::fit(&two_groups(), 2);
        let second = Agglomerative::fit(&two_groups(), 2);
        assert_eq!(first.assignments, second.assignments);
    }
}
