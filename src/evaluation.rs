pub mod clustering;

pub use clustering::{ClusteringQuality, davies_bouldin_score, euclidean_distance, silhouette_score};
