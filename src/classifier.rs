//! 埋め込みクラスタの重心による分類と信頼度評価。

pub mod centroid;
pub mod labels;

pub use centroid::{
    Classification, ClusterClassifier, nearest_centroid, similarity_to_confidence,
};
pub use labels::ConfidenceBand;
