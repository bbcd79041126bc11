pub mod artifact;
pub mod store;

pub use artifact::{
    ArtifactPaths, CategoryMapping, ClusterIndex, ClusterModel, ModelError, ModelMetadata,
    UNKNOWN_CATEGORY, compute_centroids,
};
pub use store::{ModelSnapshot, ModelStore};
