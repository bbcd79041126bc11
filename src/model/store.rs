//! 分類経路が参照するモデルスナップショットの保持。
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::artifact::{CategoryMapping, ClusterIndex, ClusterModel};

/// モデルと対応表を一組にした不変スナップショット。
///
/// 分類はこの `Arc` を複製して使うため、差し替え中も古い組を一貫して参照できる。
#[derive(Debug)]
pub struct ModelSnapshot {
    pub version: u64,
    pub model: ClusterModel,
    pub mapping: CategoryMapping,
}

impl ModelSnapshot {
    #[must_use]
    pub fn category_name(&self, cluster: ClusterIndex) -> String {
        self.mapping.category_name(cluster)
    }
}

/// 現在のスナップショットへの差し替え可能な参照。
#[derive(Debug, Default)]
pub struct ModelStore {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl ModelStore {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 現在のスナップショット。未学習なら `None`。
    pub async fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.current.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// 新しい組を公開し、採番したスナップショットを返す。
    ///
    /// 再学習からの呼び出しはデータセットロックを保持したまま行うこと。
    pub async fn replace(&self, model: ClusterModel, mapping: CategoryMapping) -> Arc<ModelSnapshot> {
        let mut current = self.current.write().await;
        let version = current.as_ref().map_or(1, |snapshot| snapshot.version + 1);
        let snapshot = Arc::new(ModelSnapshot {
            version,
            model,
            mapping,
        });
        *current = Some(Arc::clone(&snapshot));
        info!(
            version,
            revision = %snapshot.model.metadata.revision,
            samples = snapshot.model.sample_count(),
            "published cluster model snapshot"
        );
        snapshot
    }
}
