//! Target Registry - live debug targets, owned by whoever creates them
//!
//! Passed around explicitly instead of living in a static, so tests get a
//! fresh one and shutdown order is visible.

use dashmap::DashMap;
use std::sync::Arc;

use crate::cdp::protocol::{TargetId, TargetInfo};
use crate::target::DebugTarget;

#[derive(Default)]
pub struct TargetRegistry {
    targets: DashMap<TargetId, Arc<DebugTarget>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. A previous target with the same id is disposed.
    pub async fn register(&self, target: Arc<DebugTarget>) {
        let id = target.target_id().to_string();
        tracing::debug!(target_id = %id, "Registering debug target");
        if let Some(previous) = self.targets.insert(id, target) {
            tracing::warn!(target_id = %previous.target_id(), "Replacing existing debug target");
            previous.dispose().await;
        }
    }

    pub fn get(&self, target_id: &str) -> Option<Arc<DebugTarget>> {
        self.targets.get(target_id).map(|e| e.value().clone())
    }

    /// Remove and dispose a target. Returns whether it was registered.
    pub async fn remove(&self, target_id: &str) -> bool {
        match self.targets.remove(target_id) {
            Some((_, target)) => {
                target.dispose().await;
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<TargetId> {
        self.targets.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshots for `Target.getTargets`
    pub fn target_infos(&self) -> Vec<TargetInfo> {
        self.targets
            .iter()
            .map(|e| e.value().get_target_info())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub async fn dispose_all(&self) {
        let targets: Vec<Arc<DebugTarget>> =
            self.targets.iter().map(|e| e.value().clone()).collect();
        self.targets.clear();
        for target in targets {
            target.dispose().await;
        }
    }
}
