//! The shared performance-control state.

use tokio::sync::RwLock;

use crate::models::{PerformanceControlPatch, PerformanceState};

/// Process-wide singleton holding the authoritative performance controls.
/// Reads are short; all mutation goes through the coordinator.
pub struct PerformanceStateHandle {
    state: RwLock<PerformanceState>,
}

impl Default for PerformanceStateHandle {
    fn default() -> Self {
        Self {
            state: RwLock::new(PerformanceState::default()),
        }
    }
}

impl PerformanceStateHandle {
    pub async fn snapshot(&self) -> PerformanceState {
        self.state.read().await.clone()
    }

    /// Apply a patch and return the resulting state.
    pub async fn apply(&self, patch: &PerformanceControlPatch) -> PerformanceState {
        let mut state = self.state.write().await;
        if let Some(v) = patch.vocal_volume {
            state.vocal_volume = v;
        }
        if let Some(v) = patch.instrumental_volume {
            state.instrumental_volume = v;
        }
        if let Some(size) = patch.lyrics_size {
            state.lyrics_size = size;
        }
        if let Some(offset) = patch.lyrics_offset_ms {
            state.lyrics_offset_ms = offset;
        }
        state.clone()
    }

    pub async fn set_playing(&self, playing: bool) -> PerformanceState {
        let mut state = self.state.write().await;
        state.is_playing = playing;
        state.clone()
    }

    pub async fn set_current_entry(&self, entry_id: Option<i64>) -> PerformanceState {
        let mut state = self.state.write().await;
        state.current_entry_id = entry_id;
        state.clone()
    }
}
