//! Session lifecycle recording

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teleconsult_signaling_core::SessionId;
use tracing::info;

use crate::error::StorageResult;
use crate::store::{AppointmentStatus, SessionStore, StatusUpdate};

/// How a session ended
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    /// Hung up, or the peer left a connected call
    Completed,
    /// Ended in `failed`
    Interrupted,
}

impl SessionOutcome {
    pub fn status(&self) -> AppointmentStatus {
        match self {
            Self::Completed => AppointmentStatus::Completed,
            Self::Interrupted => AppointmentStatus::Interrupted,
        }
    }
}

/// Records when a consultation started and how it ended.
///
/// Failures are reported to the caller, which logs them; they never block or
/// reverse a call transition.
#[async_trait]
pub trait SessionLifecycleRecorder: Send + Sync {
    async fn mark_started(&self, id: &SessionId, at: DateTime<Utc>) -> StorageResult<()>;

    async fn mark_ended(&self, id: &SessionId, outcome: SessionOutcome, at: DateTime<Utc>) -> StorageResult<()>;
}

/// Recorder writing through a [`SessionStore`]
#[derive(Clone)]
pub struct StoreRecorder {
    store: Arc<dyn SessionStore>,
}

impl StoreRecorder {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionLifecycleRecorder for StoreRecorder {
    async fn mark_started(&self, id: &SessionId, at: DateTime<Utc>) -> StorageResult<()> {
        info!("Session {} started at {}", id, at);
        self.store.update_session_status(id, StatusUpdate::started(at)).await
    }

    async fn mark_ended(&self, id: &SessionId, outcome: SessionOutcome, at: DateTime<Utc>) -> StorageResult<()> {
        info!("Session {} ended ({:?}) at {}", id, outcome, at);
        self.store
            .update_session_status(id, StatusUpdate::ended(outcome.status(), at))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySessionStore, SessionRecord};

    #[tokio::test]
    async fn recorder_writes_status_and_timestamps() {
        let store = Arc::new(MemorySessionStore::new());
        store.insert(SessionRecord::new("S1", "d", "p", "cough", Utc::now()));
        let recorder = StoreRecorder::new(store.clone());
        let id = SessionId::new("S1");

        let start = Utc::now();
        recorder.mark_started(&id, start).await.unwrap();
        recorder.mark_ended(&id, SessionOutcome::Interrupted, start).await.unwrap();

        let rec = store.record(&id).unwrap();
        assert_eq!(rec.status, AppointmentStatus::Interrupted);
        assert_eq!(rec.actual_start_time, Some(start));
        assert_eq!(rec.actual_end_time, Some(start));
    }
}
