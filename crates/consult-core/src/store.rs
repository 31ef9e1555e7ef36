//! Appointment storage seen by a consultation session.
//!
//! The session reads its appointment once on activation and writes the
//! status transitions `in_progress` and `completed` / `interrupted`.
//! [`MemorySessionStore`] keeps records in a `DashMap` and logs every
//! status write, for tests and the simulator.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use teleconsult_signaling_core::{DeclaredRole, SessionId, UserId};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Status of an appointment row
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
    /// The consultation started but ended in failure
    Interrupted,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rescheduled => "rescheduled",
            Self::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Appointment backing a consultation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub doctor_id: UserId,
    pub patient_id: UserId,
    pub chief_complaint: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(
        id: impl Into<String>,
        doctor_id: impl Into<String>,
        patient_id: impl Into<String>,
        chief_complaint: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(id),
            doctor_id: UserId::new(doctor_id),
            patient_id: UserId::new(patient_id),
            chief_complaint: chief_complaint.into(),
            scheduled_at,
            status: AppointmentStatus::Scheduled,
            actual_start_time: None,
            actual_end_time: None,
        }
    }

    /// Declared role of `user` in this appointment, if they take part
    pub fn role_of(&self, user: &UserId) -> Option<DeclaredRole> {
        if *user == self.doctor_id {
            Some(DeclaredRole::Doctor)
        } else if *user == self.patient_id {
            Some(DeclaredRole::Patient)
        } else {
            None
        }
    }

    /// The other participant of the appointment
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if *user == self.doctor_id {
            Some(&self.patient_id)
        } else if *user == self.patient_id {
            Some(&self.doctor_id)
        } else {
            None
        }
    }

    fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if update.actual_start_time.is_some() {
            self.actual_start_time = update.actual_start_time;
        }
        if update.actual_end_time.is_some() {
            self.actual_end_time = update.actual_end_time;
        }
    }
}

/// A status write with the timestamps it sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            status: AppointmentStatus::InProgress,
            actual_start_time: Some(at),
            actual_end_time: None,
        }
    }

    pub fn ended(status: AppointmentStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            actual_start_time: None,
            actual_end_time: Some(at),
        }
    }
}

/// Read/update access to appointment records
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: &SessionId) -> StorageResult<SessionRecord>;

    async fn update_session_status(&self, id: &SessionId, update: StatusUpdate) -> StorageResult<()>;
}

/// In-memory [`SessionStore`]
#[derive(Default)]
pub struct MemorySessionStore {
    records: DashMap<SessionId, SessionRecord>,
    writes: Mutex<Vec<(SessionId, StatusUpdate)>>,
    fail_writes: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Current copy of a record
    pub fn record(&self, id: &SessionId) -> Option<SessionRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Every successful status write, in order
    pub fn writes(&self) -> Vec<(SessionId, StatusUpdate)> {
        self.writes.lock().clone()
    }

    /// Make subsequent status writes fail with a backend error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session(&self, id: &SessionId) -> StorageResult<SessionRecord> {
        self.record(id).ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn update_session_status(&self, id: &SessionId, update: StatusUpdate) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("writes disabled"));
        }
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id.as_str()))?;
        record.apply(&update);
        drop(record);

        debug!("Session {} status -> {}", id, update.status);
        self.writes.lock().push((id.clone(), update));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new("S1", "doctor-1", "patient-1", "headache", Utc::now())
    }

    #[test]
    fn roles_come_from_the_record() {
        let rec = record();
        assert_eq!(rec.role_of(&UserId::new("doctor-1")), Some(DeclaredRole::Doctor));
        assert_eq!(rec.role_of(&UserId::new("patient-1")), Some(DeclaredRole::Patient));
        assert_eq!(rec.role_of(&UserId::new("intruder")), None);
        assert_eq!(rec.counterpart_of(&UserId::new("doctor-1")), Some(&UserId::new("patient-1")));
    }

    #[tokio::test]
    async fn updates_keep_earlier_timestamps() {
        let store = MemorySessionStore::new();
        store.insert(record());
        let id = SessionId::new("S1");
        let start = Utc::now();

        store.update_session_status(&id, StatusUpdate::started(start)).await.unwrap();
        store
            .update_session_status(&id, StatusUpdate::ended(AppointmentStatus::Completed, start))
            .await
            .unwrap();

        let rec = store.get_session(&id).await.unwrap();
        assert_eq!(rec.status, AppointmentStatus::Completed);
        assert_eq!(rec.actual_start_time, Some(start));
        assert_eq!(rec.actual_end_time, Some(start));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn unknown_session_and_failing_backend() {
        let store = MemorySessionStore::new();
        let id = SessionId::new("nope");
        assert_eq!(store.get_session(&id).await.unwrap_err(), StorageError::not_found("nope"));

        store.insert(record());
        store.fail_writes(true);
        let err = store
            .update_session_status(&SessionId::new("S1"), StatusUpdate::started(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AppointmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
