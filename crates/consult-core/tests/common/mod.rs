//! Shared fixtures: one appointment, an in-memory hub, loopback media and
//! transports.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teleconsult_core::loopback::{LoopbackMediaDevices, LoopbackTransportFactory};
use teleconsult_core::prelude::*;
use teleconsult_core::{AppointmentStatus, MemorySessionStore, SessionRecord};
use teleconsult_signaling_core::{InMemoryHub, NegotiationMessage, PublishedMessage};

pub const APPOINTMENT: &str = "appt-42";
pub const DOCTOR: &str = "doctor-7";
pub const PATIENT: &str = "patient-3";

pub struct Clinic {
    pub hub: InMemoryHub,
    pub store: Arc<MemorySessionStore>,
    pub transports: LoopbackTransportFactory,
    pub session_id: SessionId,
}

impl Clinic {
    pub fn new() -> Self {
        Self::with_hub(InMemoryHub::new())
    }

    pub fn with_hub(hub: InMemoryHub) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        store.insert(SessionRecord::new(APPOINTMENT, DOCTOR, PATIENT, "persistent cough", Utc::now()));
        Self {
            hub,
            store,
            transports: LoopbackTransportFactory::new(),
            session_id: SessionId::new(APPOINTMENT),
        }
    }

    pub fn deps(&self, devices: &LoopbackMediaDevices) -> ConsultDeps {
        ConsultDeps::new(
            self.store.clone(),
            Arc::new(self.hub.clone()),
            Arc::new(devices.clone()),
            Arc::new(self.transports.clone()),
        )
    }

    pub async fn join(&self, user: &str, devices: &LoopbackMediaDevices) -> ConsultationController {
        self.join_with(user, devices, ConsultConfig::default()).await
    }

    pub async fn join_with(
        &self,
        user: &str,
        devices: &LoopbackMediaDevices,
        config: ConsultConfig,
    ) -> ConsultationController {
        ConsultationController::activate(ConsultationRequest::new(APPOINTMENT, user), self.deps(devices), config)
            .await
            .expect("activation failed")
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.hub.published(&self.session_id)
    }

    /// Published messages of one kind sent by `user`
    pub fn sent_by(&self, user: &str, kind: &str) -> usize {
        self.published()
            .iter()
            .filter(|m| m.from.as_str() == user && m.message.kind() == kind)
            .count()
    }

    pub fn end_writes(&self, status: AppointmentStatus) -> usize {
        self.store
            .writes()
            .iter()
            .filter(|(_, update)| update.status == status && update.actual_end_time.is_some())
            .count()
    }
}

/// Wait for a snapshot matching `predicate`, failing the test after a
/// generous amount of (virtual) time
pub async fn until<F>(controller: &ConsultationController, predicate: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(300), controller.wait_for(predicate))
        .await
        .expect("timed out waiting for session snapshot")
        .expect("session closed before reaching the expected snapshot")
}

pub fn connected(snapshot: &SessionSnapshot) -> bool {
    snapshot.state == CallState::Connected
}

pub fn terminal(snapshot: &SessionSnapshot) -> bool {
    snapshot.state.is_terminal()
}

pub fn is_offer(message: &NegotiationMessage) -> bool {
    matches!(message, NegotiationMessage::Offer { .. })
}
