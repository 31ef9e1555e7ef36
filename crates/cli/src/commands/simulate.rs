//! Simulate command - Run a consultation between two in-process participants
//!
//! Both sides share an in-memory signaling hub and loopback transports, so
//! the full negotiation runs without any network or capture device.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};
use futures::future::try_join;
use serde::Serialize;
use teleconsult_core::loopback::{LoopbackMediaDevices, LoopbackTransportFactory};
use teleconsult_core::{
    AppointmentStatus, ConnectionStatus, ConsultConfig, ConsultDeps, ConsultationController, ConsultationRequest,
    MemorySessionStore, SessionRecord, SessionSnapshot,
};
use teleconsult_signaling_core::{InMemoryHub, SessionId, UserId};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario to run
    #[arg(long, value_enum, default_value_t = Scenario::Connect)]
    pub scenario: Scenario,

    /// Appointment id
    #[arg(long, default_value = "appt-demo")]
    pub session: String,

    /// Doctor user id
    #[arg(long, default_value = "doctor-1")]
    pub doctor: String,

    /// Patient user id
    #[arg(long, default_value = "patient-1")]
    pub patient: String,

    /// Seconds a connected call stays up before it is ended
    #[arg(long, default_value_t = 2)]
    pub duration_secs: u64,

    /// Override the peer wait notice (seconds)
    #[arg(long)]
    pub peer_wait_secs: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Both join, talk, the doctor hangs up
    Connect,
    /// Only the doctor joins
    Solo,
    /// The patient's connection drops for good mid-call
    PeerLeaves,
    /// The patient refuses camera and microphone access
    CaptureDenied,
}

/// Final view of one participant
#[derive(Debug, Serialize)]
pub struct ParticipantReport {
    pub user: String,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

/// Outcome of a simulation run
#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: Scenario,
    pub participants: Vec<ParticipantReport>,
    pub appointment: SessionRecord,
    pub offers: usize,
    pub answers: usize,
    pub candidates: usize,
}

struct Simulation {
    hub: InMemoryHub,
    store: Arc<MemorySessionStore>,
    transports: LoopbackTransportFactory,
    session_id: SessionId,
    config: ConsultConfig,
}

impl Simulation {
    fn new(args: &SimulateArgs, config: ConsultConfig) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        store.insert(SessionRecord::new(
            args.session.as_str(),
            args.doctor.as_str(),
            args.patient.as_str(),
            "simulated consultation",
            Utc::now(),
        ));
        Self {
            hub: InMemoryHub::new(),
            store,
            transports: LoopbackTransportFactory::new(),
            session_id: SessionId::new(args.session.as_str()),
            config,
        }
    }

    async fn join(&self, user: &str, devices: LoopbackMediaDevices) -> Result<ConsultationController> {
        let deps = ConsultDeps::new(
            self.store.clone(),
            Arc::new(self.hub.clone()),
            Arc::new(devices),
            Arc::new(self.transports.clone()),
        );
        let controller = ConsultationController::activate(
            ConsultationRequest::new(self.session_id.as_str(), user),
            deps,
            self.config.clone(),
        )
        .await?;
        tokio::spawn(print_status(user.to_string(), controller.status_updates()));
        Ok(controller)
    }

    /// Generous bound for anything that depends on negotiation finishing
    fn negotiation_bound(&self) -> Duration {
        self.config.negotiation_timeout + Duration::from_secs(5)
    }

    fn count(&self, kind: &str) -> usize {
        self.hub
            .published(&self.session_id)
            .iter()
            .filter(|m| m.message.kind() == kind)
            .count()
    }

    fn report(&self, scenario: Scenario, participants: Vec<(&str, SessionSnapshot)>) -> Result<Report> {
        let appointment = self
            .store
            .record(&self.session_id)
            .ok_or_else(|| anyhow!("appointment {} disappeared", self.session_id))?;
        Ok(Report {
            scenario,
            participants: participants
                .into_iter()
                .map(|(user, snapshot)| ParticipantReport {
                    user: user.to_string(),
                    snapshot,
                })
                .collect(),
            appointment,
            offers: self.count("offer"),
            answers: self.count("answer"),
            candidates: self.count("candidate"),
        })
    }
}

async fn print_status(user: String, mut status: watch::Receiver<ConnectionStatus>) {
    loop {
        let current = status.borrow_and_update().clone();
        println!("  [{}] {}", user, current);
        if current.is_final() || status.changed().await.is_err() {
            break;
        }
    }
}

async fn wait<F>(controller: &ConsultationController, within: Duration, what: &str, predicate: F) -> Result<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    match tokio::time::timeout(within, controller.wait_for(predicate)).await {
        Ok(snapshot) => Ok(snapshot?),
        Err(_) => Err(anyhow!("{} did not {} within {:?}", controller.local(), what, within)),
    }
}

fn connected(snapshot: &SessionSnapshot) -> bool {
    snapshot.status == ConnectionStatus::Connected
}

fn finished(snapshot: &SessionSnapshot) -> bool {
    snapshot.status.is_final()
}

/// Run a scenario to completion
pub async fn run(args: &SimulateArgs, config: ConsultConfig) -> Result<Report> {
    let mut config = config;
    if let Some(secs) = args.peer_wait_secs {
        config = config.with_peer_wait_notice(Duration::from_secs(secs));
    }
    config.validate()?;

    let sim = Simulation::new(args, config);
    let bound = sim.negotiation_bound();
    let talk = Duration::from_secs(args.duration_secs);
    info!("🩺 Simulating {:?} for appointment {}", args.scenario, sim.session_id);

    let participants = match args.scenario {
        Scenario::Connect => {
            let doctor = sim.join(&args.doctor, LoopbackMediaDevices::new()).await?;
            let patient = sim.join(&args.patient, LoopbackMediaDevices::new()).await?;
            try_join(
                wait(&doctor, bound, "connect", connected),
                wait(&patient, bound, "connect", connected),
            )
            .await?;

            tokio::time::sleep(talk).await;
            doctor.hangup().await?;
            let p = wait(&patient, bound, "end", finished).await?;
            vec![(args.doctor.as_str(), doctor.snapshot()), (args.patient.as_str(), p)]
        }
        Scenario::Solo => {
            let doctor = sim.join(&args.doctor, LoopbackMediaDevices::new()).await?;
            let notice = sim.config.peer_wait_notice + Duration::from_secs(5);
            wait(&doctor, notice, "notice the missing peer", |s| {
                s.status == ConnectionStatus::WaitingForParticipant
            })
            .await?;
            doctor.hangup().await?;
            vec![(args.doctor.as_str(), doctor.snapshot())]
        }
        Scenario::PeerLeaves => {
            let doctor = sim.join(&args.doctor, LoopbackMediaDevices::new()).await?;
            let patient = sim.join(&args.patient, LoopbackMediaDevices::new()).await?;
            try_join(
                wait(&doctor, bound, "connect", connected),
                wait(&patient, bound, "connect", connected),
            )
            .await?;

            tokio::time::sleep(talk).await;
            sim.hub.fail_next_joins(sim.config.channel_rejoin_attempts as usize);
            let dropped = sim.hub.disconnect(&sim.session_id, &UserId::new(args.patient.as_str()));
            warn!("✂️  Dropped {} subscription(s) of {}", dropped, args.patient);

            let (d, p) = try_join(
                wait(&doctor, bound, "end", finished),
                wait(&patient, bound, "end", finished),
            )
            .await?;
            vec![(args.doctor.as_str(), d), (args.patient.as_str(), p)]
        }
        Scenario::CaptureDenied => {
            let doctor = sim.join(&args.doctor, LoopbackMediaDevices::new()).await?;
            let patient = sim.join(&args.patient, LoopbackMediaDevices::denying()).await?;
            let p = wait(&patient, bound, "fail", finished).await?;
            doctor.hangup().await?;
            vec![(args.doctor.as_str(), doctor.snapshot()), (args.patient.as_str(), p)]
        }
    };

    sim.report(args.scenario, participants)
}

/// Execute simulate command
pub async fn execute(args: SimulateArgs, config: ConsultConfig) -> Result<()> {
    let report = run(&args, config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n═══ Consultation {} ═══", report.appointment.id);
    for ParticipantReport { user, snapshot } in &report.participants {
        let role = snapshot.role.map(|r| r.to_string()).unwrap_or_else(|| "unresolved".to_string());
        println!("👤 {} as {}: {}", user, role, snapshot.state);
        println!("   status: {}", snapshot.status);
        println!("   transports created: {}", snapshot.transport_generation);
        if snapshot.dropped_candidates > 0 {
            println!("   dropped candidates: {}", snapshot.dropped_candidates);
        }
    }
    println!(
        "📨 offers: {}, answers: {}, candidates: {}",
        report.offers, report.answers, report.candidates
    );
    let status = report.appointment.status;
    let marker = if status == AppointmentStatus::Completed { "✅" } else { "📋" };
    println!("{} appointment status: {}", marker, status);
    Ok(())
}
