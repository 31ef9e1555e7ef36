use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use teleconsult_signaling_core::{IceCandidate, SdpKind, SessionDescription};
use tracing::debug;

use crate::config::IceConfig;
use crate::error::{TransportError, TransportResult};
use crate::media::LocalMedia;
use crate::transport::{PeerTransport, TransportEvent, TransportEventSink, TransportFactory};

#[derive(Default)]
struct LoopbackNet {
    transports: Mutex<HashMap<String, Weak<LoopbackTransport>>>,
    connect: Mutex<()>,
    created: AtomicUsize,
    fail_creates: AtomicUsize,
}

impl LoopbackNet {
    fn lookup(&self, token: &str) -> Option<Arc<LoopbackTransport>> {
        self.transports.lock().get(token).and_then(Weak::upgrade)
    }

    fn live(&self) -> Vec<Arc<LoopbackTransport>> {
        self.transports.lock().values().filter_map(Weak::upgrade).collect()
    }
}

/// Transport factory connecting transports created by the same factory.
///
/// Two transports connect once each has a local description, the other's
/// description, and at least one of the other's candidates. Descriptions must
/// start with `v=0` and carry the creating transport's token in the `o=`
/// line, so malformed or foreign descriptions fail like they would on a real
/// stack.
#[derive(Clone, Default)]
pub struct LoopbackTransportFactory {
    net: Arc<LoopbackNet>,
}

impl LoopbackTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created so far
    pub fn created(&self) -> usize {
        self.net.created.load(Ordering::SeqCst)
    }

    /// Transports not yet closed
    pub fn live(&self) -> usize {
        self.net.live().len()
    }

    /// Transports with media flowing
    pub fn flowing(&self) -> usize {
        self.net.live().iter().filter(|t| t.state.lock().flowing).count()
    }

    /// Fail the next `n` create calls
    pub fn fail_next_creates(&self, n: usize) {
        self.net.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Report connectivity loss on every live transport
    pub fn sever_links(&self) -> usize {
        let live = self.net.live();
        for transport in &live {
            transport.emit(TransportEvent::Failed {
                reason: "loopback link severed".to_string(),
            });
        }
        live.len()
    }
}

impl TransportFactory for LoopbackTransportFactory {
    fn create(&self, ice: &IceConfig, events: TransportEventSink) -> TransportResult<Arc<dyn PeerTransport>> {
        let refused = self
            .net
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::CreateFailed {
                message: "loopback refused".to_string(),
            });
        }

        let n = self.net.created.fetch_add(1, Ordering::SeqCst) + 1;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let transport = Arc::new(LoopbackTransport {
            token: token.clone(),
            port: 50000 + (n as u16 % 5000) * 2,
            stun: ice.servers.first().cloned(),
            net: Arc::clone(&self.net),
            state: Mutex::new(LinkState {
                events: Some(events),
                ..Default::default()
            }),
        });
        self.net.transports.lock().insert(token, Arc::downgrade(&transport));
        debug!("Loopback transport {} created", transport.token);
        Ok(transport)
    }
}

#[derive(Default)]
struct LinkState {
    local: Option<SessionDescription>,
    remote_token: Option<String>,
    remote_candidate: bool,
    tracks: usize,
    events: Option<TransportEventSink>,
    closed: bool,
    flowing: bool,
}

/// Transport produced by [`LoopbackTransportFactory`]
pub struct LoopbackTransport {
    token: String,
    port: u16,
    stun: Option<String>,
    net: Arc<LoopbackNet>,
    state: Mutex<LinkState>,
}

fn render_sdp(token: &str, tracks: usize) -> String {
    let mut sdp = format!("v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n", token);
    for mid in 0..tracks {
        sdp.push_str(&format!("m=application 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:{}\r\n", mid));
    }
    sdp.push_str(&format!("a=ice-ufrag:{}\r\n", token));
    sdp
}

fn description_token(desc: &SessionDescription, kind: SdpKind) -> TransportResult<String> {
    if desc.kind != kind {
        return Err(TransportError::invalid_description(format!(
            "expected {:?}, got {:?}",
            kind, desc.kind
        )));
    }
    if !desc.sdp.starts_with("v=0") {
        return Err(TransportError::invalid_description("missing version line"));
    }
    desc.sdp
        .lines()
        .find(|l| l.starts_with("o="))
        .and_then(|l| l.split_whitespace().nth(1))
        .map(str::to_string)
        .ok_or_else(|| TransportError::invalid_description("missing origin line"))
}

fn candidate_token(candidate: &IceCandidate) -> Option<&str> {
    let mut parts = candidate.candidate.split_whitespace();
    parts.find(|p| *p == "ufrag")?;
    parts.next()
}

impl LoopbackTransport {
    fn emit(&self, event: TransportEvent) {
        let state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(events) = &state.events {
            let _ = events.send(event);
        }
    }

    fn gather(&self) {
        self.emit(TransportEvent::LocalCandidate(IceCandidate::new(format!(
            "candidate:1 1 udp 2130706431 127.0.0.1 {} typ host ufrag {}",
            self.port, self.token
        ))));
        if self.stun.is_some() {
            self.emit(TransportEvent::LocalCandidate(IceCandidate::new(format!(
                "candidate:2 1 udp 1694498815 203.0.113.7 {} typ srflx raddr 127.0.0.1 rport {} ufrag {}",
                self.port + 1,
                self.port,
                self.token
            ))));
        }
    }

    /// Token of the remote side once this side could carry media
    fn ready_for(&self) -> Option<String> {
        let state = self.state.lock();
        if state.closed || state.local.is_none() || !state.remote_candidate {
            return None;
        }
        state.remote_token.clone()
    }

    fn mark_flowing(&self) {
        let mut state = self.state.lock();
        if state.closed || state.flowing {
            return;
        }
        state.flowing = true;
        if let Some(events) = &state.events {
            let _ = events.send(TransportEvent::MediaFlowing);
        }
    }

    fn try_connect(&self) {
        let _serial = self.net.connect.lock();
        let Some(peer_token) = self.ready_for() else {
            return;
        };
        let Some(peer) = self.net.lookup(&peer_token) else {
            return;
        };
        if peer.ready_for().as_deref() == Some(self.token.as_str()) {
            debug!("Loopback transports {} and {} connected", self.token, peer.token);
            self.mark_flowing();
            peer.mark_flowing();
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    fn attach_local_tracks(&self, media: &Arc<dyn LocalMedia>) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.tracks = media.tracks().len();
        Ok(())
    }

    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        let offer = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.remote_token.is_some() {
                return Err(TransportError::invalid_state("remote description already applied"));
            }
            let offer = SessionDescription::offer(render_sdp(&self.token, state.tracks));
            state.local = Some(offer.clone());
            offer
        };
        self.gather();
        Ok(offer)
    }

    async fn accept_offer(&self, offer: &SessionDescription) -> TransportResult<SessionDescription> {
        let remote = description_token(offer, SdpKind::Offer)?;
        if remote == self.token {
            return Err(TransportError::invalid_description("offer originates from this transport"));
        }
        let answer = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.local.is_some() {
                return Err(TransportError::invalid_state("local description already set"));
            }
            let answer = SessionDescription::answer(render_sdp(&self.token, state.tracks));
            state.remote_token = Some(remote);
            state.local = Some(answer.clone());
            answer
        };
        self.gather();
        Ok(answer)
    }

    async fn apply_answer(&self, answer: &SessionDescription) -> TransportResult<()> {
        let remote = description_token(answer, SdpKind::Answer)?;
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            let has_offer = matches!(&state.local, Some(d) if d.kind == SdpKind::Offer);
            if !has_offer || state.remote_token.is_some() {
                return Err(TransportError::invalid_state("no pending local offer"));
            }
            state.remote_token = Some(remote);
        }
        self.try_connect();
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> TransportResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            let Some(remote) = state.remote_token.as_deref() else {
                return Err(TransportError::NoRemoteDescription);
            };
            if candidate_token(candidate) != Some(remote) {
                debug!("Loopback transport {} ignoring foreign candidate", self.token);
                return Ok(());
            }
            state.remote_candidate = true;
        }
        self.try_connect();
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.events = None;
        }
        self.net.transports.lock().remove(&self.token);
        debug!("Loopback transport {} closed", self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackMediaDevices;
    use crate::media::MediaDevices;
    use crate::config::MediaConstraints;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn candidates(events: &[TransportEvent]) -> Vec<IceCandidate> {
        events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::LocalCandidate(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn two_transports_connect_after_full_exchange() {
        let factory = LoopbackTransportFactory::new();
        let ice = IceConfig {
            servers: vec!["stun:stun.example.org".into()],
        };
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = factory.create(&ice, tx_a).unwrap();
        let b = factory.create(&ice, tx_b).unwrap();

        let media = LoopbackMediaDevices::new()
            .acquire(&MediaConstraints::default())
            .await
            .unwrap();
        a.attach_local_tracks(&media).unwrap();
        b.attach_local_tracks(&media).unwrap();

        let offer = a.create_offer().await.unwrap();
        let answer = b.accept_offer(&offer).await.unwrap();
        a.apply_answer(&answer).await.unwrap();

        let a_cands = candidates(&drain(&mut rx_a));
        let b_cands = candidates(&drain(&mut rx_b));
        assert_eq!(a_cands.len(), 2);

        for c in &b_cands {
            a.add_remote_candidate(c).await.unwrap();
        }
        assert!(drain(&mut rx_a).is_empty());
        b.add_remote_candidate(&a_cands[0]).await.unwrap();

        assert_eq!(drain(&mut rx_a), vec![TransportEvent::MediaFlowing]);
        assert_eq!(drain(&mut rx_b), vec![TransportEvent::MediaFlowing]);
        assert_eq!(factory.flowing(), 2);
    }

    #[tokio::test]
    async fn malformed_and_misplaced_descriptions_are_rejected() {
        let factory = LoopbackTransportFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let t = factory.create(&IceConfig::default(), tx).unwrap();

        let err = t.accept_offer(&SessionDescription::offer("garbage")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidDescription { .. }));

        let err = t.apply_answer(&SessionDescription::answer("v=0\r\no=- x 2 IN IP4 0.0.0.0\r\n")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState { .. }));

        let err = t.add_remote_candidate(&IceCandidate::new("candidate:1")).await.unwrap_err();
        assert_eq!(err, TransportError::NoRemoteDescription);
    }

    #[tokio::test]
    async fn closed_transport_is_silent() {
        let factory = LoopbackTransportFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let t = factory.create(&IceConfig::default(), tx).unwrap();
        t.close();
        t.close();

        assert_eq!(factory.live(), 0);
        assert_eq!(t.create_offer().await.unwrap_err(), TransportError::Closed);
        assert_eq!(factory.sever_links(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn refused_creates() {
        let factory = LoopbackTransportFactory::new();
        factory.fail_next_creates(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(factory.create(&IceConfig::default(), tx.clone()).is_err());
        assert!(factory.create(&IceConfig::default(), tx).is_ok());
        assert_eq!(factory.created(), 1);
    }
}
