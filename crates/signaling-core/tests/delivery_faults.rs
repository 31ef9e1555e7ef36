//! Fault injection on the in-memory hub: duplication, reordering, loss and
//! connection drops must be reproducible.

use teleconsult_signaling_core::prelude::*;
use teleconsult_signaling_core::{policy_fn, ChannelEvents, DeliveryDecision};

fn candidate(n: u32) -> NegotiationMessage {
    NegotiationMessage::Candidate {
        candidate: IceCandidate::new(format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host")),
    }
}

async fn pair(hub: &InMemoryHub, sid: &SessionId) -> (Box<dyn ChannelHandle>, ChannelEvents, Box<dyn ChannelHandle>, ChannelEvents) {
    let doctor = Participant::new("doctor-1", DeclaredRole::Doctor);
    let patient = Participant::new("patient-1", DeclaredRole::Patient);
    let mut a = hub.join(sid, &doctor).await.unwrap();
    let mut b = hub.join(sid, &patient).await.unwrap();
    let a_events = a.take_events().unwrap();
    let mut b_events = b.take_events().unwrap();
    // Subscribed + initial presence
    b_events.recv().await.unwrap();
    b_events.recv().await.unwrap();
    (a, a_events, b, b_events)
}

fn drain_messages(events: &mut ChannelEvents) -> Vec<NegotiationMessage> {
    let mut out = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if let ChannelEvent::Message(env) = ev {
            out.push(env.message);
        }
    }
    out
}

#[tokio::test]
async fn duplicate_policy_delivers_twice() {
    let hub = InMemoryHub::with_policy(policy_fn(|_| DeliveryDecision::Duplicate));
    let sid = SessionId::new("S1");
    let (a, _a_events, _b, mut b_events) = pair(&hub, &sid).await;

    a.send(candidate(1)).await.unwrap();

    assert_eq!(drain_messages(&mut b_events), vec![candidate(1), candidate(1)]);
    assert_eq!(hub.published(&sid).len(), 1);
}

#[tokio::test]
async fn deferred_message_is_released_after_the_next_one() {
    let hub = InMemoryHub::with_policy(policy_fn(|ctx| {
        if ctx.seq == 1 {
            DeliveryDecision::Defer
        } else {
            DeliveryDecision::Deliver
        }
    }));
    let sid = SessionId::new("S1");
    let (a, _a_events, _b, mut b_events) = pair(&hub, &sid).await;

    a.send(candidate(1)).await.unwrap();
    a.send(candidate(2)).await.unwrap();

    assert_eq!(drain_messages(&mut b_events), vec![candidate(2), candidate(1)]);
}

#[tokio::test]
async fn dropped_messages_never_arrive() {
    let hub = InMemoryHub::new();
    hub.set_policy(policy_fn(|ctx| match ctx.message {
        NegotiationMessage::Candidate { .. } => DeliveryDecision::Drop,
        _ => DeliveryDecision::Deliver,
    }));
    let sid = SessionId::new("S1");
    let (a, _a_events, _b, mut b_events) = pair(&hub, &sid).await;

    a.send(candidate(1)).await.unwrap();

    assert!(drain_messages(&mut b_events).is_empty());
}

#[tokio::test]
async fn disconnect_notifies_victim_and_peers() {
    let hub = InMemoryHub::new();
    let sid = SessionId::new("S1");
    let (a, mut a_events, b, mut b_events) = pair(&hub, &sid).await;
    a.publish_presence(&Participant::new("doctor-1", DeclaredRole::Doctor)).await.unwrap();
    b.publish_presence(&Participant::new("patient-1", DeclaredRole::Patient)).await.unwrap();
    assert_eq!(hub.present(&sid).len(), 2);

    assert_eq!(hub.disconnect(&sid, &UserId::new("patient-1")), 1);

    let mut saw_disconnect = false;
    while let Ok(ev) = b_events.try_recv() {
        if matches!(ev, ChannelEvent::Disconnected { .. }) {
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);

    let mut last_presence = None;
    while let Ok(ev) = a_events.try_recv() {
        if let ChannelEvent::PresenceChanged { present } = ev {
            last_presence = Some(present);
        }
    }
    let present = last_presence.expect("doctor saw presence updates");
    assert_eq!(present.len(), 1);
    assert_eq!(present[0].user_id, UserId::new("doctor-1"));
    assert!(matches!(b.send(candidate(9)).await, Err(SignalingError::NotJoined { .. })));
}
