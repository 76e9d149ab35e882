//! The single task that owns the relay state.
//!
//! Sessions forward `(ConnectionId, Inbound)` pairs over one bounded channel.
//! The coordinator runs the [`Router`] for each pair to completion, then
//! hands the resulting dispatches to the [`ConnectionRegistry`]. Because it is
//! the only owner of the stores, handlers never interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use maptalk_core::{ConnectionId, Inbound, Router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::websocket::registry::ConnectionRegistry;

/// Message from a session to the coordinator.
pub type InboundMessage = (ConnectionId, Inbound);

/// Store sizes published by the coordinator for `/health`.
#[derive(Debug, Default)]
pub struct RelayStats {
    online_users: AtomicUsize,
    rooms: AtomicUsize,
}

impl RelayStats {
    /// Logged-in users after the last processed event.
    pub fn online_users(&self) -> usize {
        self.online_users.load(Ordering::Relaxed)
    }

    /// Published rooms after the last processed event.
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    fn record(&self, router: &Router) {
        self.online_users
            .store(router.presence().len(), Ordering::Relaxed);
        self.rooms.store(router.rooms().len(), Ordering::Relaxed);
    }
}

/// Process inbound events until the channel closes or `cancel` fires.
///
/// On cancel the channel is closed and events already queued are still
/// processed, so disconnects sent by closing sessions are not lost.
pub async fn run_coordinator(
    mut rx: mpsc::Receiver<InboundMessage>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) {
    let mut router = Router::new();
    info!("coordinator started");

    loop {
        let msg = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = rx.recv() => msg,
        };
        let Some((origin, inbound)) = msg else { break };
        process(&mut router, &registry, &stats, &origin, inbound);
    }

    rx.close();
    let mut drained = 0usize;
    while let Some((origin, inbound)) = rx.recv().await {
        process(&mut router, &registry, &stats, &origin, inbound);
        drained += 1;
    }

    info!(
        drained,
        online_users = router.presence().len(),
        rooms = router.rooms().len(),
        "coordinator stopped"
    );
}

fn process(
    router: &mut Router,
    registry: &ConnectionRegistry,
    stats: &RelayStats,
    origin: &ConnectionId,
    inbound: Inbound,
) {
    let kind = inbound_name(&inbound);
    let dispatches = router.handle(origin, inbound);
    stats.record(router);
    let mut recipients = 0;
    for dispatch in &dispatches {
        recipients += registry.deliver(dispatch);
    }
    debug!(
        conn_id = %origin,
        event = kind,
        dispatches = dispatches.len(),
        recipients,
        "event processed"
    );
}

fn inbound_name(inbound: &Inbound) -> &'static str {
    match inbound {
        Inbound::Connected => "connect",
        Inbound::Event(ev) => ev.name(),
        Inbound::Disconnected => "disconnect",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maptalk_core::{ClientEvent, LoginPayload, Position};
    use std::time::Duration;

    async fn recv_json(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn runs_router_and_fans_out() {
        let registry = Arc::new(ConnectionRegistry::new(16, 16));
        let stats = Arc::new(RelayStats::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run_coordinator(
            rx,
            Arc::clone(&registry),
            Arc::clone(&stats),
            cancel.clone(),
        ));

        let (a, mut ra) = registry.register();
        let (_b, mut rb) = registry.register();
        tx.send((a.id.clone(), Inbound::Connected)).await.unwrap();
        assert_eq!(recv_json(&mut ra).await["event"], "onlineUsers");
        assert_eq!(recv_json(&mut ra).await["event"], "rooms");

        tx.send((
            a.id.clone(),
            Inbound::Event(ClientEvent::Login(LoginPayload {
                name: "Ann".into(),
                position: Position::new(1.0, 2.0),
            })),
        ))
        .await
        .unwrap();

        let joined = recv_json(&mut rb).await;
        assert_eq!(joined["event"], "userJoined");
        assert_eq!(joined["data"]["id"], a.id.as_str());
        let roster = recv_json(&mut ra).await;
        assert_eq!(roster["event"], "onlineUsers");
        assert_eq!(roster["data"].as_array().unwrap().len(), 1);
        assert_eq!(stats.online_users(), 1);

        tx.send((a.id.clone(), Inbound::Disconnected)).await.unwrap();
        let left = recv_json(&mut rb).await;
        assert_eq!(left["event"], "userLeft");
        assert_eq!(left["data"], "Ann");

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(stats.online_users(), 0);
    }

    #[tokio::test]
    async fn stops_when_channel_closes() {
        let registry = Arc::new(ConnectionRegistry::new(4, 4));
        let (tx, rx) = mpsc::channel::<InboundMessage>(4);
        drop(tx);
        run_coordinator(
            rx,
            registry,
            Arc::new(RelayStats::default()),
            CancellationToken::new(),
        )
        .await;
    }

    #[tokio::test]
    async fn queued_events_are_processed_after_cancel() {
        let registry = Arc::new(ConnectionRegistry::new(16, 16));
        let stats = Arc::new(RelayStats::default());
        let (tx, rx) = mpsc::channel(16);

        let (a, _ra) = registry.register();
        let (_b, mut rb) = registry.register();
        let a_id = a.id.clone();
        tx.send((
            a_id.clone(),
            Inbound::Event(ClientEvent::Login(LoginPayload {
                name: "Ann".into(),
                position: Position::new(1.0, 2.0),
            })),
        ))
        .await
        .unwrap();
        tx.send((a_id.clone(), Inbound::Disconnected)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        run_coordinator(rx, Arc::clone(&registry), Arc::clone(&stats), cancel).await;

        assert_eq!(recv_json(&mut rb).await["event"], "userJoined");
        let left = recv_json(&mut rb).await;
        assert_eq!(left["event"], "userLeft");
        assert_eq!(left["data"], "Ann");
        assert_eq!(stats.online_users(), 0);
        assert!(tx.send((a_id, Inbound::Connected)).await.is_err());
    }

    #[test]
    fn inbound_names() {
        assert_eq!(inbound_name(&Inbound::Connected), "connect");
        assert_eq!(inbound_name(&Inbound::Disconnected), "disconnect");
    }
}
