//! In-process loopback middleware
//!
//! Every `mw-server` name maps to one process-wide broker. Connections that
//! join the same broker see each other's traffic, including their own
//! publications when they subscribe to a matching pattern. A message is
//! queued for a session only when one of the session's patterns matches at
//! publish time, and is dropped at receive time if the session has since
//! unsubscribed.
//!
//! A broker lives only while it has sessions; the last session to leave
//! removes it from the process-wide table.
//!
//! Fault injection options (`mw-sim-*`) let tests exercise failure paths.

use super::{Transport, Wait};
use crate::{options, BusError, BusResult};
use async_trait::async_trait;
use config::Config;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, trace};
use types::{subject, Message};

pub const MW_ID: &str = "loopback";

static BROKERS: Lazy<DashMap<String, Arc<LoopbackBroker>>> = Lazy::new(DashMap::new);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

type SessionId = u64;

#[derive(Debug)]
struct SessionEntry {
    patterns: Vec<String>,
    inbox: mpsc::UnboundedSender<Message>,
}

/// Shared routing table for one `mw-server`
#[derive(Debug, Default)]
struct LoopbackBroker {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl LoopbackBroker {
    /// Join the broker for `server`, creating it if needed. Registration
    /// happens under the table entry so a concurrent release cannot drop
    /// the broker in between.
    fn join(server: &str, id: SessionId) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let broker = BROKERS.entry(server.to_string()).or_default();
        let inbox = broker.register(id);
        (broker.value().clone(), inbox)
    }

    /// Leave the broker, removing it from the table once no sessions remain
    fn leave(&self, server: &str, id: SessionId) {
        self.unregister(id);
        let removed = BROKERS
            .remove_if(server, |_, broker| broker.sessions.read().is_empty())
            .is_some();
        if removed {
            debug!(server, "Loopback broker released");
        }
    }

    fn register(&self, id: SessionId) -> mpsc::UnboundedReceiver<Message> {
        let (inbox, outbox) = mpsc::unbounded_channel();
        self.sessions.write().insert(
            id,
            SessionEntry {
                patterns: Vec::new(),
                inbox,
            },
        );
        outbox
    }

    fn unregister(&self, id: SessionId) {
        self.sessions.write().remove(&id);
    }

    fn add_pattern(&self, id: SessionId, pattern: &str) {
        if let Some(entry) = self.sessions.write().get_mut(&id) {
            if !entry.patterns.iter().any(|p| p == pattern) {
                entry.patterns.push(pattern.to_string());
            }
        }
    }

    fn remove_pattern(&self, id: SessionId, pattern: &str) -> bool {
        match self.sessions.write().get_mut(&id) {
            Some(entry) => {
                let before = entry.patterns.len();
                entry.patterns.retain(|p| p != pattern);
                entry.patterns.len() != before
            }
            None => false,
        }
    }

    fn is_subscribed(&self, id: SessionId, subject: &str) -> bool {
        self.sessions
            .read()
            .get(&id)
            .is_some_and(|entry| entry.patterns.iter().any(|p| subject::matches(subject, p)))
    }

    /// Queue `message` for every session with a matching pattern
    fn deliver(&self, message: &Message) -> usize {
        let sessions = self.sessions.read();
        let mut delivered = 0;
        for entry in sessions.values() {
            let interested = entry
                .patterns
                .iter()
                .any(|p| subject::matches(message.subject(), p));
            if interested && entry.inbox.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[derive(Debug)]
struct LoopbackSession {
    id: SessionId,
    broker: Arc<LoopbackBroker>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

/// Simulated middleware faults read from configuration
#[derive(Debug, Clone, Copy, Default)]
struct SimulatedFaults {
    connect: bool,
    subscribe: bool,
    publish: bool,
    receive: bool,
    publish_delay: Duration,
}

impl SimulatedFaults {
    fn from_config(config: &Config) -> Self {
        let delay_ms = config.get_integer_value(options::SIM_PUBLISH_DELAY_MS, 0).max(0);
        Self {
            connect: config.get_boolean_value(options::SIM_CONNECT_FAILURE, false),
            subscribe: config.get_boolean_value(options::SIM_SUBSCRIBE_FAILURE, false),
            publish: config.get_boolean_value(options::SIM_PUBLISH_FAILURE, false),
            receive: config.get_boolean_value(options::SIM_RECEIVE_FAILURE, false),
            publish_delay: Duration::from_millis(delay_ms as u64),
        }
    }
}

/// Transport that routes through an in-process broker
#[derive(Debug)]
pub struct LoopbackTransport {
    server: String,
    session: Option<LoopbackSession>,
    faults: SimulatedFaults,
}

impl LoopbackTransport {
    pub fn new(config: &Config) -> Self {
        let server = config
            .get_value(options::MW_SERVER, options::DEFAULT_SERVER)
            .to_string();
        Self {
            server,
            session: None,
            faults: SimulatedFaults::from_config(config),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn session(&self) -> BusResult<&LoopbackSession> {
        self.session
            .as_ref()
            .ok_or_else(|| BusError::NotConnected(format!("loopback session on '{}'", self.server)))
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn library_version(&self) -> String {
        format!("loopback {}", env!("CARGO_PKG_VERSION"))
    }

    async fn connect(&mut self) -> BusResult<()> {
        if self.session.is_some() {
            return Err(BusError::Connection("loopback session already open".to_string()));
        }
        if self.faults.connect {
            return Err(BusError::Connection("Simulated connect failure".to_string()));
        }

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (broker, inbox) = LoopbackBroker::join(&self.server, id);
        self.session = Some(LoopbackSession { id, broker, inbox });
        debug!(server = %self.server, session = id, "Loopback session opened");
        Ok(())
    }

    async fn disconnect(&mut self) -> BusResult<()> {
        let session = self.session.take().ok_or_else(|| {
            BusError::NotConnected(format!("loopback session on '{}'", self.server))
        })?;
        session.broker.leave(&self.server, session.id);
        debug!(server = %self.server, session = session.id, "Loopback session closed");
        Ok(())
    }

    async fn publish(&mut self, message: &Message) -> BusResult<()> {
        let broker = Arc::clone(&self.session()?.broker);
        if self.faults.publish {
            return Err(BusError::Transport("Simulated publish failure".to_string()));
        }

        let delivered = broker.deliver(message);
        trace!(subject = message.subject(), delivered, "Loopback publish");

        if !self.faults.publish_delay.is_zero() {
            tokio::time::sleep(self.faults.publish_delay).await;
        }
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &str) -> BusResult<()> {
        let session = self.session()?;
        if self.faults.subscribe {
            return Err(BusError::Transport("Simulated subscribe failure".to_string()));
        }
        session.broker.add_pattern(session.id, pattern);
        Ok(())
    }

    async fn unsubscribe(&mut self, pattern: &str) -> BusResult<()> {
        let session = self.session()?;
        if !session.broker.remove_pattern(session.id, pattern) {
            debug!(pattern, "Unsubscribe for unknown loopback pattern");
        }
        Ok(())
    }

    async fn receive(&mut self, wait: Wait) -> BusResult<Option<Message>> {
        if self.faults.receive {
            return Err(BusError::Transport("Simulated receive failure".to_string()));
        }
        let server = &self.server;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BusError::NotConnected(format!("loopback session on '{server}'")))?;
        let closed = || BusError::Transport(format!("loopback broker '{server}' closed the session"));

        let deadline = match wait {
            Wait::For(duration) => Some(Instant::now() + duration),
            Wait::Forever | Wait::Poll => None,
        };

        loop {
            let received = match (wait, deadline) {
                (Wait::Poll, _) => match session.inbox.try_recv() {
                    Ok(message) => Some(message),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return Err(closed()),
                },
                (_, Some(deadline)) => {
                    match tokio::time::timeout_at(deadline, session.inbox.recv()).await {
                        Ok(Some(message)) => Some(message),
                        Ok(None) => return Err(closed()),
                        Err(_) => None,
                    }
                }
                (_, None) => Some(session.inbox.recv().await.ok_or_else(closed)?),
            };

            let Some(message) = received else {
                return Ok(None);
            };
            if session.broker.is_subscribed(session.id, message.subject()) {
                return Ok(Some(message));
            }
            trace!(subject = message.subject(), "Dropping message for removed subscription");
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.broker.leave(&self.server, session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Field, MessageKind};

    fn transport(server: &str, extra: &[&str]) -> LoopbackTransport {
        let mut args = vec!["mw-id=loopback".to_string(), format!("mw-server={server}")];
        args.extend(extra.iter().map(|s| s.to_string()));
        LoopbackTransport::new(&Config::from_args(args))
    }

    fn message(subject: &str) -> Message {
        let mut message = Message::new(subject, MessageKind::Publish);
        message.add_field(Field::new("N", 1u32).unwrap());
        message
    }

    #[tokio::test]
    async fn test_delivers_only_to_matching_sessions() {
        let mut publisher = transport("lb-match", &[]);
        let mut listener = transport("lb-match", &[]);
        let mut other = transport("lb-match", &[]);
        publisher.connect().await.unwrap();
        listener.connect().await.unwrap();
        other.connect().await.unwrap();

        listener.subscribe("A.*").await.unwrap();
        other.subscribe("B.>").await.unwrap();

        publisher.publish(&message("A.ONE")).await.unwrap();

        let got = listener.receive(Wait::Poll).await.unwrap().unwrap();
        assert_eq!(got.subject(), "A.ONE");
        assert!(other.receive(Wait::Poll).await.unwrap().is_none());
        assert!(publisher.receive(Wait::Poll).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_servers_are_isolated() {
        let mut left = transport("lb-left", &[]);
        let mut right = transport("lb-right", &[]);
        left.connect().await.unwrap();
        right.connect().await.unwrap();
        right.subscribe(">").await.unwrap();

        left.publish(&message("X.Y")).await.unwrap();
        assert!(right.receive(Wait::Poll).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribed_messages_are_dropped_at_receive() {
        let mut session = transport("lb-unsub", &[]);
        session.connect().await.unwrap();
        session.subscribe("Q.>").await.unwrap();
        session.publish(&message("Q.R")).await.unwrap();
        session.unsubscribe("Q.>").await.unwrap();

        let got = session
            .receive(Wait::For(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_simulated_faults() {
        let mut failing = transport("lb-faults", &["mw-sim-connect-failure=true"]);
        assert!(matches!(failing.connect().await, Err(BusError::Connection(_))));

        let mut flaky = transport(
            "lb-faults",
            &["mw-sim-publish-failure=yes", "mw-sim-receive-failure=yes"],
        );
        flaky.connect().await.unwrap();
        assert!(matches!(flaky.publish(&message("A")).await, Err(BusError::Transport(_))));
        assert!(matches!(flaky.receive(Wait::Poll).await, Err(BusError::Transport(_))));

        let mut deaf = transport("lb-faults", &["mw-sim-subscribe-failure=true"]);
        deaf.connect().await.unwrap();
        assert!(matches!(deaf.subscribe("A.>").await, Err(BusError::Transport(_))));
        deaf.publish(&message("A.B")).await.unwrap();
        assert!(deaf.receive(Wait::Poll).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_simulated_publish_delay() {
        let mut slow = transport("lb-delay", &["mw-sim-publish-delay-ms=100"]);
        slow.connect().await.unwrap();
        slow.subscribe(">").await.unwrap();

        let started = std::time::Instant::now();
        slow.publish(&message("SLOW.ONE")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(slow.receive(Wait::Poll).await.unwrap().is_some());

        let mut fast = transport("lb-delay", &[]);
        fast.connect().await.unwrap();
        let started = std::time::Instant::now();
        fast.publish(&message("FAST.ONE")).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_requires_open_session() {
        let mut session = transport("lb-closed", &[]);
        assert!(matches!(
            session.publish(&message("A")).await,
            Err(BusError::NotConnected(_))
        ));
        session.connect().await.unwrap();
        assert!(session.connect().await.is_err());
        session.disconnect().await.unwrap();
        assert!(matches!(session.disconnect().await, Err(BusError::NotConnected(_))));
    }

    #[test]
    fn test_dropped_session_leaves_broker() {
        let mut session = transport("lb-drop", &[]);
        tokio_test::block_on(async {
            session.connect().await.unwrap();
            session.subscribe(">").await.unwrap();
        });
        let broker = BROKERS.get("lb-drop").unwrap().value().clone();
        assert_eq!(broker.deliver(&message("D.ONE")), 1);

        drop(session);
        assert_eq!(broker.deliver(&message("D.TWO")), 0);
        assert!(!BROKERS.contains_key("lb-drop"));
    }

    #[tokio::test]
    async fn test_last_session_releases_broker() {
        let mut first = transport("lb-release", &[]);
        let mut second = transport("lb-release", &[]);
        first.connect().await.unwrap();
        second.connect().await.unwrap();

        first.disconnect().await.unwrap();
        assert!(BROKERS.contains_key("lb-release"));
        second.disconnect().await.unwrap();
        assert!(!BROKERS.contains_key("lb-release"));

        // Sessions opened after the release share a fresh broker
        let mut listener = transport("lb-release", &[]);
        listener.connect().await.unwrap();
        listener.subscribe(">").await.unwrap();
        first.connect().await.unwrap();
        first.publish(&message("AGAIN.ONE")).await.unwrap();
        assert!(listener.receive(Wait::Poll).await.unwrap().is_some());
    }
}
