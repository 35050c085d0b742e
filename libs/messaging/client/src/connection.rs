//! # Bus Connection
//!
//! A [`Connection`] is one component's session on the bus. It owns a
//! middleware [`Transport`], a [`MessageFactory`] stamped with the
//! component's standard fields, and the request/reply bookkeeping.
//!
//! ## Lifecycle
//!
//! `Unconnected -> Connected -> Disconnected`. A disconnected connection is
//! finished; create a new one to reconnect.
//!
//! ## Outgoing messages
//!
//! Every message is copied before sending. The copy gets an automatic
//! subject when it has none, PUBLISH-TIME when tracking is enabled, and is
//! validated (subject always, content when configured). The caller's
//! message is never modified.

use crate::factory::template::COMPONENT;
use crate::request::RequestReplyCoordinator;
use crate::transport::{Deadline, Transport, TransportFactory};
use crate::{options, validation, BusError, BusResult, MessageFactory};
use chrono::Utc;
use config::Config;
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use types::{subject, Field, Message, MessageKind};

/// PUBLISH-TIME layout: year, day of year, time of day with milliseconds
const PUBLISH_TIME_FORMAT: &str = "%Y-%j-%H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Disconnected,
}

/// Handle for an active subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionInfo {
    id: u64,
    pattern: String,
}

impl SubscriptionInfo {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug)]
pub struct Connection {
    id: String,
    config: Config,
    factory: MessageFactory,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    subscriptions: Vec<SubscriptionInfo>,
    next_subscription_id: u64,
    /// Messages that arrived while waiting for a reply
    deferred: VecDeque<Message>,
    requests: RequestReplyCoordinator,
    reply_subscribed: bool,
    validate_content: bool,
    track_publish_time: bool,
}

impl Connection {
    pub fn new(config: &Config) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            requests: RequestReplyCoordinator::new(&id),
            id,
            config: config.clone(),
            factory: MessageFactory::new(),
            state: ConnectionState::Unconnected,
            transport: None,
            subscriptions: Vec::new(),
            next_subscription_id: 1,
            deferred: VecDeque::new(),
            reply_subscribed: false,
            validate_content: options::validation_enabled(config),
            track_publish_time: config.get_boolean_value(options::TRACKING_PUBLISH_TIME, true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn message_factory(&self) -> &MessageFactory {
        &self.factory
    }

    pub fn message_factory_mut(&mut self) -> &mut MessageFactory {
        &mut self.factory
    }

    /// Middleware library version, once connected
    pub fn library_version(&self) -> Option<String> {
        self.transport.as_ref().map(|t| t.library_version())
    }

    pub fn subscriptions(&self) -> &[SubscriptionInfo] {
        &self.subscriptions
    }

    pub async fn connect(&mut self) -> BusResult<()> {
        match self.state {
            ConnectionState::Unconnected => {}
            ConnectionState::Connected => {
                return Err(BusError::Connection("already connected".to_string()))
            }
            ConnectionState::Disconnected => {
                return Err(BusError::Connection(
                    "connection was disconnected; create a new connection".to_string(),
                ))
            }
        }

        let mut transport = TransportFactory::create_transport(&self.config)?;
        if let Err(e) = transport.connect().await {
            warn!(connection = %self.id, error = %e, "Connect failed");
            return Err(e);
        }

        info!(
            connection = %self.id,
            middleware = %transport.library_version(),
            "Connected"
        );
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub async fn disconnect(&mut self) -> BusResult<()> {
        self.ensure_connected("disconnect")?;
        let mut transport = self
            .transport
            .take()
            .ok_or_else(|| BusError::NotConnected("no transport".to_string()))?;

        self.state = ConnectionState::Disconnected;
        self.subscriptions.clear();
        self.deferred.clear();
        self.reply_subscribed = false;

        transport.disconnect().await?;
        info!(connection = %self.id, "Disconnected");
        Ok(())
    }

    /// Publish a PUBLISH-kind message
    pub async fn publish(&mut self, message: &Message) -> BusResult<()> {
        self.ensure_connected("publish")?;
        if message.kind() != MessageKind::Publish {
            return Err(BusError::Validation(format!(
                "publish() needs a PUBLISH message, got {}; use request() or reply()",
                message.kind()
            )));
        }

        let outgoing = self.prepare_outgoing(message)?;
        self.transport_mut()?.publish(&outgoing).await?;
        debug!(connection = %self.id, subject = outgoing.subject(), "Published");
        Ok(())
    }

    /// Subscribe to a subject pattern. Subscribing to a pattern that is
    /// already active returns the existing handle.
    pub async fn subscribe(&mut self, pattern: &str) -> BusResult<SubscriptionInfo> {
        self.ensure_connected("subscribe")?;
        subject::validate_pattern(pattern).map_err(|e| BusError::Validation(e.to_string()))?;

        if let Some(existing) = self.subscriptions.iter().find(|s| s.pattern == pattern) {
            return Ok(existing.clone());
        }

        self.transport_mut()?.subscribe(pattern).await?;
        let info = SubscriptionInfo {
            id: self.next_subscription_id,
            pattern: pattern.to_string(),
        };
        self.next_subscription_id += 1;
        self.subscriptions.push(info.clone());
        debug!(connection = %self.id, pattern, "Subscribed");
        Ok(info)
    }

    pub async fn unsubscribe(&mut self, subscription: &SubscriptionInfo) -> BusResult<()> {
        self.ensure_connected("unsubscribe")?;
        let position = self
            .subscriptions
            .iter()
            .position(|s| s == subscription)
            .ok_or_else(|| {
                BusError::InvalidArgument(format!(
                    "no active subscription for '{}'",
                    subscription.pattern
                ))
            })?;

        let reply_subject = self.requests.reply_subject().to_string();
        let keep_for_replies =
            self.reply_subscribed && subscription.pattern == reply_subject;
        if !keep_for_replies {
            self.transport_mut()?.unsubscribe(&subscription.pattern).await?;
        }
        self.subscriptions.remove(position);
        debug!(connection = %self.id, pattern = %subscription.pattern, "Unsubscribed");
        Ok(())
    }

    /// Next message matching one of this connection's subscriptions.
    ///
    /// `timeout_ms < 0` waits forever, `0` polls once and `> 0` waits at
    /// most that long. Returns None when nothing arrived in time.
    pub async fn receive(&mut self, timeout_ms: i32) -> BusResult<Option<Message>> {
        self.ensure_connected("receive")?;
        if let Some(message) = self.deferred.pop_front() {
            return Ok(Some(message));
        }

        let deadline = Deadline::from_millis(timeout_ms);
        loop {
            let Some(message) = self.transport_mut()?.receive(deadline.remaining()).await? else {
                return Ok(None);
            };
            if self.requests.is_reply_traffic(&message) && !self.user_subscribed(message.subject()) {
                debug!(
                    connection = %self.id,
                    "Dropping reply with no pending request"
                );
                continue;
            }
            return Ok(Some(message));
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// Returns None when no matching reply arrives before the timeout.
    /// Other traffic received while waiting is kept for later `receive`
    /// calls.
    pub async fn request(
        &mut self,
        request: &Message,
        timeout_ms: i32,
    ) -> BusResult<Option<Message>> {
        self.ensure_connected("request")?;

        let mut prepared = request.clone();
        let request_id = self.requests.prepare_request(&mut prepared)?;
        let outgoing = self.prepare_outgoing(&prepared)?;
        self.ensure_reply_subscription().await?;

        self.transport_mut()?.publish(&outgoing).await?;
        debug!(
            connection = %self.id,
            subject = outgoing.subject(),
            request_id = %request_id,
            "Request sent"
        );

        let deadline = Deadline::from_millis(timeout_ms);
        loop {
            let wait = deadline.remaining();
            let Some(message) = self.transport_mut()?.receive(wait).await? else {
                debug!(connection = %self.id, request_id = %request_id, "Request timed out");
                return Ok(None);
            };

            if self.requests.is_matching_reply(&message, &request_id) {
                return Ok(Some(message));
            }
            if self.requests.is_reply_traffic(&message) {
                debug!(
                    connection = %self.id,
                    expected = %request_id,
                    received = ?message.string_value(crate::request::REQUEST_ID),
                    "Discarding reply for another request"
                );
                continue;
            }
            self.deferred.push_back(message);
        }
    }

    /// Send `reply` to the originator of `request`
    pub async fn reply(&mut self, request: &Message, reply: &Message) -> BusResult<()> {
        self.ensure_connected("reply")?;
        let component = self.component_identity(reply);
        let built = RequestReplyCoordinator::build_reply(request, reply, &component)?;
        let outgoing = self.prepare_outgoing(&built)?;

        self.transport_mut()?.publish(&outgoing).await?;
        debug!(connection = %self.id, subject = outgoing.subject(), "Reply sent");
        Ok(())
    }

    fn ensure_connected(&self, operation: &str) -> BusResult<()> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(BusError::NotConnected(format!(
                "{operation} requires a connected connection (state: {:?})",
                self.state
            )))
        }
    }

    fn transport_mut(&mut self) -> BusResult<&mut Box<dyn Transport>> {
        self.transport
            .as_mut()
            .ok_or_else(|| BusError::NotConnected("no transport".to_string()))
    }

    async fn ensure_reply_subscription(&mut self) -> BusResult<()> {
        if self.reply_subscribed {
            return Ok(());
        }
        let reply_subject = self.requests.reply_subject().to_string();
        self.transport_mut()?.subscribe(&reply_subject).await?;
        self.reply_subscribed = true;
        Ok(())
    }

    fn user_subscribed(&self, subject: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|s| subject::matches(subject, &s.pattern))
    }

    /// COMPONENT value used on replies from this connection
    fn component_identity(&self, reply: &Message) -> String {
        reply
            .string_value(COMPONENT)
            .or_else(|| {
                self.factory
                    .standard_fields()
                    .iter()
                    .find(|f| f.name() == COMPONENT)
                    .map(Field::string_value)
            })
            .or_else(|| self.config.value(options::COMPONENT).map(str::to_string))
            .unwrap_or_else(|| self.id.to_ascii_uppercase())
    }

    fn prepare_outgoing(&self, message: &Message) -> BusResult<Message> {
        let mut outgoing = message.clone();

        if outgoing.subject().is_empty() {
            if let Some(schema_id) = outgoing.schema_id() {
                let template = self.factory.directory().find(schema_id)?;
                let subject = template.build_subject(&outgoing);
                outgoing
                    .set_subject(subject)
                    .map_err(|e| BusError::Validation(e.to_string()))?;
            }
        }
        validation::validate_subject(&outgoing)?;

        if self.validate_content {
            validation::validate_content(&outgoing, self.factory.directory())?;
        }

        if self.track_publish_time {
            let stamp = Utc::now().format(PUBLISH_TIME_FORMAT).to_string();
            outgoing.add_field(Field::header(crate::factory::template::PUBLISH_TIME, stamp)?);
        }
        Ok(outgoing)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::Connected {
            warn!(connection = %self.id, "Connection dropped while connected");
        }
    }
}
