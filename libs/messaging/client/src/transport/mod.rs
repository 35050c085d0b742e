//! Middleware Transport Layer
//!
//! A [`Transport`] is the narrow boundary between a [`Connection`](crate::Connection)
//! and a concrete middleware binding. Connections own the lifecycle state
//! machine, validation and request correlation; transports only move
//! messages.

use crate::{options, BusError, BusResult};
use async_trait::async_trait;
use config::Config;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;
use types::Message;

pub mod loopback;

pub use loopback::LoopbackTransport;

/// Timeout value meaning "block until a message arrives"
pub const WAIT_FOREVER: i32 = -1;
/// Timeout value meaning "return immediately if nothing is queued"
pub const NO_WAIT: i32 = 0;

/// How long a receive may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Forever,
    Poll,
    For(Duration),
}

impl Wait {
    /// Map a millisecond timeout: negative waits forever, zero polls
    pub fn from_millis(timeout_ms: i32) -> Self {
        match timeout_ms {
            t if t < 0 => Wait::Forever,
            0 => Wait::Poll,
            t => Wait::For(Duration::from_millis(t as u64)),
        }
    }
}

/// A fixed point in time that repeated receives count down to
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Never,
    Immediate,
    At(Instant),
}

impl Deadline {
    pub(crate) fn from_millis(timeout_ms: i32) -> Self {
        match Wait::from_millis(timeout_ms) {
            Wait::Forever => Deadline::Never,
            Wait::Poll => Deadline::Immediate,
            Wait::For(duration) => Deadline::At(Instant::now() + duration),
        }
    }

    pub(crate) fn remaining(&self) -> Wait {
        match self {
            Deadline::Never => Wait::Forever,
            Deadline::Immediate => Wait::Poll,
            Deadline::At(at) => {
                let now = Instant::now();
                if now >= *at {
                    Wait::Poll
                } else {
                    Wait::For(*at - now)
                }
            }
        }
    }
}

/// Middleware binding used by a connection
#[async_trait]
pub trait Transport: Send + Debug {
    /// Version string of the underlying middleware library
    fn library_version(&self) -> String;

    async fn connect(&mut self) -> BusResult<()>;

    async fn disconnect(&mut self) -> BusResult<()>;

    /// Deliver a fully prepared message to every matching subscriber
    async fn publish(&mut self, message: &Message) -> BusResult<()>;

    async fn subscribe(&mut self, pattern: &str) -> BusResult<()>;

    async fn unsubscribe(&mut self, pattern: &str) -> BusResult<()>;

    /// Next message matching a current subscription, or None when the wait elapses
    async fn receive(&mut self, wait: Wait) -> BusResult<Option<Message>>;
}

/// Creates transports from the `mw-id` option
pub struct TransportFactory;

impl TransportFactory {
    pub fn create_transport(config: &Config) -> BusResult<Box<dyn Transport>> {
        let mw_id = config.value(options::MW_ID).ok_or_else(|| {
            BusError::Connection(format!("'{}' is not configured", options::MW_ID))
        })?;

        match mw_id.trim().to_ascii_lowercase().as_str() {
            loopback::MW_ID => Ok(Box::new(LoopbackTransport::new(config))),
            other => Err(BusError::Connection(format!(
                "Unsupported middleware '{other}'"
            ))),
        }
    }
}
