//! # Bus Client
//!
//! Client side of the C2 message bus: connect to a middleware, publish and
//! subscribe, correlate requests with replies, and run periodic heartbeat
//! and resource publishers.
//!
//! ## Architecture
//!
//! ```text
//! Config ──> Connection ──> Transport (loopback, ...)
//!              │   │
//!              │   └── RequestReplyCoordinator
//!              └── MessageFactory ──> TemplateDirectory
//!
//! HeartbeatGenerator / ResourceGenerator
//!     └── PeriodicGenerator (own Connection, background task)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bus_client::{Connection, BusResult};
//! use config::Config;
//! use types::Field;
//!
//! # async fn run() -> BusResult<()> {
//! let config = Config::from_args(["mw-id=loopback"]);
//! let mut connection = Connection::new(&config);
//! connection.message_factory_mut().set_standard_fields([
//!     Field::header("MISSION-ID", "MSN")?,
//!     Field::header("FACILITY", "FAC")?,
//!     Field::header("COMPONENT", "DEMO")?,
//! ]);
//! connection.connect().await?;
//!
//! let mut log = connection.message_factory().create_message("LOG")?;
//! log.add_field(Field::new("SEVERITY", 1i16)?);
//! log.add_field(Field::new("MSG-TEXT", "hello")?);
//! connection.publish(&log).await?;
//!
//! connection.disconnect().await
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod factory;
pub mod generator;
pub mod options;
pub mod request;
pub mod transport;
pub mod validation;

pub use connection::{Connection, ConnectionState, SubscriptionInfo};
pub use error::{BusError, BusResult};
pub use factory::{MessageFactory, MessageTemplate, TemplateDirectory};
pub use generator::{GeneratorState, HeartbeatGenerator, ResourceGenerator};
pub use request::{RequestReplyCoordinator, ResponseStatus};
pub use transport::{Transport, TransportFactory, Wait, NO_WAIT, WAIT_FOREVER};
