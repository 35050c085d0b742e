//! # Bus Message Types
//!
//! Shared data model for bus clients: typed [`Field`]s, [`Message`]s and
//! the subject grammar used for routing and subscriptions.
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Field, Message, MessageKind};
//!
//! let mut message = Message::new("C2MS.MSN.MSG.HB", MessageKind::Publish);
//! message.add_field(Field::header("MISSION-ID", "MSN").unwrap());
//! message.add_field(Field::new("PUB-RATE", 30u16).unwrap());
//!
//! assert_eq!(message.integer_value("PUB-RATE"), Some(30));
//! assert!(types::subject::matches(message.subject(), "C2MS.*.MSG.>"));
//! ```

pub mod error;
pub mod field;
pub mod message;
pub mod subject;

pub use error::{TypesError, TypesResult};
pub use field::{Field, FieldKind, FieldValue};
pub use message::{Message, MessageKind};
