//! # Request/Reply Correlation
//!
//! Requests carry a `REQUEST-ID` and a `REPLY-SUBJECT`. Responders echo the
//! ID back on a reply published to that subject; the requesting connection
//! accepts only a reply whose ID matches the request it is waiting on.
//!
//! Replies that arrive after their request timed out find no waiter and
//! are dropped.

use crate::factory::template::{COMPONENT, MESSAGE_TYPE};
use crate::{BusError, BusResult};
use std::sync::atomic::{AtomicU64, Ordering};
use types::{Field, Message, MessageKind};

pub const REQUEST_ID: &str = "REQUEST-ID";
pub const REPLY_SUBJECT: &str = "REPLY-SUBJECT";
pub const RESPONSE_STATUS: &str = "RESPONSE-STATUS";

/// Standard RESPONSE-STATUS codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ResponseStatus {
    Acknowledgement = 1,
    WorkingKeepAlive = 2,
    SuccessfulCompletion = 3,
    FailedCompletion = 4,
    InvalidRequest = 5,
    FinalMessage = 6,
}

impl ResponseStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Acknowledgement),
            2 => Some(Self::WorkingKeepAlive),
            3 => Some(Self::SuccessfulCompletion),
            4 => Some(Self::FailedCompletion),
            5 => Some(Self::InvalidRequest),
            6 => Some(Self::FinalMessage),
            _ => None,
        }
    }
}

/// Per-connection request bookkeeping
#[derive(Debug)]
pub struct RequestReplyCoordinator {
    connection_id: String,
    reply_subject: String,
    counter: AtomicU64,
}

impl RequestReplyCoordinator {
    pub fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            reply_subject: format!("REPLY.{}", connection_id.to_ascii_uppercase()),
            counter: AtomicU64::new(0),
        }
    }

    /// Subject this connection's replies are addressed to
    pub fn reply_subject(&self) -> &str {
        &self.reply_subject
    }

    /// IDs are `<connection>_<pid>_<sequence>`, unique per process
    pub fn next_request_id(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", self.connection_id, std::process::id(), sequence)
    }

    /// Give the request an ID (keeping one the caller set) and point replies
    /// at this connection. Returns the ID to wait for.
    pub fn prepare_request(&self, request: &mut Message) -> BusResult<String> {
        if request.kind() != MessageKind::Request {
            return Err(BusError::Validation(format!(
                "request() needs a REQUEST message, got {}",
                request.kind()
            )));
        }

        let request_id = match request.string_value(REQUEST_ID) {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let id = self.next_request_id();
                request.add_field(Field::header(REQUEST_ID, id.clone())?);
                id
            }
        };
        request.add_field(Field::header(REPLY_SUBJECT, self.reply_subject.clone())?);
        Ok(request_id)
    }

    /// Is `message` the reply to `request_id` on this connection's reply subject?
    pub fn is_matching_reply(&self, message: &Message, request_id: &str) -> bool {
        message.kind() == MessageKind::Reply
            && message.subject() == self.reply_subject
            && message.string_value(REQUEST_ID).as_deref() == Some(request_id)
    }

    /// Is `message` addressed to this connection's reply subject at all?
    pub fn is_reply_traffic(&self, message: &Message) -> bool {
        message.kind() == MessageKind::Reply && message.subject() == self.reply_subject
    }

    /// Prepare `reply` for sending back to the originator of `request`.
    ///
    /// The request's header fields (except MESSAGE-TYPE) are copied over,
    /// COMPONENT is set to the responder's identity, REQUEST-ID is echoed,
    /// RESPONSE-STATUS defaults to successful completion and the subject is
    /// taken from the request's REPLY-SUBJECT.
    pub fn build_reply(request: &Message, reply: &Message, component: &str) -> BusResult<Message> {
        if request.kind() != MessageKind::Request {
            return Err(BusError::Validation(format!(
                "reply() needs the originating REQUEST message, got {}",
                request.kind()
            )));
        }

        let mut outgoing = reply.clone();
        outgoing.set_kind(MessageKind::Reply);

        for field in request.header_fields() {
            if field.name() != MESSAGE_TYPE {
                outgoing.add_field(field.clone());
            }
        }
        outgoing.add_field(Field::header(COMPONENT, component)?);

        if let Some(request_id) = request.field(REQUEST_ID) {
            outgoing.add_field(request_id.clone());
        }
        if !outgoing.has_field(RESPONSE_STATUS) {
            outgoing.add_field(Field::new(
                RESPONSE_STATUS,
                ResponseStatus::SuccessfulCompletion.code(),
            )?);
        }
        if let Some(subject) = request.string_value(REPLY_SUBJECT) {
            outgoing
                .set_subject(subject)
                .map_err(|e| BusError::Validation(e.to_string()))?;
        }
        Ok(outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Message {
        let mut request = Message::with_schema("REQ.DIR", MessageKind::Request);
        request.add_field(Field::header("MESSAGE-TYPE", "REQ").unwrap());
        request.add_field(Field::header("MISSION-ID", "MSN").unwrap());
        request.add_field(Field::header("COMPONENT", "ASKER").unwrap());
        request.add_field(Field::new("DIRECTIVE-STRING", "PING").unwrap());
        request
    }

    #[test]
    fn test_generated_request_ids_are_unique() {
        let coordinator = RequestReplyCoordinator::new("abc");
        let first = coordinator.next_request_id();
        let second = coordinator.next_request_id();
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("abc_{}_", std::process::id())));
    }

    #[test]
    fn test_prepare_keeps_caller_request_id() {
        let coordinator = RequestReplyCoordinator::new("abc");
        let mut message = request();
        message.add_field(Field::header(REQUEST_ID, "42").unwrap());

        assert_eq!(coordinator.prepare_request(&mut message).unwrap(), "42");
        assert_eq!(message.string_value(REPLY_SUBJECT).as_deref(), Some("REPLY.ABC"));
    }

    #[test]
    fn test_prepare_rejects_publish_messages() {
        let coordinator = RequestReplyCoordinator::new("abc");
        let mut message = Message::new("A", MessageKind::Publish);
        assert!(matches!(
            coordinator.prepare_request(&mut message),
            Err(BusError::Validation(_))
        ));
    }

    #[test]
    fn test_build_reply_copies_headers_and_defaults_status() {
        let coordinator = RequestReplyCoordinator::new("abc");
        let mut request = request();
        let id = coordinator.prepare_request(&mut request).unwrap();

        let mut reply = Message::with_schema("RESP.DIR", MessageKind::Reply);
        reply.add_field(Field::header("MESSAGE-TYPE", "RESP").unwrap());
        reply.add_field(Field::new("DATA", "PONG").unwrap());

        let built = RequestReplyCoordinator::build_reply(&request, &reply, "RESPONDER").unwrap();
        assert_eq!(built.kind(), MessageKind::Reply);
        assert_eq!(built.subject(), "REPLY.ABC");
        assert_eq!(built.string_value("MESSAGE-TYPE").as_deref(), Some("RESP"));
        assert_eq!(built.string_value("MISSION-ID").as_deref(), Some("MSN"));
        assert_eq!(built.string_value("COMPONENT").as_deref(), Some("RESPONDER"));
        assert_eq!(built.string_value(REQUEST_ID), Some(id.clone()));
        assert_eq!(
            built.integer_value(RESPONSE_STATUS),
            Some(i64::from(ResponseStatus::SuccessfulCompletion.code()))
        );
        assert!(coordinator.is_matching_reply(&built, &id));
        assert!(!coordinator.is_matching_reply(&built, "other"));
    }

    #[test]
    fn test_explicit_status_is_kept() {
        let mut reply = Message::new("", MessageKind::Reply);
        reply.add_field(Field::new(RESPONSE_STATUS, ResponseStatus::FailedCompletion.code()).unwrap());

        let built = RequestReplyCoordinator::build_reply(&request(), &reply, "R").unwrap();
        assert_eq!(built.integer_value(RESPONSE_STATUS), Some(4));
        assert_eq!(ResponseStatus::from_code(4), Some(ResponseStatus::FailedCompletion));
        assert_eq!(ResponseStatus::from_code(9), None);
    }
}
