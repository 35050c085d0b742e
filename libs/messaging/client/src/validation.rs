//! Outgoing message checks
//!
//! Subjects are always checked before a message leaves a connection.
//! Content is checked against the message's template only when one of the
//! `msg-content-validate*` options is enabled.

use crate::factory::TemplateDirectory;
use crate::{BusError, BusResult};
use types::{subject, Message};

pub fn validate_subject(message: &Message) -> BusResult<()> {
    subject::validate_subject(message.subject()).map_err(|e| BusError::Validation(e.to_string()))
}

/// Check required fields are present and every templated field has the
/// expected type. Messages without a schema are accepted as-is.
pub fn validate_content(message: &Message, directory: &TemplateDirectory) -> BusResult<()> {
    let Some(schema_id) = message.schema_id() else {
        return Ok(());
    };
    let template = directory
        .find(schema_id)
        .map_err(|_| BusError::Validation(format!("no template for schema '{schema_id}'")))?;

    let mut problems = Vec::new();
    for expected in template.fields() {
        match message.field(&expected.name) {
            None if expected.is_required() => {
                problems.push(format!("missing required field {}", expected.name));
            }
            Some(field) if field.kind() != expected.kind => {
                problems.push(format!(
                    "field {} is {}, expected {}",
                    expected.name,
                    field.kind(),
                    expected.kind
                ));
            }
            _ => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(BusError::Validation(format!(
            "{schema_id}: {}",
            problems.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageFactory;
    use types::{Field, MessageKind};

    fn factory() -> MessageFactory {
        let mut factory = MessageFactory::new();
        factory.set_standard_fields([
            Field::header("MISSION-ID", "MSN").unwrap(),
            Field::header("FACILITY", "FAC").unwrap(),
            Field::header("COMPONENT", "ME").unwrap(),
        ]);
        factory
    }

    #[test]
    fn test_missing_required_field() {
        let factory = factory();
        let message = factory.create_message("HB").unwrap();

        let err = validate_content(&message, factory.directory()).unwrap_err();
        assert!(err.to_string().contains("PUB-RATE"));
    }

    #[test]
    fn test_wrong_field_type() {
        let factory = factory();
        let mut message = factory.create_message("HB").unwrap();
        message.add_field(Field::new("PUB-RATE", 30u32).unwrap());

        let err = validate_content(&message, factory.directory()).unwrap_err();
        assert!(err.to_string().contains("PUB-RATE is U32, expected U16"));

        message.add_field(Field::new("PUB-RATE", 30u16).unwrap());
        assert!(validate_content(&message, factory.directory()).is_ok());
    }

    #[test]
    fn test_schemaless_messages_pass() {
        let message = Message::new("A.B", MessageKind::Publish);
        assert!(validate_content(&message, &TemplateDirectory::empty()).is_ok());
    }

    #[test]
    fn test_subject_check() {
        let mut message = Message::new("", MessageKind::Publish);
        assert!(validate_subject(&message).is_err());
        message.set_subject("OK.SUBJECT").unwrap();
        assert!(validate_subject(&message).is_ok());
    }
}
