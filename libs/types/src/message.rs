//! Bus messages
//!
//! A [`Message`] is a subject, a kind and an ordered set of uniquely named
//! fields. Adding a field whose name already exists replaces it in place,
//! so field order reflects first insertion.

use crate::{subject, Field, FieldValue, TypesError, TypesResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a message participates in an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    #[default]
    Publish,
    Request,
    Reply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Publish => "PUBLISH",
            MessageKind::Request => "REQUEST",
            MessageKind::Reply => "REPLY",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    kind: MessageKind,
    /// Template the message was created from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_id: Option<String>,
    #[serde(default)]
    fields: Vec<Field>,
}

impl Message {
    /// Create an empty message. The subject is not validated here; it is
    /// checked when the message is sent.
    pub fn new(subject: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            subject: subject.into(),
            kind,
            schema_id: None,
            fields: Vec::new(),
        }
    }

    /// Create an empty message bound to a template
    pub fn with_schema(schema_id: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            schema_id: Some(schema_id.into()),
            ..Self::new(String::new(), kind)
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> TypesResult<()> {
        let subject = subject.into();
        subject::validate_subject(&subject)?;
        self.subject = subject;
        Ok(())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: MessageKind) {
        self.kind = kind;
    }

    pub fn schema_id(&self) -> Option<&str> {
        self.schema_id.as_deref()
    }

    /// Add or replace a field. Returns true when an existing field was replaced.
    pub fn add_field(&mut self, field: Field) -> bool {
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(existing) => {
                *existing = field;
                true
            }
            None => {
                self.fields.push(field);
                false
            }
        }
    }

    pub fn add_fields<I: IntoIterator<Item = Field>>(&mut self, fields: I) {
        for field in fields {
            self.add_field(field);
        }
    }

    /// Set a field's value, keeping its header flag if it already exists.
    /// New fields are added as body fields.
    pub fn set_field_value(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> TypesResult<bool> {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name() == name) {
            existing.set_value(value);
            return Ok(true);
        }
        self.fields.push(Field::new(name, value)?);
        Ok(false)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Remove a field. Returns true if it was present.
    pub fn clear_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.name() != name);
        self.fields.len() != before
    }

    pub fn clear_fields(&mut self) {
        self.fields.clear();
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn header_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_header())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn string_value(&self, name: &str) -> Option<String> {
        self.field(name).map(Field::string_value)
    }

    pub fn integer_value(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(|f| f.value().as_i64())
    }

    pub fn double_value(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(|f| f.value().as_f64())
    }

    pub fn to_json(&self) -> TypesResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a message, holding it to the same rules as one built in code:
    /// a non-empty subject must be valid and field names must be unique.
    pub fn from_json(json: &str) -> TypesResult<Self> {
        let message: Message = serde_json::from_str(json)?;
        if !message.subject.is_empty() {
            subject::validate_subject(&message.subject)?;
        }
        for (index, field) in message.fields.iter().enumerate() {
            if message.fields[..index].iter().any(|f| f.name() == field.name()) {
                return Err(TypesError::DuplicateField(field.name().to_string()));
            }
        }
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.subject)?;
        if let Some(schema) = &self.schema_id {
            write!(f, " [{schema}]")?;
        }
        for field in &self.fields {
            write!(f, "\n  {}{}", if field.is_header() { "*" } else { " " }, field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldKind;

    #[test]
    fn test_replace_keeps_position() {
        let mut message = Message::new("A.B", MessageKind::Publish);
        assert!(!message.add_field(Field::new("ONE", 1u16).unwrap()));
        assert!(!message.add_field(Field::new("TWO", 2u16).unwrap()));
        assert!(message.add_field(Field::new("ONE", "uno").unwrap()));

        let names: Vec<_> = message.fields().iter().map(Field::name).collect();
        assert_eq!(names, vec!["ONE", "TWO"]);
        assert_eq!(message.field("ONE").unwrap().kind(), FieldKind::String);
        assert_eq!(message.field_count(), 2);
    }

    #[test]
    fn test_set_field_value_keeps_header_flag() {
        let mut message = Message::default();
        message.add_field(Field::header("COMPONENT", "A").unwrap());

        assert!(message.set_field_value("COMPONENT", "B").unwrap());
        assert!(message.field("COMPONENT").unwrap().is_header());
        assert!(!message.set_field_value("BODY", 1u32).unwrap());
        assert!(!message.field("BODY").unwrap().is_header());
        assert!(message.set_field_value("", 1u32).is_err());
    }

    #[test]
    fn test_clear_and_typed_getters() {
        let mut message = Message::default();
        message.add_field(Field::new("RATE", 30u16).unwrap());
        message.add_field(Field::new("UTIL", 12.5f64).unwrap());

        assert_eq!(message.integer_value("RATE"), Some(30));
        assert_eq!(message.double_value("UTIL"), Some(12.5));
        assert_eq!(message.string_value("RATE").as_deref(), Some("30"));
        assert!(message.clear_field("RATE"));
        assert!(!message.clear_field("RATE"));
        assert_eq!(message.integer_value("RATE"), None);
    }

    #[test]
    fn test_set_subject_validates() {
        let mut message = Message::default();
        assert!(message.set_subject("GOOD.SUBJECT").is_ok());
        assert!(message.set_subject("BAD.>").is_err());
        assert_eq!(message.subject(), "GOOD.SUBJECT");
    }

    #[test]
    fn test_header_fields_filter() {
        let mut message = Message::with_schema("HB", MessageKind::Publish);
        message.add_field(Field::header("MISSION-ID", "M").unwrap());
        message.add_field(Field::new("PUB-RATE", 5u16).unwrap());

        let headers: Vec<_> = message.header_fields().map(Field::name).collect();
        assert_eq!(headers, vec!["MISSION-ID"]);
        assert_eq!(message.schema_id(), Some("HB"));
    }

    #[test]
    fn test_json_preserves_message() {
        let mut message = Message::new("A.B", MessageKind::Request);
        message.add_field(Field::header("REQUEST-ID", "42").unwrap());
        message.add_field(Field::new("BLOB", vec![1u8, 2, 3]).unwrap());

        let parsed = Message::from_json(&message.to_json().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_from_json_enforces_message_rules() {
        let duplicate = r#"{"subject":"A.B","fields":[
            {"name":"X","value":{"type":"U16","value":1}},
            {"name":"X","value":{"type":"U16","value":2}}]}"#;
        assert_eq!(
            Message::from_json(duplicate),
            Err(TypesError::DuplicateField("X".to_string()))
        );

        let unnamed = r#"{"subject":"A.B","fields":[
            {"name":"  ","value":{"type":"U16","value":1}}]}"#;
        assert!(matches!(Message::from_json(unnamed), Err(TypesError::Json(_))));

        let bad_subject = r#"{"subject":"a b","fields":[]}"#;
        assert!(matches!(
            Message::from_json(bad_subject),
            Err(TypesError::InvalidSubject { .. })
        ));

        let unset_subject = r#"{"fields":[]}"#;
        assert!(Message::from_json(unset_subject).is_ok());
    }
}
