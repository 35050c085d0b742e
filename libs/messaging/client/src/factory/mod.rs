//! # Message Factory
//!
//! Creates messages from named templates and stamps them with the
//! connection's standard fields (mission, facility, component and the
//! like), so every message a component emits carries the same identity.
//!
//! Template defaults are applied first and standard fields second, so a
//! standard field overrides a template default of the same name.

pub mod template;

pub use template::{FieldMode, FieldTemplate, MessageTemplate, TemplateDirectory};

use crate::BusResult;
use tracing::debug;
use types::{Field, Message, MessageKind};

#[derive(Debug, Clone, Default)]
pub struct MessageFactory {
    directory: TemplateDirectory,
    standard_fields: Vec<Field>,
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(directory: TemplateDirectory) -> Self {
        Self {
            directory,
            standard_fields: Vec::new(),
        }
    }

    /// Replace the standard field set. Later entries win over earlier
    /// entries with the same name.
    pub fn set_standard_fields<I: IntoIterator<Item = Field>>(&mut self, fields: I) {
        let mut merged: Vec<Field> = Vec::new();
        for field in fields {
            match merged.iter_mut().find(|f| f.name() == field.name()) {
                Some(existing) => *existing = field,
                None => merged.push(field),
            }
        }
        debug!(count = merged.len(), "Standard fields replaced");
        self.standard_fields = merged;
    }

    pub fn clear_standard_fields(&mut self) {
        self.standard_fields.clear();
    }

    pub fn standard_fields(&self) -> &[Field] {
        &self.standard_fields
    }

    pub fn register_template(&mut self, template: MessageTemplate) {
        self.directory.register(template);
    }

    pub fn directory(&self) -> &TemplateDirectory {
        &self.directory
    }

    /// Create a message from a template, then add the standard fields
    pub fn create_message(&self, schema_id: &str) -> BusResult<Message> {
        let template = self.directory.find(schema_id)?;

        let mut message = Message::with_schema(template.id(), template.kind());
        for field in template.fields() {
            if let Some(default) = &field.default {
                message.add_field(Field::new(&field.name, default.clone())?.with_header(field.header));
            }
        }
        self.apply_standard_fields(&mut message);
        Ok(message)
    }

    /// Create a template-less message carrying only the standard fields
    pub fn create_empty_message(&self, kind: MessageKind) -> Message {
        let mut message = Message::new(String::new(), kind);
        self.apply_standard_fields(&mut message);
        message
    }

    /// Overlay the standard fields onto an existing message
    pub fn apply_standard_fields(&self, message: &mut Message) {
        message.add_fields(self.standard_fields.iter().cloned());
    }
}
