//! Message templates
//!
//! A template names the fields a message kind is expected to carry, their
//! types, which are mandatory, and which subject elements it is routed by.
//! Built-in templates cover heartbeat (`HB`), resource (`RSRC`), log
//! (`LOG`), directive request (`REQ.DIR`) and directive response
//! (`RESP.DIR`) messages.

use crate::{BusError, BusResult};
use std::collections::HashMap;
use std::sync::Arc;
use types::{subject, FieldKind, FieldValue, Message, MessageKind};

pub const SPECIFICATION: &str = "SPECIFICATION";
pub const DOMAIN1: &str = "DOMAIN1";
pub const DOMAIN2: &str = "DOMAIN2";
pub const MISSION_ID: &str = "MISSION-ID";
pub const CONSTELLATION_ID: &str = "CONSTELLATION-ID";
pub const SAT_ID_PHYSICAL: &str = "SAT-ID-PHYSICAL";
pub const SAT_ID_LOGICAL: &str = "SAT-ID-LOGICAL";
pub const FACILITY: &str = "FACILITY";
pub const COMPONENT: &str = "COMPONENT";
pub const MESSAGE_TYPE: &str = "MESSAGE-TYPE";
pub const MESSAGE_SUBTYPE: &str = "MESSAGE-SUBTYPE";
pub const PUBLISH_TIME: &str = "PUBLISH-TIME";
pub const DESTINATION_COMPONENT: &str = "DESTINATION-COMPONENT";

const DEFAULT_SPECIFICATION: &str = "C2MS";

/// Header elements every standard subject starts with
const SUBJECT_PREFIX: [&str; 9] = [
    SPECIFICATION,
    DOMAIN1,
    DOMAIN2,
    MISSION_ID,
    CONSTELLATION_ID,
    SAT_ID_PHYSICAL,
    SAT_ID_LOGICAL,
    MESSAGE_TYPE,
    MESSAGE_SUBTYPE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    Required,
    Optional,
}

/// Expected shape of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTemplate {
    pub name: String,
    pub kind: FieldKind,
    pub mode: FieldMode,
    pub header: bool,
    /// Value placed in newly created messages
    pub default: Option<FieldValue>,
}

impl FieldTemplate {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mode: FieldMode::Required,
            header: false,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            mode: FieldMode::Optional,
            ..Self::required(name, kind)
        }
    }

    pub fn in_header(mut self) -> Self {
        self.header = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.mode == FieldMode::Required
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    id: String,
    kind: MessageKind,
    fields: Vec<FieldTemplate>,
    subject_elements: Vec<String>,
}

impl MessageTemplate {
    /// Create a template. Its kind is deduced from the schema ID: a leading
    /// `REQ` element makes a request, `RESP` a reply, anything else a
    /// publication.
    pub fn new(id: &str, fields: Vec<FieldTemplate>) -> BusResult<Self> {
        let kind = Self::deduce_kind(id)?;
        Ok(Self {
            id: id.to_string(),
            kind,
            fields,
            subject_elements: SUBJECT_PREFIX.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn deduce_kind(schema_id: &str) -> BusResult<MessageKind> {
        let first = schema_id.split('.').next().unwrap_or_default().trim();
        if first.is_empty() {
            return Err(BusError::UnknownTemplate(schema_id.to_string()));
        }
        Ok(match first.to_ascii_uppercase().as_str() {
            "REQ" => MessageKind::Request,
            "RESP" => MessageKind::Reply,
            _ => MessageKind::Publish,
        })
    }

    /// Append a field whose value becomes the final subject element
    pub fn with_subject_suffix(mut self, field: &str) -> Self {
        self.subject_elements.push(field.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn fields(&self) -> &[FieldTemplate] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldTemplate> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Build the routing subject from the message's header values.
    /// Missing elements become `FILL`; a missing trailing suffix is left off.
    pub fn build_subject(&self, message: &Message) -> String {
        let prefix_len = SUBJECT_PREFIX.len();
        let mut elements: Vec<String> = self.subject_elements[..prefix_len]
            .iter()
            .map(|name| message.string_value(name).unwrap_or_default())
            .collect();
        for name in &self.subject_elements[prefix_len..] {
            if let Some(value) = message.string_value(name).filter(|v| !v.trim().is_empty()) {
                elements.push(value);
            }
        }
        subject::build_subject(elements)
    }
}

fn header_fields(message_type: &str, message_subtype: &str) -> Vec<FieldTemplate> {
    use FieldKind::String as Str;
    vec![
        FieldTemplate::optional(SPECIFICATION, Str)
            .in_header()
            .with_default(DEFAULT_SPECIFICATION),
        FieldTemplate::optional(DOMAIN1, Str).in_header(),
        FieldTemplate::optional(DOMAIN2, Str).in_header(),
        FieldTemplate::required(MISSION_ID, Str).in_header(),
        FieldTemplate::optional(CONSTELLATION_ID, Str).in_header(),
        FieldTemplate::optional(SAT_ID_PHYSICAL, Str).in_header(),
        FieldTemplate::optional(SAT_ID_LOGICAL, Str).in_header(),
        FieldTemplate::required(FACILITY, Str).in_header(),
        FieldTemplate::required(COMPONENT, Str).in_header(),
        FieldTemplate::required(MESSAGE_TYPE, Str)
            .in_header()
            .with_default(message_type),
        FieldTemplate::required(MESSAGE_SUBTYPE, Str)
            .in_header()
            .with_default(message_subtype),
        FieldTemplate::optional(PUBLISH_TIME, Str).in_header(),
    ]
}

fn builtin_templates() -> Vec<MessageTemplate> {
    use FieldKind::*;

    let with_header = |message_type: &str, subtype: &str, body: Vec<FieldTemplate>| {
        let mut fields = header_fields(message_type, subtype);
        fields.extend(body);
        fields
    };

    // Schema IDs are fixed literals, so construction cannot fail
    let template = |id: &str, fields: Vec<FieldTemplate>, suffix: &str| MessageTemplate {
        id: id.to_string(),
        kind: MessageTemplate::deduce_kind(id).unwrap_or_default(),
        fields,
        subject_elements: SUBJECT_PREFIX.iter().map(|s| s.to_string()).collect(),
    }
    .with_subject_suffix(suffix);

    vec![
        template(
            "HB",
            with_header(
                "MSG",
                "HB",
                vec![
                    FieldTemplate::required("PUB-RATE", U16),
                    FieldTemplate::optional("PUB-SEQ", U32),
                    FieldTemplate::optional("COMPONENT-STATUS", I16),
                    FieldTemplate::optional("COMPONENT-INFO", String),
                ],
            ),
            COMPONENT,
        ),
        template(
            "RSRC",
            with_header(
                "MSG",
                "RSRC",
                vec![
                    FieldTemplate::required("PUB-RATE", U16),
                    FieldTemplate::optional("PUB-SEQ", U32),
                    FieldTemplate::optional("OPER-SYS", String),
                    FieldTemplate::optional("NUM-CPUS", U16),
                    FieldTemplate::optional("CPU-UTIL", F32),
                    FieldTemplate::optional("MEM-PHYS-TOTAL", U64),
                    FieldTemplate::optional("MEM-PHYS-UTIL", F32),
                    FieldTemplate::optional("MEM-VIRT-TOTAL", U64),
                    FieldTemplate::optional("MEM-VIRT-UTIL", F32),
                ],
            ),
            COMPONENT,
        ),
        template(
            "LOG",
            with_header(
                "MSG",
                "LOG",
                vec![
                    FieldTemplate::required("SEVERITY", I16),
                    FieldTemplate::required("MSG-TEXT", String),
                    FieldTemplate::optional("SUBCLASS", String),
                    FieldTemplate::optional("OCCURRENCE-TYPE", String),
                ],
            ),
            COMPONENT,
        ),
        template(
            "REQ.DIR",
            with_header(
                "REQ",
                "DIR",
                vec![
                    FieldTemplate::required(DESTINATION_COMPONENT, String),
                    FieldTemplate::required("DIRECTIVE-STRING", String),
                    FieldTemplate::optional("RESPONSE", Boolean).with_default(true),
                    FieldTemplate::optional("REQUEST-ID", String).in_header(),
                ],
            ),
            DESTINATION_COMPONENT,
        ),
        template(
            "RESP.DIR",
            with_header(
                "RESP",
                "DIR",
                vec![
                    FieldTemplate::optional(DESTINATION_COMPONENT, String),
                    FieldTemplate::required("RESPONSE-STATUS", I16),
                    FieldTemplate::optional("DATA", String),
                    FieldTemplate::optional("REQUEST-ID", String).in_header(),
                ],
            ),
            DESTINATION_COMPONENT,
        ),
    ]
}

/// Registry of templates by schema ID
#[derive(Debug, Clone)]
pub struct TemplateDirectory {
    templates: HashMap<String, Arc<MessageTemplate>>,
    aliases: HashMap<String, String>,
}

impl Default for TemplateDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateDirectory {
    /// Directory with no templates
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Directory preloaded with the standard templates
    pub fn builtin() -> Self {
        let mut directory = Self::empty();
        for template in builtin_templates() {
            directory.register(template);
        }
        for (alias, target) in [("MSG.HB", "HB"), ("MSG.RSRC", "RSRC"), ("MSG.LOG", "LOG")] {
            directory.aliases.insert(alias.to_string(), target.to_string());
        }
        directory
    }

    /// Add or replace a template
    pub fn register(&mut self, template: MessageTemplate) {
        self.templates
            .insert(template.id.to_ascii_uppercase(), Arc::new(template));
    }

    pub fn find(&self, schema_id: &str) -> BusResult<Arc<MessageTemplate>> {
        let key = schema_id.trim().to_ascii_uppercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.templates
            .get(&key)
            .cloned()
            .ok_or_else(|| BusError::UnknownTemplate(schema_id.to_string()))
    }

    pub fn schema_ids(&self) -> impl Iterator<Item = &str> {
        self.templates.values().map(|t| t.id())
    }
}
