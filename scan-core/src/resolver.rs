//! Ticket identity resolution.
//!
//! Turns whatever the decoder produced into the id the authority expects.
//! Ticket codes come in three shapes:
//! - a bare id with the ticket prefix (`DIDI-12345`)
//! - a JSON object serialized as text (`{"id":"DIDI-12345","event":...}`)
//! - an already structured value
//!
//! Resolution never fails. Anything unrecognized is returned as-is and the
//! authority gets to reject it.

use didi_scan_types::TicketId;
use serde_json::Value;

/// Prefix of bare ticket ids printed on tickets.
pub const DEFAULT_TICKET_PREFIX: &str = "DIDI-";

/// Fields that may carry the ticket id in a structured payload, in priority order.
pub const ID_FIELDS: &[&str] = &["id", "ticketId"];

/// A decoded ticket payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    /// Decoded text.
    Text(&'a str),
    /// Already structured data.
    Structured(&'a Value),
}

/// Resolves payloads into canonical ticket ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    prefix: String,
}

impl Resolver {
    /// Create a resolver recognizing bare ids with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The recognized bare-id prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve any payload.
    pub fn resolve(&self, payload: Payload<'_>) -> TicketId {
        match payload {
            Payload::Text(text) => self.resolve_text(text),
            Payload::Structured(Value::String(text)) => self.resolve_text(text),
            Payload::Structured(value) => {
                extract_id(value).unwrap_or_else(|| TicketId::new(value.to_string()))
            }
        }
    }

    /// Resolve decoded text.
    pub fn resolve_text(&self, text: &str) -> TicketId {
        if !self.prefix.is_empty() && text.starts_with(&self.prefix) {
            return TicketId::new(text);
        }

        if text.contains('{') {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                if let Some(id) = extract_id(&value) {
                    return id;
                }
            }
        }

        TicketId::new(text)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_PREFIX)
    }
}

/// Resolve a payload with the default prefix.
pub fn resolve(payload: Payload<'_>) -> TicketId {
    Resolver::default().resolve(payload)
}

/// First non-empty id field of an object. Numbers are rendered as text.
fn extract_id(value: &Value) -> Option<TicketId> {
    let object = value.as_object()?;
    ID_FIELDS.iter().find_map(|field| match object.get(*field)? {
        Value::String(s) if !s.is_empty() => Some(TicketId::new(s.as_str())),
        Value::Number(n) => Some(TicketId::new(n.to_string())),
        _ => None,
    })
}
