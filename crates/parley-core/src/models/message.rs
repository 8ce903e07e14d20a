use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::docstore::RawDocument;

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Sender {
    User,
    Admin { admin_id: String },
    System,
    Ai,
}

impl Sender {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin { .. } => "admin",
            Self::System => "system",
            Self::Ai => "ai",
        }
    }

    fn from_wire(name: &str, admin_id: Option<&str>) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin {
                admin_id: admin_id.unwrap_or_default().to_string(),
            }),
            "system" => Some(Self::System),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

/// Delivery state of a message. Exactly one state holds at any time;
/// `Pending` transitions only to `Confirmed` (server echo overwrites by id)
/// or `Failed` (write error, retryable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Delivery {
    Confirmed,
    Pending,
    Failed,
}

/// The atomic unit of a conversation transcript.
///
/// For optimistic sends, `id` is the locally generated client id which is
/// reused as the server document id, so retries can never duplicate and
/// the server echo overwrites the local entry by plain id match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Milliseconds since epoch. Server-authoritative once confirmed,
    /// local wall clock for optimistic entries.
    pub created_at_ms: i64,
    pub delivery: Delivery,
}

impl Message {
    pub fn pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }

    pub fn failed(&self) -> bool {
        self.delivery == Delivery::Failed
    }

    /// Real messages anchor time separators; system notices and empty
    /// entries are skipped when looking for the nearest earlier message.
    pub fn is_real(&self) -> bool {
        self.sender != Sender::System && !self.text.trim().is_empty()
    }

    /// Validate a raw document into a confirmed message.
    ///
    /// Documents missing `id`, a numeric `createdAt`, or a known `sender`
    /// are rejected with a warning instead of propagating half-formed
    /// entries downstream.
    pub fn from_document(doc: &RawDocument) -> Option<Self> {
        if doc.id.is_empty() {
            tracing::warn!("discarding message document with empty id");
            return None;
        }

        let created_at_ms = match doc.created_at_ms() {
            Some(ms) => ms,
            None => {
                tracing::warn!("discarding message {}: missing or non-numeric createdAt", doc.id);
                return None;
            }
        };

        let sender_name = doc.data.get("sender").and_then(Value::as_str);
        let admin_id = doc.data.get("adminId").and_then(Value::as_str);
        let sender = match sender_name.and_then(|name| Sender::from_wire(name, admin_id)) {
            Some(sender) => sender,
            None => {
                tracing::warn!(
                    "discarding message {}: unknown sender {:?}",
                    doc.id,
                    sender_name
                );
                return None;
            }
        };

        let text = doc
            .data
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            id: doc.id.clone(),
            text,
            sender,
            created_at_ms,
            delivery: Delivery::Confirmed,
        })
    }

    /// Wire representation for the durable write of an optimistic send.
    pub fn to_document_data(&self) -> Value {
        let mut data = json!({
            "text": self.text,
            "sender": self.sender.wire_name(),
            "createdAt": self.created_at_ms,
            "clientId": self.id,
        });
        if let Sender::Admin { admin_id } = &self.sender {
            data["adminId"] = Value::String(admin_id.clone());
        }
        data
    }
}
