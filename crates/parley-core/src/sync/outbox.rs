//! Optimistic send pipeline: local message synthesis and the durable write
//! batch behind it.
//!
//! The locally generated client id doubles as the server document id, so a
//! retry re-issuing the same batch can never create a duplicate, and the
//! subscription echo confirms the pending entry by plain id match.

use serde_json::json;
use uuid::Uuid;

use crate::docstore::{messages_collection, WriteBatch, CONVERSATIONS_COLLECTION};
use crate::models::{now_ms, Delivery, Message, Sender};

/// Synthesize a locally-visible pending message for an optimistic send.
pub fn make_pending_message(text: &str, sender: Sender) -> Message {
    Message {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        sender,
        created_at_ms: now_ms(),
        delivery: Delivery::Pending,
    }
}

/// Build the atomic batch for one send: the message document (keyed by the
/// client id) plus the conversation summary metadata, committed together.
pub fn build_send_batch(conversation_id: &str, message: &Message) -> WriteBatch {
    WriteBatch::new()
        .set(
            messages_collection(conversation_id),
            message.id.clone(),
            message.to_document_data(),
        )
        .update(
            CONVERSATIONS_COLLECTION,
            conversation_id,
            json!({
                "lastMessageText": message.text,
                "lastMessageSender": message.sender.wire_name(),
                "lastMessageAt": message.created_at_ms,
            }),
        )
}
