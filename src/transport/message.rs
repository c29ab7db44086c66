use bytes::Bytes;
use serde::Serialize;

/// A message travelling through the broker.
///
/// Messages are transient: they have no identity beyond their subject and
/// are dropped once the consumer has looked at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
    /// Where a responder should publish its answer, for request-reply.
    pub reply: Option<String>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Static facts about an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionMetadata {
    pub client_id: String,
    pub connected_address: String,
    pub max_payload_bytes: usize,
}
