//! Normalized inbound updates.
//!
//! Both ingestion paths funnel raw Bot API JSON through [`normalize`]: the
//! poller for every element of a `getUpdates` batch, the webhook receiver for
//! every request body (via [`parse_body`]). Downstream handlers therefore see
//! the same [`Update`] shape regardless of transport.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Content type accepted on the webhook endpoint.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Field carrying the platform sequence number.
const UPDATE_ID_FIELD: &str = "update_id";

/// Raw payload rejected before interpretation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedPayload {
    /// Request content type is not JSON.
    #[error("Content-Type must be application/json")]
    ContentType,
    /// Body is not parseable JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// JSON is valid but not an object.
    #[error("update payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// `update_id` is present but not an integer.
    #[error("update_id must be an integer")]
    InvalidUpdateId,
    /// The object carries no event field.
    #[error("update payload carries no event")]
    NoEvent,
}

/// Kind of event an update carries, named after its Bot API field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// New incoming message.
    Message,
    /// Edited version of a known message.
    EditedMessage,
    /// New channel post.
    ChannelPost,
    /// Edited channel post.
    EditedChannelPost,
    /// Inline keyboard button press.
    CallbackQuery,
    /// Inline query.
    InlineQuery,
    /// Inline result chosen by a user.
    ChosenInlineResult,
    /// Shipping query for invoices.
    ShippingQuery,
    /// Pre-checkout query.
    PreCheckoutQuery,
    /// Poll state change.
    Poll,
    /// Answer in a non-anonymous poll.
    PollAnswer,
    /// The bot's own membership changed.
    MyChatMember,
    /// A member's status changed.
    ChatMember,
    /// Request to join a chat.
    ChatJoinRequest,
    /// Field not known to this crate; carries the field name.
    Other(String),
}

impl UpdateKind {
    fn from_field(field: &str) -> Self {
        match field {
            "message" => Self::Message,
            "edited_message" => Self::EditedMessage,
            "channel_post" => Self::ChannelPost,
            "edited_channel_post" => Self::EditedChannelPost,
            "callback_query" => Self::CallbackQuery,
            "inline_query" => Self::InlineQuery,
            "chosen_inline_result" => Self::ChosenInlineResult,
            "shipping_query" => Self::ShippingQuery,
            "pre_checkout_query" => Self::PreCheckoutQuery,
            "poll" => Self::Poll,
            "poll_answer" => Self::PollAnswer,
            "my_chat_member" => Self::MyChatMember,
            "chat_member" => Self::ChatMember,
            "chat_join_request" => Self::ChatJoinRequest,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Bot API field name for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::CallbackQuery => "callback_query",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound event. Immutable once built.
///
/// Handlers take it by value, so a single `Update` can be dispatched at most
/// once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    event_id: Uuid,
    update_id: Option<i64>,
    kind: UpdateKind,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl Update {
    /// Local identifier for log correlation.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Platform sequence number, when the payload carried one.
    pub fn update_id(&self) -> Option<i64> {
        self.update_id
    }

    /// Event kind.
    pub fn kind(&self) -> &UpdateKind {
        &self.kind
    }

    /// The raw payload exactly as received.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The event object itself, e.g. the `message` of a message update.
    pub fn event(&self) -> Option<&Value> {
        self.payload.get(self.kind.as_str())
    }

    /// Receipt timestamp.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Chat the event belongs to, when it has one.
    pub fn chat_id(&self) -> Option<i64> {
        let event = self.event()?;
        event
            .get("chat")
            .or_else(|| event.get("message").and_then(|m| m.get("chat")))
            .and_then(|chat| chat.get("id"))
            .and_then(Value::as_i64)
    }

    /// Whether `other` describes the same platform event, ignoring local
    /// identifiers and receipt time.
    pub fn same_shape(&self, other: &Update) -> bool {
        self.update_id == other.update_id && self.kind == other.kind && self.payload == other.payload
    }
}

/// Build an [`Update`] from a raw Bot API update object.
///
/// Shape checks run before any field is interpreted, so absent or odd fields
/// produce a [`MalformedPayload`] instead of a panic.
///
/// # Errors
///
/// Returns [`MalformedPayload`] when the value is not an object, carries a
/// non-integer `update_id`, or holds no event field.
pub fn normalize(raw: Value) -> Result<Update, MalformedPayload> {
    let object = match &raw {
        Value::Object(map) => map,
        other => return Err(MalformedPayload::NotAnObject(json_type_name(other))),
    };

    let update_id = match object.get(UPDATE_ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_i64().ok_or(MalformedPayload::InvalidUpdateId)?),
    };

    let kind = object
        .iter()
        .find(|(key, value)| key.as_str() != UPDATE_ID_FIELD && !value.is_null())
        .map(|(key, _)| UpdateKind::from_field(key))
        .ok_or(MalformedPayload::NoEvent)?;

    Ok(Update {
        event_id: Uuid::new_v4(),
        update_id,
        kind,
        payload: raw,
        received_at: Utc::now(),
    })
}

/// Validate a webhook request body and normalize it.
///
/// `content_type` is the raw header value; media-type parameters such as
/// `charset` are ignored and the comparison is case-insensitive.
///
/// # Errors
///
/// Returns [`MalformedPayload::ContentType`] for a missing or non-JSON
/// content type, [`MalformedPayload::InvalidJson`] for an unparseable body,
/// and any error from [`normalize`].
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Update, MalformedPayload> {
    if !is_json_content_type(content_type) {
        return Err(MalformedPayload::ContentType);
    }
    let raw: Value =
        serde_json::from_slice(body).map_err(|e| MalformedPayload::InvalidJson(e.to_string()))?;
    normalize(raw)
}

/// Whether a `Content-Type` header value denotes JSON.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|media| media.eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
