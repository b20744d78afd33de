//! Wire payload types shared by the HTTP client and the channel codec.

use serde::{Deserialize, Serialize};

use crate::core::message::Message;

/// Response envelope wrapping every HTTP payload: `{ data, message? }`.
/// `message` carries a human-readable error on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error-only envelope used when the status code already tells us the
/// request failed and `data` may be absent or null.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
    /// Server-reported expiry as a unix epoch, without any safety margin.
    pub expired_at: i64,
}

/// Shared shape of login, register, Google login, and refresh responses.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub token: TokenData,
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct GoogleLoginRequest<'a> {
    pub id_token: &'a str,
}

#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// One conversation as listed by `GET /chats`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatData {
    pub id: u64,
    pub user_id: u64,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
pub struct GetChatsResponse {
    pub chats: Vec<ChatData>,
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesResponse {
    pub messages: Vec<Message>,
}

/// Lifecycle of a streamed reply as reported in channel frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageStatus {
    Started,
    OnProgress,
    Finished,
}

impl TryFrom<u8> for MessageStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageStatus::Started),
            2 => Ok(MessageStatus::OnProgress),
            3 => Ok(MessageStatus::Finished),
            _ => Err(format!("invalid message status: {value}")),
        }
    }
}

impl From<MessageStatus> for u8 {
    fn from(value: MessageStatus) -> Self {
        match value {
            MessageStatus::Started => 1,
            MessageStatus::OnProgress => 2,
            MessageStatus::Finished => 3,
        }
    }
}

/// Payload of `message_start`, `message`, and `message_end` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePart {
    pub chat_id: u64,
    pub part: String,
    pub status: MessageStatus,
}

/// Outbound payload scoping subsequent events to one conversation.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinChatRoomRequest {
    pub chat_id: u64,
}

/// Outbound payload sending one user message. An absent `chat_id` asks the
/// server to create a new conversation.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<u64>,
    pub message: String,
}

pub mod client;
