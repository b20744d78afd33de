use serde::{Deserialize, Serialize};

/// Message id used for locally-synthesized messages that the server has not
/// confirmed yet: the optimistic echo of the user's own send and the
/// provisional in-progress model reply.
pub const LOCAL_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_model(self) -> bool {
        self == Role::Model
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One finished conversation message, as stored and rendered.
///
/// The wire protocol names the conversation field `chat_id` and the author
/// field `user_id`; those names are preserved on the wire only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(rename = "chat_id")]
    pub conversation_id: u64,
    #[serde(rename = "user_id")]
    pub author_id: u64,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(
        id: u64,
        conversation_id: u64,
        author_id: u64,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            author_id,
            role,
            content: content.into(),
        }
    }

    /// Optimistic local echo of the user's own send.
    pub fn local_user(conversation_id: u64, author_id: u64, content: impl Into<String>) -> Self {
        Self::new(LOCAL_ID, conversation_id, author_id, Role::User, content)
    }

    /// Locally-finalized model reply, not yet server-confirmed.
    pub fn local_model(conversation_id: u64, author_id: u64, content: impl Into<String>) -> Self {
        Self::new(LOCAL_ID, conversation_id, author_id, Role::Model, content)
    }

    pub fn is_local(&self) -> bool {
        self.id == LOCAL_ID
    }
}
