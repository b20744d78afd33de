//! Conversations and the append-only message store for the active view.

use crate::api::ChatData;
use crate::core::message::Message;

/// One conversation thread. Identity is the id; `topic` is display-only
/// and never mutated by the client.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: u64,
    pub owner_id: u64,
    pub topic: String,
}

impl From<ChatData> for Conversation {
    fn from(data: ChatData) -> Self {
        Self {
            id: data.id,
            owner_id: data.user_id,
            topic: data.topic,
        }
    }
}

/// Ordered, append-only sequence of finished messages for the active
/// conversation. Seeded once from history; messages are never edited or
/// removed. Callers guarantee causal ordering before appending.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;

    #[test]
    fn store_preserves_history_order_and_appends_at_the_end() {
        let history = vec![
            Message::new(1, 42, 9, Role::User, "first"),
            Message::new(2, 42, 9, Role::Model, "second"),
        ];
        let mut store = ConversationStore::from_history(history);
        assert_eq!(store.len(), 2);

        store.append(Message::local_user(42, 9, "third"));
        let contents: Vec<&str> = store
            .messages()
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn conversations_map_from_wire_chat_data() {
        let conversation: Conversation = ChatData {
            id: 7,
            user_id: 9,
            topic: "Greetings".to_string(),
        }
        .into();
        assert_eq!(conversation.id, 7);
        assert_eq!(conversation.owner_id, 9);
        assert_eq!(conversation.topic, "Greetings");
    }
}
