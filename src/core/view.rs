//! Per-view wiring: one mounted conversation and its live state.

use crate::core::connection::{ChannelEvent, OutboundEvent};
use crate::core::conversation::ConversationStore;
use crate::core::message::Message;
use crate::core::router::{RoomRouter, RouterAction};
use crate::core::stream::{StreamAssembler, StreamPhase};

/// State of the currently rendered conversation: the append-only message
/// sequence plus the transient in-flight reply, routed by conversation id.
///
/// `conversation_id == None` is a brand-new conversation; the server
/// assigns an id with the first reply's finishing event, which surfaces
/// here as a [`RouterAction::Navigate`].
pub struct ConversationView {
    author_id: u64,
    store: ConversationStore,
    assembler: StreamAssembler,
    router: RoomRouter,
}

impl ConversationView {
    /// Mount a view over history loaded by the caller. Returns the join
    /// command to send when the conversation already has an id.
    pub fn mount(
        conversation_id: Option<u64>,
        author_id: u64,
        history: Vec<Message>,
    ) -> (Self, Option<OutboundEvent>) {
        let mut router = RoomRouter::new(conversation_id);
        let join = conversation_id.and_then(|id| router.join(id));
        (
            Self {
                author_id,
                store: ConversationStore::from_history(history),
                assembler: StreamAssembler::new(),
                router,
            },
            join,
        )
    }

    pub fn conversation_id(&self) -> Option<u64> {
        self.router.active()
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn stream_phase(&self) -> &StreamPhase {
        self.assembler.phase()
    }

    /// The synthesized trailing message rendered while a reply streams.
    pub fn provisional(&self) -> Option<Message> {
        self.assembler
            .provisional(self.conversation_id().unwrap_or(0), self.author_id)
    }

    /// Send a user message: append the optimistic local echo and return the
    /// outbound command. An unknown conversation id asks the server to
    /// create the conversation.
    pub fn send(&mut self, content: &str) -> OutboundEvent {
        let conversation_id = self.conversation_id();
        self.store.append(Message::local_user(
            conversation_id.unwrap_or(0),
            self.author_id,
            content,
        ));
        OutboundEvent::CreateMessage {
            conversation_id,
            message: content.to_string(),
        }
    }

    /// Re-join the active room after a reconnect; server-side membership
    /// does not survive the transport.
    pub fn rejoin(&mut self) -> Option<OutboundEvent> {
        self.router.reset_subscriptions();
        self.router.active().and_then(|id| self.router.join(id))
    }

    pub fn handle_event(&mut self, event: ChannelEvent) -> Option<RouterAction> {
        self.router
            .dispatch(event, &mut self.assembler, &mut self.store, self.author_id)
    }
}
