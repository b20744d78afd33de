//! Routing of inbound channel events to the active conversation.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::core::connection::{ChannelEvent, OutboundEvent};
use crate::core::conversation::ConversationStore;
use crate::core::message::Message;
use crate::core::stream::StreamAssembler;

/// Settle delay before navigating away mid-stream, so the finishing event
/// lands before the view swaps. Matches the service's web client.
pub const NAVIGATE_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Side effect the caller must perform after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterAction {
    /// Switch the view to this conversation after [`NAVIGATE_SETTLE_DELAY`].
    Navigate { conversation_id: u64 },
}

/// Subscribes the connection to one conversation's events at a time and
/// demultiplexes inbound events to the assembler and store.
///
/// `active == None` means a brand-new conversation whose id the server has
/// not assigned yet; its reply events arrive unscoped and are accepted
/// until the finishing event reveals the assigned id.
pub struct RoomRouter {
    active: Option<u64>,
    joined: HashSet<u64>,
    pending_navigation: Option<u64>,
}

impl RoomRouter {
    pub fn new(active: Option<u64>) -> Self {
        Self {
            active,
            joined: HashSet::new(),
            pending_navigation: None,
        }
    }

    pub fn active(&self) -> Option<u64> {
        self.active
    }

    /// Subscribe to a conversation's channel. Idempotent: re-joining the
    /// currently joined id emits nothing, so re-mounting a view cannot
    /// cause duplicate delivery. Switching ids leaves the previous
    /// subscription behind before joining the new one.
    pub fn join(&mut self, conversation_id: u64) -> Option<OutboundEvent> {
        if self.active == Some(conversation_id) && self.joined.contains(&conversation_id) {
            debug!(conversation_id, "already joined");
            return None;
        }

        if let Some(previous) = self.active.filter(|id| *id != conversation_id) {
            self.joined.remove(&previous);
        }

        self.active = Some(conversation_id);
        self.joined.insert(conversation_id);
        self.pending_navigation = None;
        Some(OutboundEvent::JoinRoom { conversation_id })
    }

    /// A reconnect invalidates server-side room membership; call this so
    /// the next `join` re-subscribes.
    pub fn reset_subscriptions(&mut self) {
        self.joined.clear();
    }

    fn matches_active(&self, conversation_id: u64) -> bool {
        match self.active {
            Some(active) => active == conversation_id,
            // Brand-new conversation: reply events arrive before an id is
            // known and belong to the pending reply.
            None => true,
        }
    }

    /// Dispatch one inbound event. Events for the active conversation flow
    /// into the assembler/store; a finishing event for a different
    /// conversation id skips the local finalize and asks the caller to
    /// navigate instead, exactly once per target.
    pub fn dispatch(
        &mut self,
        event: ChannelEvent,
        assembler: &mut StreamAssembler,
        store: &mut ConversationStore,
        author_id: u64,
    ) -> Option<RouterAction> {
        match event {
            ChannelEvent::MessageStart { conversation_id } => {
                if self.matches_active(conversation_id) {
                    assembler.begin();
                } else {
                    debug!(conversation_id, "ignoring start for another conversation");
                }
                None
            }
            ChannelEvent::Fragment {
                conversation_id,
                part,
            } => {
                if self.matches_active(conversation_id) {
                    assembler.push_fragment(&part);
                } else {
                    debug!(conversation_id, "ignoring fragment for another conversation");
                }
                None
            }
            ChannelEvent::MessageEnd { conversation_id } => {
                if self.active == Some(conversation_id) {
                    if let Some(content) = assembler.finish() {
                        store.append(Message::local_model(conversation_id, author_id, content));
                    }
                    return None;
                }

                // The reply belongs elsewhere: a brand-new conversation
                // just got its server-assigned id, or the user navigated
                // away mid-stream. Never update the wrong view.
                assembler.reset();
                if self.pending_navigation == Some(conversation_id) {
                    debug!(conversation_id, "navigation already pending");
                    return None;
                }
                self.pending_navigation = Some(conversation_id);
                Some(RouterAction::Navigate { conversation_id })
            }
            ChannelEvent::TransportError { message } => {
                assembler.fail(message);
                None
            }
            ChannelEvent::Connected | ChannelEvent::Disconnected => None,
        }
    }
}
