//! Assembly of an in-flight model reply from streamed fragments.

use tracing::debug;

use crate::core::message::Message;

/// Where the assembler is in a reply's lifecycle.
///
/// `Failed` is terminal per reply: a transport error during a stream lands
/// here with a user-visible description instead of leaving the view hanging.
/// The next `message_start` leaves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    Failed(String),
}

/// Accumulates fragments of one in-progress model reply.
///
/// Fragments are kept in arrival order, which is the only ordering
/// guarantee the protocol offers: fragments carry no sequence numbers, so
/// reordering by the transport could be neither detected nor corrected
/// here. The underlying WebSocket delivers frames in order per connection,
/// which is what this relies on.
#[derive(Debug)]
pub struct StreamAssembler {
    phase: StreamPhase,
    fragments: Vec<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
            fragments: Vec::new(),
        }
    }

    pub fn phase(&self) -> &StreamPhase {
        &self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }

    /// `message_start`: clear the buffer and begin a reply.
    pub fn begin(&mut self) {
        self.fragments.clear();
        self.phase = StreamPhase::Streaming;
    }

    /// Append one fragment, in arrival order. Fragments outside an active
    /// stream are dropped; the server only sends them between start and end.
    pub fn push_fragment(&mut self, part: &str) {
        if self.phase != StreamPhase::Streaming {
            debug!("dropping fragment outside an active stream");
            return;
        }
        self.fragments.push(part.to_string());
    }

    /// `message_end`: concatenate the buffered fragments, with no injected
    /// separator, into the finished content. Clears the buffer and returns
    /// to `Idle`. Returns `None` when no stream was in flight.
    pub fn finish(&mut self) -> Option<String> {
        if self.phase != StreamPhase::Streaming {
            return None;
        }
        let content = self.fragments.concat();
        self.fragments.clear();
        self.phase = StreamPhase::Idle;
        Some(content)
    }

    /// Discard an in-flight reply without finalizing, e.g. when the view is
    /// about to navigate away.
    pub fn reset(&mut self) {
        self.fragments.clear();
        self.phase = StreamPhase::Idle;
    }

    /// Transport failure: flip an in-flight stream to the terminal `Failed`
    /// phase. A failure with no stream in flight leaves the phase alone.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.phase == StreamPhase::Streaming {
            self.fragments.clear();
            self.phase = StreamPhase::Failed(reason.into());
        }
    }

    /// The provisional trailing message a consumer renders while a reply is
    /// in flight. Built from the live buffer; never stored.
    pub fn provisional(&self, conversation_id: u64, author_id: u64) -> Option<Message> {
        if self.phase != StreamPhase::Streaming {
            return None;
        }
        Some(Message::local_model(
            conversation_id,
            author_id,
            self.fragments.concat(),
        ))
    }
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_concatenate_in_arrival_order_without_separator() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.push_fragment("Hi");
        assembler.push_fragment(" there");
        assembler.push_fragment("!");

        // The exact concatenation rule matters: a naive join would
        // silently produce "Hi, there,!".
        assert_eq!(assembler.finish(), Some("Hi there!".to_string()));
        assert_eq!(assembler.phase(), &StreamPhase::Idle);
    }

    #[test]
    fn begin_clears_any_previous_buffer() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.push_fragment("stale");
        assembler.begin();
        assembler.push_fragment("fresh");
        assert_eq!(assembler.finish(), Some("fresh".to_string()));
    }

    #[test]
    fn fragments_outside_a_stream_are_dropped() {
        let mut assembler = StreamAssembler::new();
        assembler.push_fragment("ignored");
        assert_eq!(assembler.finish(), None);

        assembler.begin();
        assert_eq!(assembler.finish(), Some(String::new()));
    }

    #[test]
    fn transport_failure_is_terminal_for_the_stream() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.push_fragment("partial");
        assembler.fail("connection reset");

        assert_eq!(
            assembler.phase(),
            &StreamPhase::Failed("connection reset".to_string())
        );
        // No finalize out of a failed stream.
        assert_eq!(assembler.finish(), None);

        // The next reply leaves the failed state.
        assembler.begin();
        assert!(assembler.is_streaming());
    }

    #[test]
    fn failure_while_idle_does_not_change_phase() {
        let mut assembler = StreamAssembler::new();
        assembler.fail("connection reset");
        assert_eq!(assembler.phase(), &StreamPhase::Idle);
    }

    #[test]
    fn provisional_message_mirrors_the_live_buffer() {
        let mut assembler = StreamAssembler::new();
        assert!(assembler.provisional(42, 9).is_none());

        assembler.begin();
        assembler.push_fragment("Hi");
        assembler.push_fragment(" there");

        let provisional = assembler.provisional(42, 9).expect("streaming");
        assert_eq!(provisional.content, "Hi there");
        assert!(provisional.is_local());
        assert!(provisional.role.is_model());

        assembler.finish();
        assert!(assembler.provisional(42, 9).is_none());
    }
}
