//! Reassembly of token-streamed assistant replies.

use crate::channel::ServerFrame;
use crate::store::SessionStore;

use super::message::{MessageId, StreamMessage, ToolCallEvent, ToolCallRecord, ToolCallStatus};

/// Fine-grained streaming events, as consumed by [`StreamAssembler::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start,
    Token(String),
    ToolCall(ToolCallEvent),
    /// Ends the stream. A non-empty `final_content` replaces what was accumulated.
    End { final_content: Option<String> },
}

impl StreamEvent {
    /// Extracts the streaming event carried by a chat frame, if any.
    pub fn from_frame(frame: &ServerFrame) -> Option<Self> {
        match frame {
            ServerFrame::StreamStart => Some(StreamEvent::Start),
            ServerFrame::StreamToken { content } => Some(StreamEvent::Token(content.clone())),
            ServerFrame::ToolCall(event) => Some(StreamEvent::ToolCall(event.clone())),
            ServerFrame::StreamEnd { content, .. } => Some(StreamEvent::End {
                final_content: content.clone(),
            }),
            _ => None,
        }
    }
}

/// Builds [`StreamMessage`]s in the store from streaming events.
///
/// The only state kept here is the id of the message currently being
/// streamed; the message itself lives in the [`SessionStore`].
#[derive(Debug, Default)]
pub struct StreamAssembler {
    current: Option<MessageId>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the message currently streaming.
    pub fn current(&self) -> Option<&MessageId> {
        self.current.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    pub fn apply(&mut self, store: &mut SessionStore, event: StreamEvent) {
        match event {
            StreamEvent::Start => self.start(store),
            StreamEvent::Token(text) => self.append(store, &text),
            StreamEvent::ToolCall(event) => self.tool_call(store, event),
            StreamEvent::End { final_content } => self.finish(store, final_content),
        }
    }

    /// Forgets the current message without touching the store, e.g. after
    /// the conversation was cleared.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn start(&mut self, store: &mut SessionStore) {
        if self.current.is_some() {
            tracing::debug!("[StreamAssembler] stream_start while streaming, finalizing previous");
            self.finish(store, None);
        }

        let message = StreamMessage::streaming();
        self.current = Some(message.id.clone());
        store.push_message(message);
    }

    fn append(&mut self, store: &mut SessionStore, text: &str) {
        match self.current_message(store) {
            Some(message) => message.content.push_str(text),
            None => tracing::debug!("[StreamAssembler] Dropping token outside a stream"),
        }
    }

    fn tool_call(&mut self, store: &mut SessionStore, event: ToolCallEvent) {
        let Some(message) = self.current_message(store) else {
            tracing::debug!(
                "[StreamAssembler] Dropping tool call '{}' outside a stream",
                event.name
            );
            return;
        };

        let open = if event.status == ToolCallStatus::Started {
            None
        } else {
            message
                .tool_calls
                .iter_mut()
                .rev()
                .find(|r| r.name == event.name && r.is_open())
        };

        match open {
            Some(record) => record.merge(event),
            None => message.tool_calls.push(ToolCallRecord::from_event(event)),
        }
    }

    fn finish(&mut self, store: &mut SessionStore, final_content: Option<String>) {
        let Some(id) = self.current.take() else {
            return;
        };
        let Some(message) = store.message_mut(&id) else {
            return;
        };

        if let Some(content) = final_content.filter(|c| !c.is_empty()) {
            message.content = content;
        }
        message.streaming = false;
    }

    fn current_message<'s>(&self, store: &'s mut SessionStore) -> Option<&'s mut StreamMessage> {
        let id = self.current.as_ref()?;
        store.message_mut(id)
    }
}
