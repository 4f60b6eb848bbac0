//! Event application for one client session.
//!
//! [`SyncEngine`] is the single consumer of decoded channel frames. It owns
//! the [`SessionStore`], the [`StreamAssembler`] and one
//! [`PendingEventQueue`] per UI surface. Frames for a detached surface are
//! queued and replayed through [`SyncEngine::handle`]'s apply path on
//! reattachment, so a queued frame is processed exactly like a live one.

use kako_core::catalog;
use kako_core::channel::{ChannelEvent, ChannelKind, ServerFrame};
use kako_core::chat::{MessageRole, StreamAssembler, StreamEvent, StreamMessage};
use kako_core::queue::PendingEventQueue;
use kako_core::store::SessionStore;
use kako_core::task::TaskUpdate;

/// Applies channel frames to the session store.
#[derive(Debug)]
pub struct SyncEngine {
    store: SessionStore,
    assembler: StreamAssembler,
    chat_queue: PendingEventQueue,
    task_queue: PendingEventQueue,
    chat_attached: bool,
    tasks_attached: bool,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(SessionStore::new(), 1000)
    }
}

impl SyncEngine {
    /// Creates an engine with both surfaces attached.
    ///
    /// # Arguments
    ///
    /// * `store` - Initial session state (carries the task notifier, if any)
    /// * `queue_capacity` - Maximum frames buffered per detached surface
    pub fn new(store: SessionStore, queue_capacity: usize) -> Self {
        Self {
            store,
            assembler: StreamAssembler::new(),
            chat_queue: PendingEventQueue::new(queue_capacity),
            task_queue: PendingEventQueue::new(queue_capacity),
            chat_attached: true,
            tasks_attached: true,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn assembler(&self) -> &StreamAssembler {
        &self.assembler
    }

    pub fn is_streaming(&self) -> bool {
        self.assembler.is_streaming()
    }

    pub fn is_attached(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Chat => self.chat_attached,
            ChannelKind::Tasks => self.tasks_attached,
        }
    }

    /// Frames waiting for `channel`'s surface to reattach.
    pub fn pending(&self, channel: ChannelKind) -> usize {
        self.queue(channel).len()
    }

    /// Routes one channel event. Only decoded frames touch the store.
    pub fn handle_event(&mut self, channel: ChannelKind, event: &ChannelEvent) {
        match event {
            ChannelEvent::Message(frame) => self.handle(channel, frame.clone()),
            ChannelEvent::Disconnected { reason } => {
                tracing::debug!("[SyncEngine] {} channel disconnected: {}", channel, reason);
            }
            other => {
                tracing::trace!("[SyncEngine] {} channel event: {}", channel, other.kind());
            }
        }
    }

    /// Applies a frame now, or queues it while its surface is detached.
    ///
    /// The working flag is tracked live either way, since it drives a
    /// global busy indicator rather than a surface.
    pub fn handle(&mut self, channel: ChannelKind, frame: ServerFrame) {
        self.track_working(&frame);

        if !self.is_attached(channel) {
            tracing::debug!(
                "[SyncEngine] {} surface detached, queueing {}",
                channel,
                frame.type_name()
            );
            self.queue_mut(channel).enqueue(channel, frame);
            return;
        }

        self.apply(frame);
    }

    /// Marks the surface detached; frames for it are queued from now on.
    pub fn detach(&mut self, channel: ChannelKind) {
        self.set_attached(channel, false);
    }

    /// Reattaches the surface and replays its queued frames in arrival order.
    ///
    /// Returns the number of replayed frames.
    pub fn attach(&mut self, channel: ChannelKind) -> usize {
        self.set_attached(channel, true);

        let pending = self.queue_mut(channel).flush();
        let count = pending.len();
        if count > 0 {
            tracing::debug!("[SyncEngine] Replaying {} queued {} frames", count, channel);
        }
        for event in pending {
            self.apply(event.frame);
        }
        count
    }

    /// Replaces the task list with a fresh snapshot.
    ///
    /// Task frames queued for a detached board predate the snapshot and are
    /// discarded so they cannot replay over it. Returns how many were dropped.
    pub fn replace_tasks(&mut self, tasks: Vec<TaskUpdate>) -> usize {
        let stale = self.task_queue.flush().len();
        if stale > 0 {
            tracing::debug!(
                "[SyncEngine] Discarding {} queued task frames behind snapshot",
                stale
            );
        }
        self.store.set_tasks(tasks);
        stale
    }

    /// Clears the conversation and forgets any in-progress stream.
    pub fn clear_messages(&mut self) {
        self.store.clear_messages();
        self.assembler.reset();
    }

    /// Replaces the conversation with fetched history.
    ///
    /// Refused while a reply is streaming, since the streaming message would
    /// be lost from under the assembler.
    pub fn load_history(&mut self, messages: Vec<StreamMessage>) -> bool {
        if self.assembler.is_streaming() {
            tracing::debug!("[SyncEngine] Not loading history while a reply is streaming");
            return false;
        }
        self.store.set_messages(messages);
        true
    }

    fn apply(&mut self, frame: ServerFrame) {
        if let Some(event) = StreamEvent::from_frame(&frame) {
            self.assembler.apply(&mut self.store, event);
            if let ServerFrame::StreamEnd {
                error: Some(error), ..
            } = frame
            {
                if !error.is_empty() {
                    self.system_message(&error);
                }
            }
            return;
        }

        match frame {
            ServerFrame::Message { role, content } => {
                self.store.add_message(StreamMessage::complete(role, content));
            }
            ServerFrame::Error { content } => self.system_message(&content),
            ServerFrame::Models(raw) => {
                self.store.set_catalog(catalog::normalize(&raw));
            }
            ServerFrame::TaskCreated { task } => self.store.upsert_task(task),
            ServerFrame::TaskUpdated { task } => {
                let id = task.id.clone();
                self.store.update_task(&id, task.patch);
            }
            ServerFrame::TaskDeleted { task_id } => {
                self.store.remove_task(&task_id);
            }
            ServerFrame::Ready => {}
            ServerFrame::Unknown => {
                tracing::debug!("[SyncEngine] Ignoring frame of unknown type");
            }
            // Streaming frames are consumed above.
            ServerFrame::StreamStart
            | ServerFrame::StreamToken { .. }
            | ServerFrame::ToolCall(_)
            | ServerFrame::StreamEnd { .. } => {}
        }
    }

    fn system_message(&mut self, error: &str) {
        self.store.add_message(StreamMessage::complete(
            MessageRole::System,
            format!("error: {}", error),
        ));
    }

    fn track_working(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::StreamStart => self.store.set_working(true),
            ServerFrame::Ready | ServerFrame::Error { .. } => self.store.set_working(false),
            ServerFrame::StreamEnd {
                error: Some(error), ..
            } if !error.is_empty() => self.store.set_working(false),
            _ => {}
        }
    }

    fn set_attached(&mut self, channel: ChannelKind, attached: bool) {
        match channel {
            ChannelKind::Chat => self.chat_attached = attached,
            ChannelKind::Tasks => self.tasks_attached = attached,
        }
    }

    fn queue(&self, channel: ChannelKind) -> &PendingEventQueue {
        match channel {
            ChannelKind::Chat => &self.chat_queue,
            ChannelKind::Tasks => &self.task_queue,
        }
    }

    fn queue_mut(&mut self, channel: ChannelKind) -> &mut PendingEventQueue {
        match channel {
            ChannelKind::Chat => &mut self.chat_queue,
            ChannelKind::Tasks => &mut self.task_queue,
        }
    }
}
