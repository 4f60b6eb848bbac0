//! Session synchronization use case.
//!
//! [`SessionSync`] wires the chat and task push channels to one
//! [`SyncEngine`]. Channel handlers only forward events into a queue; a single
//! pump task drains it and applies each event under the engine's write lock,
//! so store mutations never run concurrently and per-channel order is kept.

use crate::engine::SyncEngine;
use kako_core::auth::TokenProvider;
use kako_core::backend::{self, BackendApi, HttpMethod, MODELS_PATH, TASKS_PATH, TOOLS_PATH};
use kako_core::catalog;
use kako_core::channel::{
    ChannelEvent, ChannelEventKind, ChannelKind, ClientFrame, ConnectionState, UserMessage,
};
use kako_core::chat::{MessageRole, StreamMessage, new_session_id};
use kako_core::config::ClientConfig;
use kako_core::store::SessionStore;
use kako_core::task::{SortKey, TaskFilter};
use kako_core::{KakoError, Result};
use kako_infrastructure::{ChannelConnection, ListenerId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, RwLockReadGuard, broadcast, mpsc};
use tokio::task::JoinHandle;

const UPDATE_BUFFER: usize = 256;

/// A channel event after the engine has applied it.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncUpdate {
    pub channel: ChannelKind,
    pub event: ChannelEvent,
}

/// Keeps one client session's state in sync with the backend.
///
/// Construct once per application session and pass it by reference. Call
/// [`SessionSync::shutdown`] to release the channels and the pump task.
pub struct SessionSync {
    engine: Arc<RwLock<SyncEngine>>,
    backend: Arc<dyn BackendApi>,
    chat: ChannelConnection,
    tasks: ChannelConnection,
    updates: broadcast::Sender<SyncUpdate>,
    listeners: Mutex<Vec<(ChannelKind, ChannelEventKind, ListenerId)>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionSync {
    /// Creates the session and starts its pump task.
    ///
    /// Must be called within a Tokio runtime. Nothing connects until
    /// [`SessionSync::start`].
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine holding the initial store
    /// * `chat` - Connection for the chat channel
    /// * `tasks` - Connection for the task channel
    /// * `backend` - REST collaborator used for bootstrap and catch-up
    pub fn new(
        engine: SyncEngine,
        chat: ChannelConnection,
        tasks: ChannelConnection,
        backend: Arc<dyn BackendApi>,
    ) -> Self {
        let engine = Arc::new(RwLock::new(engine));
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut listeners = Vec::new();
        for connection in [&chat, &tasks] {
            let channel = connection.kind();
            for kind in ChannelEventKind::ALL {
                let events_tx = events_tx.clone();
                let id = connection.on(kind, move |event| {
                    let _ = events_tx.send((channel, event.clone()));
                });
                listeners.push((channel, kind, id));
            }
        }

        let pump = tokio::spawn(pump(
            engine.clone(),
            backend.clone(),
            events_rx,
            updates.clone(),
        ));

        Self {
            engine,
            backend,
            chat,
            tasks,
            updates,
            listeners: Mutex::new(listeners),
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Builds both channel connections and the store from the configuration.
    pub fn from_config(
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        backend: Arc<dyn BackendApi>,
        store: SessionStore,
    ) -> Self {
        let engine = SyncEngine::new(store, config.pending_queue_capacity);
        let chat = ChannelConnection::from_config(ChannelKind::Chat, config, tokens.clone());
        let tasks = ChannelConnection::from_config(ChannelKind::Tasks, config, tokens);
        Self::new(engine, chat, tasks, backend)
    }

    /// Read access to the engine and its store.
    pub async fn read(&self) -> RwLockReadGuard<'_, SyncEngine> {
        self.engine.read().await
    }

    /// Receives every channel event once it has been applied.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    pub fn connection(&self, channel: ChannelKind) -> &ChannelConnection {
        match channel {
            ChannelKind::Chat => &self.chat,
            ChannelKind::Tasks => &self.tasks,
        }
    }

    pub fn status(&self, channel: ChannelKind) -> ConnectionState {
        self.connection(channel).state()
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Bootstraps state over REST, then opens both channels.
    ///
    /// A channel whose handshake fails transiently keeps retrying in the
    /// background and is not reported as an error here.
    pub async fn start(&self) -> Result<()> {
        self.bootstrap().await;

        for channel in ChannelKind::ALL {
            if let Err(e) = self.connection(channel).connect().await {
                if !e.is_transient() {
                    return Err(e);
                }
                tracing::warn!("[SessionSync] {} channel not yet available: {}", channel, e);
            }
        }
        Ok(())
    }

    /// Fetches tasks, models and tools. Failures are logged and skipped.
    pub async fn bootstrap(&self) {
        if let Err(e) = self.refresh_tasks().await {
            tracing::warn!("[SessionSync] Failed to load tasks: {}", e);
        }
        if let Err(e) = self.refresh_models().await {
            tracing::warn!("[SessionSync] Failed to load models: {}", e);
        }
        if let Err(e) = self.refresh_tools().await {
            tracing::warn!("[SessionSync] Failed to load tools: {}", e);
        }
    }

    /// Manually reconnects one channel, resetting its attempt counter.
    pub async fn reconnect(&self, channel: ChannelKind) -> Result<()> {
        self.connection(channel).connect().await
    }

    /// Disconnects both channels, removes this session's listeners and
    /// stops the pump. Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        self.chat.disconnect();
        self.tasks.disconnect();

        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (channel, kind, id) in listeners {
            self.connection(channel).off(kind, id);
        }

        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.abort();
        }
        tracing::debug!("[SessionSync] Shut down");
    }

    // ============================================================================
    // REST bootstrap and catch-up
    // ============================================================================

    /// Replaces the task list with the backend's. Returns the task count.
    pub async fn refresh_tasks(&self) -> Result<usize> {
        refresh_tasks(&self.engine, self.backend.as_ref()).await
    }

    pub async fn refresh_models(&self) -> Result<()> {
        let body = self
            .backend
            .send_request(HttpMethod::Get, MODELS_PATH, None)
            .await?;
        let models = catalog::normalize(&body);
        self.engine.write().await.store_mut().set_catalog(models);
        Ok(())
    }

    pub async fn refresh_tools(&self) -> Result<()> {
        let body = self
            .backend
            .send_request(HttpMethod::Get, TOOLS_PATH, None)
            .await?;
        let tools = backend::parse_tool_list(&body);
        self.engine.write().await.store_mut().set_available_tools(tools);
        Ok(())
    }

    /// Loads a chat session's history and makes it the active session.
    ///
    /// Returns false when a reply is streaming; the history is not applied.
    pub async fn fetch_history(&self, session_id: &str) -> Result<bool> {
        let body = self
            .backend
            .send_request(HttpMethod::Get, &backend::chat_session_path(session_id), None)
            .await?;
        let messages = backend::parse_history(&body);

        let mut engine = self.engine.write().await;
        if !engine.load_history(messages) {
            return Ok(false);
        }
        engine.store_mut().set_active_session_id(session_id);
        Ok(true)
    }

    // ============================================================================
    // Chat
    // ============================================================================

    /// Sends a user message on the chat channel.
    ///
    /// Without `session_id` the active session is used, or a new one is
    /// generated and made active. The selected model and the switched-off
    /// tools ride along. The message is added to the conversation only when
    /// the channel accepted it; returns whether it did.
    pub async fn send_chat(&self, content: &str, session_id: Option<&str>) -> bool {
        let content = content.trim();
        if content.is_empty() {
            return false;
        }

        let mut engine = self.engine.write().await;
        let store = engine.store_mut();

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => store
                .active_session_id()
                .map(str::to_string)
                .unwrap_or_else(new_session_id),
        };
        let model = Some(store.selected_model())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let frame = ClientFrame::Message(UserMessage {
            content: content.to_string(),
            session_id: session_id.clone(),
            model,
            exclude_tools: store.excluded_tools(),
        });

        if !self.chat.send(&frame) {
            return false;
        }

        store.set_active_session_id(session_id);
        store.add_message(StreamMessage::complete(MessageRole::User, content));
        store.set_working(true);
        true
    }

    pub async fn select_model(&self, model_id: &str) -> bool {
        self.engine.write().await.store_mut().select_model(model_id)
    }

    /// Flips a tool and returns whether it is now enabled.
    pub async fn toggle_tool(&self, name: &str) -> Result<bool> {
        let mut engine = self.engine.write().await;
        let store = engine.store_mut();
        if !store.available_tools().iter().any(|t| t == name) {
            return Err(KakoError::not_found("tool", name));
        }
        Ok(store.toggle_tool(name))
    }

    pub async fn clear_messages(&self) {
        self.engine.write().await.clear_messages();
    }

    /// Sets the filter and sort used by the store's task views.
    pub async fn set_task_view(&self, filter: TaskFilter, sort: SortKey) {
        let mut engine = self.engine.write().await;
        let store = engine.store_mut();
        store.set_filter(filter);
        store.set_sort(sort);
    }

    // ============================================================================
    // Surfaces
    // ============================================================================

    /// Queues frames for `channel` until [`SessionSync::attach`].
    pub async fn detach(&self, channel: ChannelKind) {
        self.engine.write().await.detach(channel);
    }

    /// Replays queued frames for `channel` and resumes live application.
    pub async fn attach(&self, channel: ChannelKind) -> usize {
        self.engine.write().await.attach(channel)
    }
}

impl Drop for SessionSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn refresh_tasks(engine: &RwLock<SyncEngine>, backend: &dyn BackendApi) -> Result<usize> {
    let body = backend.send_request(HttpMethod::Get, TASKS_PATH, None).await?;
    let tasks = backend::parse_task_list(&body);
    let count = tasks.len();
    engine.write().await.replace_tasks(tasks);
    tracing::debug!("[SessionSync] Loaded {} tasks", count);
    Ok(count)
}

/// Applies channel events one at a time.
///
/// After the task channel comes back from a drop, the task list is fetched
/// again so updates missed while disconnected are not lost.
async fn pump(
    engine: Arc<RwLock<SyncEngine>>,
    backend: Arc<dyn BackendApi>,
    mut events: mpsc::UnboundedReceiver<(ChannelKind, ChannelEvent)>,
    updates: broadcast::Sender<SyncUpdate>,
) {
    let mut tasks_dropped = false;

    while let Some((channel, event)) = events.recv().await {
        match (&event, channel) {
            (ChannelEvent::Disconnected { .. }, ChannelKind::Tasks) => tasks_dropped = true,
            (ChannelEvent::Connected, ChannelKind::Tasks) if tasks_dropped => {
                tasks_dropped = false;
                if let Err(e) = refresh_tasks(&engine, backend.as_ref()).await {
                    tracing::warn!("[SessionSync] Task catch-up failed: {}", e);
                }
            }
            _ => {}
        }

        engine.write().await.handle_event(channel, &event);

        // No subscribers is fine.
        let _ = updates.send(SyncUpdate { channel, event });
    }
}
