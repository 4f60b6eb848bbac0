//! Push-channel connection over WebSocket.
//!
//! One [`ChannelConnection`] manages one logical channel (chat or tasks):
//! handshake, lifecycle events, autonomous reconnection driven by a
//! [`ReconnectPolicy`], and typed publish/subscribe dispatch.
//!
//! Every open/close cycle is tagged with an epoch. `connect()` and
//! `disconnect()` start a new epoch, and background tasks (the session loop
//! and the reconnect timer) give up as soon as they notice their epoch is no
//! longer current. That is what keeps a user-initiated close from being
//! followed by an autonomous reconnect.

use futures::{SinkExt, StreamExt};
use kako_core::auth::TokenProvider;
use kako_core::channel::{
    ChannelEvent, ChannelEventKind, ChannelKind, ClientFrame, ConnectionState, ConnectionStatus,
    channel_url, decode_frame,
};
use kako_core::config::ClientConfig;
use kako_core::reconnect::ReconnectPolicy;
use kako_core::{KakoError, Result};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subscriber callback. Runs on the connection's task; keep it short.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`ChannelConnection::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ClientConfig> for ChannelOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            policy: config.reconnect_policy(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// A resilient push channel. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct ChannelConnection {
    inner: Arc<Inner>,
}

struct Inner {
    kind: ChannelKind,
    server_url: String,
    tokens: Arc<dyn TokenProvider>,
    options: ChannelOptions,
    shared: Mutex<Shared>,
    listeners: Mutex<HashMap<ChannelEventKind, Vec<(ListenerId, EventHandler)>>>,
    next_listener: AtomicU64,
}

struct Shared {
    state: ConnectionState,
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reconnect_task: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelConnection {
    /// Creates an idle connection for `kind` on the backend at `server_url`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Which push channel to manage
    /// * `server_url` - Backend origin, e.g. `https://kako.example.com`
    /// * `tokens` - Source of the handshake credential
    /// * `options` - Backoff policy and handshake timeout
    pub fn new(
        kind: ChannelKind,
        server_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        options: ChannelOptions,
    ) -> Self {
        let server_url = server_url.into();
        let display_url = channel_url(&server_url, kind, None)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| server_url.clone());

        Self {
            inner: Arc::new(Inner {
                kind,
                server_url,
                tokens,
                options,
                shared: Mutex::new(Shared {
                    state: ConnectionState::new(display_url),
                    epoch: 0,
                    outbound: None,
                    reconnect_task: None,
                }),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(
        kind: ChannelKind,
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::new(kind, config.server_url.clone(), tokens, ChannelOptions::from(config))
    }

    pub fn kind(&self) -> ChannelKind {
        self.inner.kind
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).state.clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.shared).state.is_open()
    }

    /// Opens the channel, resetting the attempt counter.
    ///
    /// Resolves once the channel is Open. If the handshake fails the error
    /// is returned and the autonomous reconnect path takes over.
    pub async fn connect(&self) -> Result<()> {
        let epoch = {
            let mut shared = lock(&self.inner.shared);
            let epoch = shared.begin_epoch();
            shared.state.attempt = 0;
            epoch
        };

        match self.inner.open(epoch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_transient() {
                    self.inner.schedule_reconnect(epoch);
                }
                Err(e)
            }
        }
    }

    /// Closes the channel on purpose.
    ///
    /// Cancels any pending reconnect timer. No reconnect follows until
    /// [`connect`](Self::connect) is called again.
    pub fn disconnect(&self) {
        let was_live = {
            let mut shared = lock(&self.inner.shared);
            shared.begin_epoch();
            let previous = shared.state.status;
            shared.state.advance(ConnectionStatus::Closed);
            !matches!(previous, ConnectionStatus::Idle | ConnectionStatus::Closed)
        };

        if was_live {
            tracing::info!("[ChannelConnection] {} channel closed by client", self.inner.kind);
            self.inner.emit(&ChannelEvent::Disconnected {
                reason: "closed by client".to_string(),
            });
        }
    }

    /// Sends a frame if the channel is Open.
    ///
    /// Never fails: when the frame cannot be sent a [`ChannelEvent::Warning`]
    /// is emitted and `false` is returned.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        let sender = {
            let shared = lock(&self.inner.shared);
            if shared.state.is_open() {
                shared.outbound.clone()
            } else {
                None
            }
        };

        let Some(sender) = sender else {
            self.inner
                .warn(format!("{} channel is not open, message not sent", self.inner.kind));
            return false;
        };

        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                self.inner.warn(format!("failed to encode outbound frame: {}", e));
                return false;
            }
        };

        if sender.send(Message::Text(text.into())).is_err() {
            self.inner
                .warn(format!("{} channel closed while sending", self.inner.kind));
            return false;
        }
        true
    }

    /// Subscribes to one event kind. Handlers run in registration order.
    pub fn on<F>(&self, kind: ChannelEventKind, handler: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Number of handlers subscribed to `kind`.
    pub fn listener_count(&self, kind: ChannelEventKind) -> usize {
        lock(&self.inner.listeners).get(&kind).map_or(0, Vec::len)
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn off(&self, kind: ChannelEventKind, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(listener, _)| *listener != id);
        before != handlers.len()
    }
}

impl Shared {
    /// Invalidates every background task of the previous epoch.
    fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        // Dropping the sender makes the session loop close the socket.
        self.outbound = None;
        self.epoch
    }
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.shared).epoch == epoch
    }

    async fn open(self: &Arc<Self>, epoch: u64) -> Result<()> {
        let token = self.tokens.auth_token();
        let url = channel_url(&self.server_url, self.kind, token.as_deref())?;

        {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return Err(KakoError::transport("connection attempt superseded"));
            }
            shared.state.advance(ConnectionStatus::Connecting);
        }
        tracing::debug!("[ChannelConnection] Connecting {} channel", self.kind);

        let stream = match timeout(self.options.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let err = KakoError::handshake(self.kind.to_string(), e.to_string());
                tracing::warn!("[ChannelConnection] {}", err);
                self.emit(&ChannelEvent::Error(err.to_string()));
                return Err(err);
            }
            Err(_) => {
                let err = KakoError::Timeout(format!(
                    "{} channel handshake after {:?}",
                    self.kind, self.options.connect_timeout
                ));
                tracing::warn!("[ChannelConnection] {}", err);
                self.emit(&ChannelEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                tracing::debug!("[ChannelConnection] {} handshake finished after close", self.kind);
                return Err(KakoError::transport("connection closed during handshake"));
            }
            shared.outbound = Some(tx);
            shared.state.advance(ConnectionStatus::Open);
        }

        tracing::info!("[ChannelConnection] {} channel open", self.kind);
        self.emit(&ChannelEvent::Connected);

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_session(stream, rx, epoch).await });
        Ok(())
    }

    async fn run_session(
        self: Arc<Self>,
        stream: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        epoch: u64,
    ) {
        let (mut sink, mut source) = stream.split();

        let reason = loop {
            tokio::select! {
                message = outbound.recv() => match message {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            break format!("send failed: {}", e);
                        }
                    }
                    None => {
                        // Client-initiated close.
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the Pong itself.
                        let _ = sink.flush().await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.emit(&ChannelEvent::Error(e.to_string()));
                        break e.to_string();
                    }
                    None => break "stream ended".to_string(),
                },
            }
        };

        {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return;
            }
            shared.outbound = None;
            shared.state.advance(ConnectionStatus::Reconnecting);
        }

        tracing::warn!("[ChannelConnection] {} channel lost: {}", self.kind, reason);
        self.emit(&ChannelEvent::Disconnected { reason });
        self.schedule_reconnect(epoch);
    }

    fn handle_text(&self, text: &str) {
        match decode_frame(text) {
            Ok(frame) => self.emit(&ChannelEvent::Message(frame)),
            Err(e) => self.warn(format!("dropping malformed {} frame: {}", self.kind, e)),
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64) {
        let mut shared = lock(&self.shared);
        if shared.epoch != epoch {
            return;
        }
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.reconnect_loop(epoch).await });
        if let Some(previous) = shared.reconnect_task.replace(task) {
            previous.abort();
        }
    }

    async fn reconnect_loop(self: Arc<Self>, epoch: u64) {
        loop {
            let (attempt, delay) = {
                let mut shared = lock(&self.shared);
                if shared.epoch != epoch {
                    return;
                }
                shared.state.attempt += 1;
                let attempt = shared.state.attempt;
                let delay = self.options.policy.delay_for(attempt);
                if delay.is_some() {
                    shared.state.advance(ConnectionStatus::Reconnecting);
                } else {
                    shared.state.advance(ConnectionStatus::Closed);
                }
                (attempt, delay)
            };

            let Some(delay) = delay else {
                let attempts = attempt - 1;
                tracing::warn!(
                    "[ChannelConnection] {} channel gave up after {} attempts",
                    self.kind,
                    attempts
                );
                self.emit(&ChannelEvent::PermanentlyDisconnected { attempts });
                return;
            };

            tracing::info!(
                "[ChannelConnection] {} reconnect attempt {} in {:?}",
                self.kind,
                attempt,
                delay
            );
            tokio::time::sleep(delay).await;

            if !self.is_current(epoch) {
                return;
            }
            match self.open(epoch).await {
                Ok(()) => return,
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        "[ChannelConnection] Reconnect attempt {} failed: {}",
                        attempt,
                        e
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "[ChannelConnection] {} channel cannot reconnect: {}",
                        self.kind,
                        e
                    );
                    return;
                }
            }
        }
    }

    fn warn(&self, message: String) {
        tracing::warn!("[ChannelConnection] {}", message);
        self.emit(&ChannelEvent::Warning(message));
    }

    /// Dispatches to the handlers of `event.kind()`, in registration order.
    /// A panicking handler is logged and does not stop the rest.
    fn emit(&self, event: &ChannelEvent) {
        let handlers: Vec<EventHandler> = lock(&self.listeners)
            .get(&event.kind())
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    "[ChannelConnection] {} handler for '{}' panicked",
                    self.kind,
                    event.kind()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn idle_connection() -> ChannelConnection {
        ChannelConnection::new(
            ChannelKind::Chat,
            "http://127.0.0.1:1",
            Arc::new(|| None::<String>),
            ChannelOptions::default(),
        )
    }

    #[test]
    fn starts_idle_without_token_in_url() {
        let connection = idle_connection();
        let state = connection.state();
        assert_eq!(state.status, ConnectionStatus::Idle);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.channel_url, "ws://127.0.0.1:1/ws/chat");
    }

    #[test]
    fn send_while_idle_warns_and_returns_false() {
        let connection = idle_connection();
        let warnings = Arc::new(StdMutex::new(Vec::new()));
        let sink = warnings.clone();
        connection.on(ChannelEventKind::Warning, move |event| {
            if let ChannelEvent::Warning(message) = event {
                sink.lock().unwrap().push(message.clone());
            }
        });

        let frame = ClientFrame::Message(kako_core::channel::UserMessage {
            content: "hi".into(),
            session_id: "s".into(),
            model: None,
            exclude_tools: vec![],
        });
        assert!(!connection.send(&frame));
        assert_eq!(warnings.lock().unwrap().len(), 1);
    }

    #[test]
    fn handlers_run_in_order_and_survive_panics() {
        let connection = idle_connection();
        let calls = Arc::new(StdMutex::new(Vec::new()));

        let first = calls.clone();
        connection.on(ChannelEventKind::Warning, move |_| first.lock().unwrap().push(1));
        connection.on(ChannelEventKind::Warning, |_| panic!("handler bug"));
        let third = calls.clone();
        connection.on(ChannelEventKind::Warning, move |_| third.lock().unwrap().push(3));

        connection.inner.emit(&ChannelEvent::Warning("x".into()));
        assert_eq!(*calls.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn off_removes_only_that_listener() {
        let connection = idle_connection();
        let calls = Arc::new(StdMutex::new(0));

        let a = calls.clone();
        let id = connection.on(ChannelEventKind::Connected, move |_| *a.lock().unwrap() += 1);
        let b = calls.clone();
        connection.on(ChannelEventKind::Connected, move |_| *b.lock().unwrap() += 10);

        assert!(connection.off(ChannelEventKind::Connected, id));
        assert!(!connection.off(ChannelEventKind::Connected, id));
        assert_eq!(connection.listener_count(ChannelEventKind::Connected), 1);

        connection.inner.emit(&ChannelEvent::Connected);
        assert_eq!(*calls.lock().unwrap(), 10);
    }

    #[test]
    fn disconnect_when_idle_is_silent() {
        let connection = idle_connection();
        let seen = Arc::new(StdMutex::new(0));
        let counter = seen.clone();
        connection.on(ChannelEventKind::Disconnected, move |_| *counter.lock().unwrap() += 1);

        connection.disconnect();
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(connection.state().status, ConnectionStatus::Closed);
    }
}
