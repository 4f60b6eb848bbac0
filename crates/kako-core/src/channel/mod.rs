//! Push-channel vocabulary shared by the transport and the sync engine.
//!
//! # Module Structure
//!
//! - `frame`: inbound [`ServerFrame`] union, outbound [`ClientFrame`]
//! - `event`: [`ChannelEvent`] delivered to subscribers, [`ConnectionState`]

mod event;
mod frame;

pub use event::{ChannelEvent, ChannelEventKind, ConnectionState, ConnectionStatus};
pub use frame::{ClientFrame, ServerFrame, UserMessage, decode_frame};

use serde::{Deserialize, Serialize};
use strum::Display;
use url::Url;

use crate::error::{KakoError, Result};

/// The two logical push channels the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Tasks,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Chat, ChannelKind::Tasks];

    pub fn path(&self) -> &'static str {
        match self {
            ChannelKind::Chat => "/ws/chat",
            ChannelKind::Tasks => "/ws/tasks",
        }
    }
}

/// Derives a channel URL from the server origin.
///
/// `https` maps to `wss` and `http` to `ws`. The token, when present, is
/// appended as the `token` query parameter.
pub fn channel_url(server_url: &str, kind: ChannelKind, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(server_url)?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(KakoError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, server_url
            )));
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        KakoError::InvalidUrl(format!("cannot use {} scheme for {}", scheme, server_url))
    })?;

    url.set_path(kind.path());
    url.set_query(None);
    url.set_fragment(None);

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}
