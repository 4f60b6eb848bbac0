//! I/O side of the Kako client: WebSocket channels, the REST backend,
//! configuration and token files, and logging.

pub mod auth;
pub mod config_service;
pub mod connection;
pub mod diagnostics;
pub mod http;
pub mod logging;
pub mod paths;

pub use crate::auth::{SecretFileTokenProvider, StaticTokenProvider};
pub use crate::config_service::ConfigService;
pub use crate::connection::{ChannelConnection, ChannelOptions, ListenerId};
pub use crate::diagnostics::{Diagnostic, DiagnosticsLayer};
pub use crate::http::HttpBackend;
pub use crate::logging::init_logging;
pub use crate::paths::KakoPaths;
