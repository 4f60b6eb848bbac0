//! Auth token source trait.
//!
//! Defines the interface the channels and the REST backend use to obtain the
//! current bearer token.

/// Provides the current auth token, if any.
///
/// # Security Note
///
/// Implementations should ensure that:
/// - Tokens are never logged or included in error messages
/// - Expired tokens are reported as `None` rather than handed out
pub trait TokenProvider: Send + Sync {
    /// Returns the token to attach to the next handshake or request.
    ///
    /// # Returns
    ///
    /// - `Some(token)`: A usable token
    /// - `None`: No session; connect without credentials
    fn auth_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn auth_token(&self) -> Option<String> {
        self()
    }
}
