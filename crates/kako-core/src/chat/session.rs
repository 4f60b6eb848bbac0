//! Chat session identifiers.

use chrono::Utc;

const SESSION_PREFIX: &str = "web:chat";

/// Generates a session id of the form `web:chat:<base36 epoch millis>`.
pub fn new_session_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("{}:{}", SESSION_PREFIX, to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
