//! Chat domain: message types, session ids and the stream assembler.

mod assembler;
mod message;
mod session;

pub use assembler::{StreamAssembler, StreamEvent};
pub use message::{
    MessageId, MessageRole, StreamMessage, ToolCallEvent, ToolCallRecord, ToolCallStatus,
};
pub use session::new_session_id;
