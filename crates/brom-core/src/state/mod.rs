//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{HandleResult, HandlerContext, ProtocolError, handle_state};
pub use machine::{SessionState, StateMachineContext};
