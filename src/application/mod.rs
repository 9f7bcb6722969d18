//! Application layer - Connection and session orchestration.
//!
//! Coordinates the chat core on top of the ports:
//!
//! - `ConnectionManager` owns the transport connection
//! - `MessageRouter` demultiplexes inbound frames to listeners
//! - `SessionCoordinator` binds conversations to the connection
//! - `ListenerRegistry` is the callback list shared by all three

mod connection_manager;
mod listeners;
mod message_router;
mod session_coordinator;

pub use connection_manager::{ConnectionManager, ConnectionSettings};
pub use listeners::{ListenerId, ListenerRegistry};
pub use message_router::MessageRouter;
pub use session_coordinator::{
    BindingState, SendReceipt, SessionCoordinator, SessionError, SessionEvent, SessionSettings,
    DEFAULT_INITIALIZATION_MESSAGE,
};
