//! ConnectionState enum for the transport connection lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Lifecycle state of the single logical transport connection.
///
/// ```text
/// Idle -> Connecting -> Open -> Closing -> Closed
///              |          |                  |
///              +----------+---> Closed <-----+--> Connecting
/// ```
///
/// `Closed` covers both orderly close and transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Returns true if frames can be written right now.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
                | (Closed, Connecting)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{}", s)
    }
}
