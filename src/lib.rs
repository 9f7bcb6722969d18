//! Proposal Chat - real-time chat client for the proposal advisor
//!
//! This crate keeps a WebSocket connection to the chat backend, routes the
//! advisor's frames to subscribers and binds the connection to one
//! client/proposal conversation at a time.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
