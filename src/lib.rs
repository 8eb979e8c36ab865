//! Real-time chat core for property enquiries: rooms gated by business
//! flags, persisted history with read receipts, and a three-step escalation
//! ladder, served over WebSocket with a small HTTP surface.

pub mod bus;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod http;
pub mod permission;
pub mod protocol;
pub mod session;
pub mod store;
pub mod ws;

pub use coordinator::ChatCoordinator;
pub use error::{ChatError, ChatResult};
