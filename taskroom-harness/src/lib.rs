//! In-process sync server for exercising the Taskroom client end to end.
//!
//! The production server is an external collaborator; this harness stands
//! in for it in tests. It speaks the same wire protocol (token-gated
//! WebSocket upgrade with a long-polling fallback, JSON event frames) and
//! serves the REST stub under `/api`, with an in-process [`server::ServerHandle`]
//! for pushing events into rooms and severing connections.

pub mod rest;
pub mod rooms;
pub mod server;
