//! Taskroom — real-time project room synchronization client.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod rest;
pub mod rooms;
pub mod session;
pub mod tasks;
pub mod transport;
