// ABOUTME: Library root for exacttarget-replicator
// ABOUTME: Dynamic data extension discovery and windowed incremental replication

pub mod catalog;
pub mod commands;
pub mod config;
pub mod projector;
pub mod remote;
pub mod schema;
pub mod sink;
pub mod state;
pub mod sync;
