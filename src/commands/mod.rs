// ABOUTME: Command implementations for the replicator CLI
// ABOUTME: Exports discover and sync commands

pub mod discover;
pub mod sync;

pub use discover::discover;
pub use sync::sync;
