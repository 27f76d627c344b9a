// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod anticheat;
pub mod app_dirs;
pub mod config;
pub mod delay;
pub mod error;
pub mod ledger;
pub mod library;
pub mod pacing;
pub mod quiz;
pub mod runtime;
pub mod services;
pub mod session;
pub mod text;
pub mod timer;
