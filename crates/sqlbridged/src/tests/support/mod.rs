//! Shared harness for the daemon behavioural suites.

mod client;
mod config_loader;
#[cfg(unix)]
mod process_world;
mod reporter;
mod session_world;
mod world;

pub use client::JsonlClient;
#[cfg(unix)]
pub use process_world::ProcessWorld;
pub use reporter::HealthEvent;
pub use session_world::SessionWorld;
pub use world::{TestWorld, world};
