//! Behavioural suites for the daemon.

#[cfg(unix)]
mod process_behaviour;
mod support;
