//! `thermwatch-agent` library crate.
//!
//! Device transport, retrying fetch, concurrent poll, shutdown guard and
//! the monitor loop. Re-exported for integration testing; the binary
//! entrypoint lives in `main.rs`.

pub mod fetch;
pub mod monitor;
pub mod poll;
pub mod results;
pub mod shutdown;
pub mod signal;
pub mod transport;
