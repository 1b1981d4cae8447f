//! The dispatch loop of the poke engine.
//!
//! A [`Dispatcher`] repeatedly retires expired pokes and hands due ones to
//! the tunnel registered for their type. The `poke-dispatch` binary wires a
//! SQLite store and the configured tunnels into one.

pub mod config;
mod dispatcher;
mod error;

pub use config::DispatchConfig;
pub use dispatcher::{ClaimSettings, Dispatcher, PassReport, TunnelSet};
pub use error::{Error, Result};
