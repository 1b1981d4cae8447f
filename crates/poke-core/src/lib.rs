//! Core types and trait definitions for the poke notification engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`PokeStore`]; delivery channels implement
//! [`Tunnel`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod poke;
pub mod record;
pub mod store;
pub mod tunnel;

pub use error::{BoxError, ConfigurationError, TunnelError};
pub use poke::{ArchivedPoke, Claim, NewPoke, Poke, TunnelType};
pub use record::{Record, Status};
pub use store::{LIST_LIMIT, PokeStore, StoreError};
pub use tunnel::{DynTunnel, SendOutcome, Tunnel};
