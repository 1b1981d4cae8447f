//! Delivery tunnels for pokes.
//!
//! Each tunnel wraps one provider client behind the [`Tunnel`] trait;
//! [`LogWrapper`] decorates any tunnel so every attempt leaves an audit
//! record in a [`PokeStore`](poke_core::PokeStore).

#![allow(async_fn_in_trait)]

mod log_wrapper;
mod mail;
mod sms;
mod voice;

pub mod provider;

pub use log_wrapper::{LogWrapper, RetryPolicy};
pub use mail::MailTunnel;
pub use poke_core::Tunnel;
pub use sms::{SmsTunnel, map_sms_status};
pub use voice::VoiceTunnel;
