//! `mocap-middleware` – Telemetry ingestion
//!
//! Moves sensor samples off the network and into memory without caring what
//! they mean.
//!
//! # Modules
//!
//! - [`store`] – [`ChannelStore`]: shared latest-value map keyed by channel
//!   name, written by the listener and read by the sample tick.
//! - [`codec`] – partial-tolerant decoder for flat JSON telemetry datagrams.
//! - [`listener`] – [`DatagramListener`]: background UDP receive loop with a
//!   typed failure classification.

pub mod codec;
pub mod listener;
pub mod store;

pub use codec::{DecodeError, DecodedDatagram, decode_datagram};
pub use listener::{
    DatagramListener, DatagramSource, ListenerConfig, ListenerError, ListenerHandle, ListenerStats,
    ListenerWaker,
};
pub use store::{ChannelSnapshot, ChannelStore};
