//! Trading-alert webhook relay.
//!
//! Inbound alerts are normalized, classified into a [`signals::types::SignalKey`],
//! persisted and fanned out as push notifications. The classifier is pure and
//! can be used on its own.

pub mod config;
pub mod delivery;
pub mod monitoring;
pub mod pipeline;
pub mod server;
pub mod signals;
pub mod storage;
