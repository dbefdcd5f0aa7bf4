//! # pubsub-gateway
//!
//! A lightweight HTTP gateway over a publish/subscribe broker.
//!
//! The gateway creates and deletes topics and subscriptions, publishes
//! messages with attributes, pulls and acknowledges messages (from one
//! subscription, or merged across two with deduplication by broker identity)
//! and keeps track of long-lived push subscribers so they can be listed and
//! stopped.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod types;

pub use error::{Error, Result};
