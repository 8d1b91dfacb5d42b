//! Charge-point side of OCPP 1.6 for embedded hosts.
//!
//! The crate is transport-agnostic: a host provides a [`platform::Platform`]
//! for framing, ids and the clock, plus one [`charger::connector::ConnectorPort`]
//! per physical outlet, then calls [`charger::ChargePoint::step`] on its own
//! cadence. Everything in between — boot, heartbeat, authorize, transactions,
//! meter values, retry and drop policy, remote commands, the configuration
//! registry — lives here.

pub mod charger;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod platform;
pub mod pool;

pub use charger::ChargePoint;
pub use engine::Ocpp;
pub use error::Error;
