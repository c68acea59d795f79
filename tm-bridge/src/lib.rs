//! Client engine for Tournament Manager field control.
//!
//! Connects to one field set, keeps a live view of the match on it and
//! turns macro-keypad actions into field-control commands.

pub mod config;
pub mod tm;

pub use config::{BridgeConfig, ConnectionConfig};
