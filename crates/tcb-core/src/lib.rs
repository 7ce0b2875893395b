//! Core domain + application logic for the transport card balance bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, the SQL store and the
//! scraped balance form live behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod ports;

pub use errors::{Error, Result};
