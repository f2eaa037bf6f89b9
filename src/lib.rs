//! # Outgoing message packaging
//!
//! Turns a stored, already encrypted draft into a single send request in
//! which every recipient gets the package matching their capabilities:
//! internal delivery, PGP inline or PGP/MIME to an external key,
//! password protection for outsiders, or cleartext.

#![recursion_limit = "256"]
#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    clippy::all,
    clippy::wildcard_imports,
    clippy::needless_borrow,
    clippy::cast_lossless,
    clippy::unused_async,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::cloned_instead_of_copied
)]
#![cfg_attr(not(test), warn(clippy::indexing_slicing))]
#![allow(
    clippy::match_bool,
    clippy::bool_assert_comparison,
    clippy::manual_split_once,
    clippy::format_push_string
)]

#[macro_use]
pub mod log;

pub mod attachment;
pub mod auth;
pub mod body;
pub mod config;
pub mod constants;
pub mod context;
pub mod crypto;
mod dehtml;
pub mod directory;
pub mod draft;
pub mod error;
pub mod events;
pub mod key;
pub mod metadata;
mod mimefactory;
pub mod package;
pub mod request;
pub mod send;
pub mod send_prefs;
mod tools;
pub mod transport;

pub use config::Config;
pub use context::{Context, ContextBuilder};
pub use error::{PartialFailure, SendError};
pub use events::{Event, EventEmitter, EventType, Events};
pub use request::SendSchedule;
pub use send::{send_message, SendReport, SendStage};

#[cfg(test)]
mod test_utils;
