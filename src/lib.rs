//! tinyfaas - a miniature Function-as-a-Service platform backed by an
//! embedded JavaScript engine.
//!
//! The core is the JS execution subsystem ([`engine`], [`isolate`],
//! [`cache`]): it embeds V8 in the host process, compiles user-supplied
//! ES modules, runs them to completion including top-level await, and
//! marshals a JSON payload in and a JSON value out. Around that core sit
//! an HTTP API ([`http`]), a SQLite-backed metadata store ([`store`]),
//! and process [`config`].

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod id;
pub mod isolate;
pub mod store;

/// Crate version, as reported by `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
