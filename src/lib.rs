//! Scriptbridge: a userscript manager core: header parsing, URL matching,
//! CSP-aware security detection and multi-strategy script injection.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod platform;
pub mod services;
pub mod rpc_handler;
pub mod types;
