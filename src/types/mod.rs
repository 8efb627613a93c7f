// Scriptbridge shared type definitions
// Each submodule defines types used across the crate.

pub mod bridge;
pub mod errors;
pub mod injection;
pub mod script;
pub mod security;
pub mod settings;
