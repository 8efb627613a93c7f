// Scriptbridge state managers
// Managers own persistent and per-session state: scripts, script values, menu commands.

pub mod menu_command_registry;
pub mod script_store;
pub mod value_store;
