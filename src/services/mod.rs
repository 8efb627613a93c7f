// Scriptbridge services
// Parsing, matching, detection and injection logic, plus the page bridge.

pub mod dependency_loader;
pub mod grant_api;
pub mod injection_orchestrator;
pub mod injection_strategies;
pub mod message_bridge;
pub mod metadata_parser;
pub mod page_probe;
pub mod script_payload;
pub mod security_detector;
pub mod settings_engine;
pub mod url_matcher;
