pub mod config;
pub mod errors;
pub mod js;

pub use config::{LaunchOptions, TimeoutConfig};
pub use errors::{is_context_lost, to_dom_error, to_scan_error};
