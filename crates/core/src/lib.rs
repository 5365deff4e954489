pub mod catalog;
pub mod config;
pub mod policy;
pub mod report;
pub mod settings;

pub use catalog::{Provider, ProviderSelectors, SafeguardKeywords, SignatureCatalog};
pub use config::ScanTimings;
pub use policy::{Mode, ModeSelection, Policy, PolicyOverrides, Weights};
pub use report::{ActionKind, ActionReport, NullReporter, Reporter, TracingReporter};
pub use settings::{FixedSettings, SettingsSource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories, used to decide how far a failure is allowed to travel.
///
/// Nothing in the scan path is fatal: every category degrades to "do less".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Signature catalog missing or malformed
    Catalog,
    /// Selector syntax the engine cannot parse
    Selector,
    /// Document backend failure (detached node, torn-down page)
    Dom,
    /// Neither native nor synthetic click worked
    Click,
    /// Settings channel unavailable
    Settings,
    /// Reporting channel unavailable
    Reporting,
    /// Browser/driver errors
    Browser,
    /// Page-context script failed
    Script,
    /// Settings persistence
    Storage,
    /// HTML/JSON parsing
    Parsing,
}

/// Structured error with context for logging.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{category:?}] {message}")]
pub struct ScanError {
    pub category: ErrorCategory,
    pub message: String,
    /// Optional context (selector, provider, domain...)
    pub context: serde_json::Value,
}

impl ScanError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            context: serde_json::json!({}),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn catalog_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Catalog, message)
    }

    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        let selector = selector.into();
        Self::new(ErrorCategory::Selector, format!("Invalid selector '{}': {}", selector, reason.into()))
            .with_context(serde_json::json!({ "selector": selector }))
    }

    pub fn dom_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Dom, message)
    }

    pub fn settings_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Settings, message)
    }

    pub fn browser_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Browser, message)
    }

    pub fn script_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Script, message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Storage, message)
    }

    pub fn parsing_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Parsing, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_selector_carries_context() {
        let err = ScanError::invalid_selector("[class*=", "unterminated attribute");
        assert_eq!(err.category, ErrorCategory::Selector);
        assert_eq!(err.context["selector"], "[class*=");
        assert!(err.to_string().starts_with("[Selector]"));
    }
}
