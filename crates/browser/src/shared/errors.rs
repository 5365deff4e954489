use unbanner_core::ScanError;
use unbanner_dom::DomError;

/// The page navigated away underneath a script call.
pub fn is_context_lost(message: &str) -> bool {
    message.contains("Cannot find context") || message.contains("Execution context was destroyed")
}

pub fn to_scan_error(e: impl std::fmt::Display, action: &str) -> ScanError {
    let s = e.to_string();
    if s.contains("timeout") || s.contains("Timeout") || s.contains("elapsed") {
        ScanError::browser_error(format!("{} timed out: {}", action, s))
    } else if s.contains("navigation") || s.contains("Navigation") {
        ScanError::browser_error(format!("{} navigation failed: {}", action, s))
    } else if is_context_lost(&s) {
        ScanError::script_error(format!("{}: page context lost: {}", action, s))
    } else {
        ScanError::browser_error(format!("{} failed: {}", action, s))
    }
}

pub fn to_dom_error(e: impl std::fmt::Display, action: &str) -> DomError {
    DomError::Backend(format!("{}: {}", action, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_core::ErrorCategory;

    #[test]
    fn classifies_by_message() {
        assert_eq!(to_scan_error("Request Timeout", "Launch").category, ErrorCategory::Browser);
        let lost = to_scan_error("Execution context was destroyed", "Evaluate");
        assert_eq!(lost.category, ErrorCategory::Script);
        assert!(lost.message.contains("page context lost"));
        assert!(!is_context_lost("Element not found"));
    }
}
