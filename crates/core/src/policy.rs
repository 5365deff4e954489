use serde::{Deserialize, Serialize};

use crate::config::ScanTimings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Extreme,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Extreme => "extreme",
        }
    }
}

/// What the settings collaborator answers for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSelection {
    Normal,
    Extreme,
    Disabled,
}

impl ModeSelection {
    pub fn mode(self) -> Option<Mode> {
        match self {
            ModeSelection::Normal => Some(Mode::Normal),
            ModeSelection::Extreme => Some(Mode::Extreme),
            ModeSelection::Disabled => None,
        }
    }
}

impl From<Mode> for ModeSelection {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => ModeSelection::Normal,
            Mode::Extreme => ModeSelection::Extreme,
        }
    }
}

/// Additive signal weights for the banner classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weights {
    pub fixed_position: i32,
    pub high_z_index: i32,
    pub overlay: i32,
    pub scroll_lock: i32,
    pub modal_class: i32,
    pub consent_keyword: i32,
    pub reject_button: i32,
    pub accept_button: i32,
    pub safeguard_penalty: i32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            fixed_position: 15,
            high_z_index: 15,
            overlay: 20,
            scroll_lock: 10,
            modal_class: 7,
            consent_keyword: 8,
            reject_button: 25,
            accept_button: 10,
            safeguard_penalty: 1000,
        }
    }
}

/// Mode-derived policy, resolved once per page load and passed to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub mode: Mode,
    pub weights: Weights,
    /// Candidates below this score are left alone
    pub action_threshold: i32,
    /// Normal mode only hides a banner whose buttons failed if it clears this
    pub force_hide_threshold: i32,
    pub keyword_cap: usize,
    pub high_z_index: i64,
    /// Hide a known CMP container after a failed reject even without the provider's flag
    pub force_hide_known_cmp: bool,
    pub timings: ScanTimings,
}

impl Policy {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Normal => Self::normal(),
            Mode::Extreme => Self::extreme(),
        }
    }

    pub fn normal() -> Self {
        Self {
            mode: Mode::Normal,
            weights: Weights::default(),
            action_threshold: 60,
            force_hide_threshold: 90,
            keyword_cap: 3,
            high_z_index: 1000,
            force_hide_known_cmp: false,
            timings: ScanTimings::for_mode(Mode::Normal),
        }
    }

    pub fn extreme() -> Self {
        Self {
            mode: Mode::Extreme,
            weights: Weights {
                consent_keyword: 12,
                ..Weights::default()
            },
            action_threshold: 40,
            force_hide_threshold: 90,
            keyword_cap: 3,
            high_z_index: 1000,
            force_hide_known_cmp: true,
            timings: ScanTimings::for_mode(Mode::Extreme),
        }
    }

    pub fn is_extreme(&self) -> bool {
        self.mode == Mode::Extreme
    }

    /// Whether a candidate that survived its buttons gets force-hidden.
    pub fn should_force_hide(&self, score: i32) -> bool {
        self.is_extreme() || score >= self.force_hide_threshold
    }

    pub fn with_timings(mut self, timings: ScanTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn apply(mut self, overrides: &PolicyOverrides) -> Self {
        if let Some(weights) = &overrides.weights {
            self.weights = weights.clone();
        }
        if let Some(v) = overrides.action_threshold {
            self.action_threshold = v;
        }
        if let Some(v) = overrides.force_hide_threshold {
            self.force_hide_threshold = v;
        }
        if let Some(v) = overrides.keyword_cap {
            self.keyword_cap = v;
        }
        self
    }
}

/// Tuning knobs loaded from JSON; absent fields keep the mode defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverrides {
    pub weights: Option<Weights>,
    pub action_threshold: Option<i32>,
    pub force_hide_threshold: Option<i32>,
    pub keyword_cap: Option<usize>,
}

impl PolicyOverrides {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extreme_lowers_threshold_and_weights_text_higher() {
        let normal = Policy::normal();
        let extreme = Policy::extreme();
        assert!(extreme.action_threshold < normal.action_threshold);
        assert!(extreme.weights.consent_keyword > normal.weights.consent_keyword);
        assert!(extreme.force_hide_known_cmp);
    }

    #[test]
    fn force_hide_depends_on_mode() {
        assert!(!Policy::normal().should_force_hide(70));
        assert!(Policy::normal().should_force_hide(90));
        assert!(Policy::extreme().should_force_hide(41));
    }

    #[test]
    fn overrides_keep_unset_fields() {
        let overrides = PolicyOverrides::from_json(r#"{ "actionThreshold": 50 }"#).unwrap();
        let policy = Policy::normal().apply(&overrides);
        assert_eq!(policy.action_threshold, 50);
        assert_eq!(policy.force_hide_threshold, 90);
        assert_eq!(policy.weights, Weights::default());
    }

    #[test]
    fn partial_weights_fall_back_to_defaults() {
        let overrides = PolicyOverrides::from_json(r#"{ "weights": { "overlay": 30 } }"#).unwrap();
        let policy = Policy::normal().apply(&overrides);
        assert_eq!(policy.weights.overlay, 30);
        assert_eq!(policy.weights.fixed_position, 15);
    }
}
