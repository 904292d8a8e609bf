//! Brownout profile management
//!
//! Holds the named `primary` and `brownout` profiles and derives the
//! light/moderate/heavy variants from them. Activation always computes the
//! target profile fresh from the named profiles, never from the live one,
//! so repeated activations cannot compound reductions, and deactivation
//! restores `primary` by plain assignment.

use crate::config::{validate_range, ConfigError};
use crate::runtime::ModelSwitch;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Inclusive bounds for the conversation context window
pub const CONTEXT_WINDOW_BOUNDS: (u32, u32) = (1, 32);

/// Inclusive bounds for retrieval depth
pub const RAG_TOP_K_BOUNDS: (u32, u32) = (1, 20);

/// Token budget floor applied by the heavy variant
const HEAVY_TOKEN_FLOOR: u32 = 128;

/// Tools that survive the heavy variant
const ESSENTIAL_TOOLS: &[&str] = &["retrieval"];

/// Capability profile applied to the inference pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrownoutProfile {
    pub model: String,
    pub context_window: u32,
    pub rag_top_k: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools_heavy: bool,
    pub tools_enabled: Vec<String>,
}

impl BrownoutProfile {
    /// Default full-capability profile
    pub fn primary_default() -> Self {
        Self {
            model: "primary".to_string(),
            context_window: 16,
            rag_top_k: 8,
            max_tokens: 1024,
            temperature: 0.7,
            tools_heavy: true,
            tools_enabled: vec![
                "web_search".to_string(),
                "code_interpreter".to_string(),
                "retrieval".to_string(),
                "calculator".to_string(),
            ],
        }
    }

    /// Default degraded profile
    pub fn brownout_default() -> Self {
        Self {
            model: "fallback-small".to_string(),
            context_window: 4,
            rag_top_k: 2,
            max_tokens: 256,
            temperature: 0.3,
            tools_heavy: false,
            tools_enabled: vec!["retrieval".to_string(), "calculator".to_string()],
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_range(
            "context_window",
            self.context_window as i64,
            CONTEXT_WINDOW_BOUNDS.0 as i64,
            CONTEXT_WINDOW_BOUNDS.1 as i64,
        )?;
        validate_range(
            "rag_top_k",
            self.rag_top_k as i64,
            RAG_TOP_K_BOUNDS.0 as i64,
            RAG_TOP_K_BOUNDS.1 as i64,
        )?;
        if self.model.is_empty() {
            return Err(ConfigError::Empty { field: "model" });
        }
        Ok(())
    }
}

/// Degradation level for `activate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrownoutLevel {
    /// Mild reductions, most capability retained
    Light,
    /// The named brownout profile
    Moderate,
    /// Brownout profile with non-essential tools disabled and the floor
    /// token budget
    Heavy,
}

impl BrownoutLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrownoutLevel::Light => "light",
            BrownoutLevel::Moderate => "moderate",
            BrownoutLevel::Heavy => "heavy",
        }
    }
}

impl std::fmt::Display for BrownoutLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named profiles loaded at startup
#[derive(Debug, Clone)]
pub struct BrownoutConfig {
    pub primary: BrownoutProfile,
    pub brownout: BrownoutProfile,
}

impl Default for BrownoutConfig {
    fn default() -> Self {
        Self {
            primary: BrownoutProfile::primary_default(),
            brownout: BrownoutProfile::brownout_default(),
        }
    }
}

impl BrownoutConfig {
    /// Validate both named profiles once at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.primary.validate()?;
        self.brownout.validate()?;
        Ok(())
    }
}

/// Owns the active profile and the named profiles it derives from
///
/// Mutated from exactly two call sites, the control loop and the manual
/// control surface, both serialized through the owning lock.
pub struct BrownoutManager {
    primary: BrownoutProfile,
    brownout: BrownoutProfile,
    active: BrownoutProfile,
    level: Option<BrownoutLevel>,
    notify_tx: Option<mpsc::Sender<ModelSwitch>>,
}

impl BrownoutManager {
    pub fn new(config: BrownoutConfig) -> Self {
        let active = config.primary.clone();
        Self {
            primary: config.primary,
            brownout: config.brownout,
            active,
            level: None,
            notify_tx: None,
        }
    }

    /// Attach the outbound model-switch channel
    ///
    /// Notifications are best-effort; a full channel drops the message with
    /// a warning rather than blocking a profile transition.
    pub fn with_notifier(mut self, tx: mpsc::Sender<ModelSwitch>) -> Self {
        self.notify_tx = Some(tx);
        self
    }

    /// Apply a degradation level
    ///
    /// Idempotent: the profile is computed fresh from the named profiles on
    /// every call, so activating the same level twice yields an identical
    /// profile.
    pub fn activate(&mut self, level: BrownoutLevel) -> BrownoutProfile {
        let profile = self.profile_for(level);
        self.apply(profile, Some(level), "brownout_activated");
        self.active.clone()
    }

    /// Restore the primary profile exactly
    pub fn deactivate(&mut self) -> BrownoutProfile {
        let profile = self.primary.clone();
        self.apply(profile, None, "brownout_deactivated");
        self.active.clone()
    }

    /// Force the minimal-capability profile regardless of current state
    pub fn emergency_reset(&mut self) -> BrownoutProfile {
        let profile = self.profile_for(BrownoutLevel::Heavy);
        self.apply(profile, Some(BrownoutLevel::Heavy), "emergency_reset");
        self.active.clone()
    }

    /// Snapshot of the active profile; callers must not treat it as live
    pub fn current_profile(&self) -> BrownoutProfile {
        self.active.clone()
    }

    pub fn level(&self) -> Option<BrownoutLevel> {
        self.level
    }

    /// Manual override: switch the served model
    pub fn set_model(&mut self, model: impl Into<String>) -> Result<(), ConfigError> {
        let model = model.into();
        if model.is_empty() {
            return Err(ConfigError::Empty { field: "model" });
        }
        self.active.model = model;
        self.notify("manual_override");
        Ok(())
    }

    /// Manual override: bound-checked context window
    pub fn set_context_window(&mut self, value: u32) -> Result<(), ConfigError> {
        validate_range(
            "context_window",
            value as i64,
            CONTEXT_WINDOW_BOUNDS.0 as i64,
            CONTEXT_WINDOW_BOUNDS.1 as i64,
        )?;
        self.active.context_window = value;
        Ok(())
    }

    /// Manual override: bound-checked retrieval depth
    pub fn set_rag_top_k(&mut self, value: u32) -> Result<(), ConfigError> {
        validate_range(
            "rag_top_k",
            value as i64,
            RAG_TOP_K_BOUNDS.0 as i64,
            RAG_TOP_K_BOUNDS.1 as i64,
        )?;
        self.active.rag_top_k = value;
        Ok(())
    }

    /// Manual override: toggle heavy tool availability
    pub fn set_tools_heavy(&mut self, enabled: bool) {
        self.active.tools_heavy = enabled;
    }

    /// Compute the profile for a level from the named profiles
    fn profile_for(&self, level: BrownoutLevel) -> BrownoutProfile {
        match level {
            BrownoutLevel::Light => {
                let mut profile = self.primary.clone();
                profile.context_window = (profile.context_window / 2).max(1);
                profile.rag_top_k = (profile.rag_top_k / 2).max(1);
                profile.max_tokens = (profile.max_tokens * 3 / 4).max(HEAVY_TOKEN_FLOOR);
                profile.temperature = profile.temperature.min(0.5);
                profile
            }
            BrownoutLevel::Moderate => self.brownout.clone(),
            BrownoutLevel::Heavy => {
                let mut profile = self.brownout.clone();
                profile.tools_heavy = false;
                profile
                    .tools_enabled
                    .retain(|tool| ESSENTIAL_TOOLS.contains(&tool.as_str()));
                profile.max_tokens = HEAVY_TOKEN_FLOOR;
                profile
            }
        }
    }

    fn apply(&mut self, profile: BrownoutProfile, level: Option<BrownoutLevel>, reason: &str) {
        let model_changed = profile.model != self.active.model;
        self.active = profile;
        self.level = level;
        if model_changed {
            self.notify(reason);
        }
    }

    fn notify(&self, reason: &str) {
        if let Some(tx) = &self.notify_tx {
            let switch = ModelSwitch {
                model: self.active.model.clone(),
                reason: reason.to_string(),
            };
            if let Err(e) = tx.try_send(switch) {
                warn!(error = %e, "Model switch notification dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BrownoutManager {
        BrownoutManager::new(BrownoutConfig::default())
    }

    #[test]
    fn test_activate_moderate_applies_named_profile() {
        let mut manager = manager();
        let profile = manager.activate(BrownoutLevel::Moderate);
        assert_eq!(profile, BrownoutProfile::brownout_default());
        assert_eq!(manager.level(), Some(BrownoutLevel::Moderate));
    }

    #[test]
    fn test_activation_is_idempotent() {
        let mut manager = manager();
        let first = manager.activate(BrownoutLevel::Moderate);
        let second = manager.activate(BrownoutLevel::Moderate);
        assert_eq!(first, second);

        let first = manager.activate(BrownoutLevel::Heavy);
        let second = manager.activate(BrownoutLevel::Heavy);
        assert_eq!(first, second);
    }

    #[test]
    fn test_deactivate_restores_primary_exactly() {
        let mut manager = manager();
        let before = manager.current_profile();

        for level in [
            BrownoutLevel::Light,
            BrownoutLevel::Moderate,
            BrownoutLevel::Heavy,
        ] {
            manager.activate(level);
            let restored = manager.deactivate();
            assert_eq!(restored, before);
            assert_eq!(manager.level(), None);
        }
    }

    #[test]
    fn test_heavy_disables_non_essential_tools() {
        let mut manager = manager();
        let profile = manager.activate(BrownoutLevel::Heavy);
        assert!(!profile.tools_heavy);
        assert_eq!(profile.tools_enabled, vec!["retrieval".to_string()]);
        assert_eq!(profile.max_tokens, HEAVY_TOKEN_FLOOR);
    }

    #[test]
    fn test_light_keeps_most_capability() {
        let mut manager = manager();
        let primary = BrownoutProfile::primary_default();
        let profile = manager.activate(BrownoutLevel::Light);
        assert_eq!(profile.model, primary.model);
        assert_eq!(profile.context_window, primary.context_window / 2);
        assert_eq!(profile.rag_top_k, primary.rag_top_k / 2);
        assert_eq!(profile.tools_enabled, primary.tools_enabled);
        assert!(profile.max_tokens < primary.max_tokens);
    }

    #[test]
    fn test_emergency_reset_forces_heavy() {
        let mut manager = manager();
        let reset = manager.emergency_reset();
        assert_eq!(reset.max_tokens, HEAVY_TOKEN_FLOOR);
        assert_eq!(manager.level(), Some(BrownoutLevel::Heavy));

        // Deactivate still restores primary afterwards
        let restored = manager.deactivate();
        assert_eq!(restored, BrownoutProfile::primary_default());
    }

    #[test]
    fn test_override_bounds_enforced() {
        let mut manager = manager();
        assert!(manager.set_context_window(0).is_err());
        assert!(manager.set_context_window(33).is_err());
        assert!(manager.set_context_window(8).is_ok());
        assert_eq!(manager.current_profile().context_window, 8);

        assert!(manager.set_rag_top_k(0).is_err());
        assert!(manager.set_rag_top_k(21).is_err());
        assert!(manager.set_rag_top_k(4).is_ok());
        assert_eq!(manager.current_profile().rag_top_k, 4);

        assert!(manager.set_model("").is_err());
        assert!(manager.set_model("tiny").is_ok());
        assert_eq!(manager.current_profile().model, "tiny");
    }

    #[tokio::test]
    async fn test_model_switch_notification_sent() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut manager = BrownoutManager::new(BrownoutConfig::default()).with_notifier(tx);

        manager.activate(BrownoutLevel::Moderate);
        let switch = rx.try_recv().unwrap();
        assert_eq!(switch.model, "fallback-small");

        // Re-activating the same level does not change the model, so no
        // second notification is sent
        manager.activate(BrownoutLevel::Moderate);
        assert!(rx.try_recv().is_err());

        manager.deactivate();
        let switch = rx.try_recv().unwrap();
        assert_eq!(switch.model, "primary");
    }

    #[test]
    fn test_config_validation() {
        let mut config = BrownoutConfig::default();
        assert!(config.validate().is_ok());

        config.brownout.context_window = 0;
        assert!(config.validate().is_err());
    }
}
