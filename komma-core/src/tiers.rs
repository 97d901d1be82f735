//! Capability tiers and the assistant settings they map to.

use serde::{Deserialize, Serialize};

use crate::types::Tier;

/// Turn cap applied to chat tasks unless the tier is uncapped.
pub const CHAT_MAX_TURNS: u32 = 3;

/// Assistant settings for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierProfile {
    pub model: String,
    /// `None` means no turn cap.
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Empty means unrestricted.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl TierProfile {
    /// The profile to use for a chat task: same model, turns capped at
    /// [`CHAT_MAX_TURNS`] unless this profile is uncapped.
    pub fn for_chat(&self) -> Self {
        let mut p = self.clone();
        if let Some(turns) = p.max_turns {
            p.max_turns = Some(turns.min(CHAT_MAX_TURNS));
        }
        p
    }
}

/// Profile for each [`Tier`]. Any table missing from the config file keeps its
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub fast: TierProfile,
    pub default: TierProfile,
    pub max: TierProfile,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            fast: TierProfile {
                model: "haiku".to_owned(),
                max_turns: Some(5),
                allowed_tools: vec!["Read".to_owned(), "Edit".to_owned(), "Write".to_owned()],
            },
            default: TierProfile {
                model: "sonnet".to_owned(),
                max_turns: Some(15),
                allowed_tools: Vec::new(),
            },
            max: TierProfile {
                model: "opus".to_owned(),
                max_turns: None,
                allowed_tools: Vec::new(),
            },
        }
    }
}

impl TierTable {
    pub fn profile(&self, tier: Tier) -> &TierProfile {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Default => &self.default,
            Tier::Max => &self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_caps_turns_except_uncapped_tier() {
        let table = TierTable::default();
        assert_eq!(table.profile(Tier::Fast).for_chat().max_turns, Some(3));
        assert_eq!(table.profile(Tier::Default).for_chat().max_turns, Some(3));
        assert_eq!(table.profile(Tier::Max).for_chat().max_turns, None);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let table: TierTable = toml::from_str(
            r#"
            [max]
            model = "opus-large"
            "#,
        )
        .unwrap();
        assert_eq!(table.max.model, "opus-large");
        assert_eq!(table.max.max_turns, None);
        assert_eq!(table.fast.model, "haiku");
    }
}
