//! Audit options and license tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// License level gating validation and monthly audit volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    /// Audits allowed per calendar month (`None` = unlimited)
    pub fn monthly_limit(self) -> Option<u32> {
        match self {
            Tier::Free => Some(5),
            Tier::Pro => Some(100),
            Tier::Enterprise => None,
        }
    }

    /// Whether the three-cycle validation protocol is included
    pub fn includes_validation(self) -> bool {
        !matches!(self, Tier::Free)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!(
                "unknown tier '{}' (expected free, pro or enterprise)",
                other
            )),
        }
    }
}

/// Caller-supplied options for one audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Free-text domain context handed to the verification phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub validation_enabled: bool,
    pub tier: Tier,
    pub verbose: bool,
}

impl AuditOptions {
    /// Options with validation gated by the tier
    pub fn for_tier(tier: Tier) -> Self {
        Self {
            context: None,
            validation_enabled: tier.includes_validation(),
            tier,
            verbose: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    /// Turn validation off regardless of tier. Validation can never be turned
    /// on for a tier that does not include it.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled && self.tier.includes_validation();
        self
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self::for_tier(Tier::Free)
    }
}
