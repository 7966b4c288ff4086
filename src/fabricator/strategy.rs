//! Fabrication strategies and subsystem rules.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::belief::SubsystemId;
use crate::error::ValidationError;
use crate::reality::GapKind;

/// How a gap is turned into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One read-only probe per gap.
    #[default]
    ConfirmOnly,
    /// One corrective primitive per gap.
    Remediate,
    /// A probe followed by a corrective primitive.
    ConfirmAndRemediate,
}

impl Strategy {
    /// Whether the strategy emits a probe.
    #[must_use]
    pub const fn probes(self) -> bool {
        matches!(self, Self::ConfirmOnly | Self::ConfirmAndRemediate)
    }

    /// Whether the strategy emits a corrective primitive.
    #[must_use]
    pub const fn remediates(self) -> bool {
        matches!(self, Self::Remediate | Self::ConfirmAndRemediate)
    }

    /// Whether a corrective primitive can be built for `kind`.
    ///
    /// An `Unexpected` gap has no believed state to move toward.
    #[must_use]
    pub const fn can_remediate(kind: GapKind) -> bool {
        matches!(kind, GapKind::Drift | GapKind::Missing)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmOnly => write!(f, "confirm_only"),
            Self::Remediate => write!(f, "remediate"),
            Self::ConfirmAndRemediate => write!(f, "confirm_and_remediate"),
        }
    }
}

/// Overrides the strategy for subsystems whose id matches `pattern`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRule {
    pub pattern: String,
    pub strategy: Strategy,
}

/// Compiled default strategy plus ordered rules (first match wins).
#[derive(Debug, Clone)]
pub(crate) struct StrategyTable {
    default: Strategy,
    rules: Vec<(Regex, Strategy)>,
}

impl StrategyTable {
    pub(crate) fn compile(default: Strategy, rules: &[StrategyRule]) -> Result<Self, ValidationError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.strategy))
                    .map_err(|e| ValidationError::InvalidStrategyRule {
                        pattern: rule.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { default, rules })
    }

    pub(crate) fn strategy_for(&self, subsystem: &SubsystemId) -> Strategy {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(subsystem.as_str()))
            .map_or(self.default, |(_, s)| *s)
    }
}
