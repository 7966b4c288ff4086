//! Primitive fabrication.
//!
//! Turns an ordered list of gaps into self-contained primitives. The
//! fabricator holds only its compiled configuration, so the same gaps always
//! yield the same primitives with the same ids.

mod primitive;
mod strategy;

pub use primitive::{Primitive, PrimitiveAction, PrimitiveId};
pub use strategy::{Strategy, StrategyRule};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::belief::SubsystemId;
use crate::error::{ExecutionError, ValidationError, VantageResult};
use crate::reality::{Gap, GapKind, Severity};

use strategy::StrategyTable;

/// Fabricator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricatorConfig {
    /// Strategy for subsystems no rule matches.
    pub default_strategy: Strategy,
    /// Ordered overrides; the first matching pattern wins.
    pub rules: Vec<StrategyRule>,
    /// Primitives from gaps at or above this severity are critical.
    pub critical_severity: Option<f64>,
}

impl FabricatorConfig {
    /// Validate the configuration without building a fabricator.
    ///
    /// # Errors
    /// Returns a `ValidationError` for an invalid rule or threshold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(threshold) = self.critical_severity {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("critical_severity must be within [0, 1], got {threshold}"),
                });
            }
        }
        StrategyTable::compile(self.default_strategy, &self.rules).map(|_| ())
    }
}

/// A gap the fabricator could not fully serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FabricationWarning {
    /// The strategy needs an action the gap kind does not support.
    UnsupportedGapKind {
        #[allow(missing_docs)]
        subsystem: SubsystemId,
        #[allow(missing_docs)]
        kind: GapKind,
        #[allow(missing_docs)]
        strategy: Strategy,
    },
}

impl FabricationWarning {
    /// The matching execution error.
    #[must_use]
    pub fn to_error(&self) -> ExecutionError {
        match self {
            Self::UnsupportedGapKind { subsystem, kind, strategy } => ExecutionError::UnsupportedGapKind {
                subsystem: subsystem.to_string(),
                kind: kind.to_string(),
                strategy: strategy.to_string(),
            },
        }
    }
}

impl fmt::Display for FabricationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// Output of one fabrication pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fabrication {
    /// Primitives in source-gap order.
    pub primitives: Vec<Primitive>,
    /// Gaps skipped wholly or partly.
    pub warnings: Vec<FabricationWarning>,
}

/// Stateless gap-to-primitive translator.
#[derive(Debug, Clone)]
pub struct Fabricator {
    table: StrategyTable,
    critical_severity: Option<Severity>,
}

impl Fabricator {
    /// Compile the configuration.
    ///
    /// # Errors
    /// Returns a validation error if a rule pattern does not compile or the
    /// critical threshold is out of range.
    pub fn new(config: &FabricatorConfig) -> VantageResult<Self> {
        config.validate()?;
        let table = StrategyTable::compile(config.default_strategy, &config.rules)?;
        Ok(Self {
            table,
            critical_severity: config.critical_severity.map(Severity::new),
        })
    }

    /// Strategy selected for `subsystem`.
    #[must_use]
    pub fn strategy_for(&self, subsystem: &SubsystemId) -> Strategy {
        self.table.strategy_for(subsystem)
    }

    /// Translate `gaps` into primitives.
    #[must_use]
    pub fn fabricate(&self, gaps: &[Gap]) -> Fabrication {
        let mut out = Fabrication::default();

        for (ordinal, gap) in gaps.iter().enumerate() {
            let strategy = self.strategy_for(&gap.subsystem);
            let unsupported = strategy.remediates() && !Strategy::can_remediate(gap.kind);

            if unsupported {
                warn!(
                    subsystem = %gap.subsystem,
                    kind = %gap.kind,
                    strategy = %strategy,
                    "gap kind has no corrective primitive"
                );
                out.warnings.push(FabricationWarning::UnsupportedGapKind {
                    subsystem: gap.subsystem.clone(),
                    kind: gap.kind,
                    strategy,
                });
                if !strategy.probes() {
                    continue;
                }
            }

            let mut step = 0;
            if strategy.probes() {
                out.primitives.push(self.build(
                    ordinal,
                    step,
                    gap,
                    PrimitiveAction::Probe { expect: gap.observed.clone() },
                ));
                step += 1;
            }
            if strategy.remediates() && !unsupported {
                if let Some(target) = gap.expected.clone() {
                    out.primitives.push(self.build(ordinal, step, gap, PrimitiveAction::Apply { target }));
                }
            }
        }

        out
    }

    fn build(&self, ordinal: usize, step: usize, gap: &Gap, action: PrimitiveAction) -> Primitive {
        Primitive {
            id: PrimitiveId::derive(ordinal, &gap.subsystem, action.name(), step),
            subsystem: gap.subsystem.clone(),
            action,
            gap_kind: gap.kind,
            severity: gap.severity,
            expected: gap.expected.clone(),
            observed: gap.observed.clone(),
            critical: self.critical_severity.is_some_and(|t| gap.severity >= t),
        }
    }
}
