//! Reality observer: concurrent multi-perspective observation rounds.
//!
//! Each round spawns one named thread per perspective. Every thread receives
//! its perspective index by value and reports exactly one `Observation` over a
//! per-round channel; an `ObservationRound` owns the receiving end and joins.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, RecvError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::belief::BeliefModel;
use crate::cancel::CancelSignal;
use crate::descriptor::{DescriptorDistance, StructuralDistance};
use crate::error::{ExecutionError, ValidationError, VantageResult};
use crate::target::{Perspective, StateProvider};

use super::gaps::{find_capability_gaps, find_gaps, CapabilityGap, Gap};
use super::observation::Observation;
use super::snapshot::{MergeRule, RealitySnapshot};

/// Observer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Perspectives per round.
    pub perspectives: usize,
    /// Per-round timeout in milliseconds. `None` waits for every perspective.
    pub round_timeout_ms: Option<u64>,
    /// How long outstanding perspectives may still report after cancellation.
    pub cancel_grace_ms: u64,
    /// Per-subsystem resolution rule.
    pub merge_rule: MergeRule,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            perspectives: 4,
            round_timeout_ms: None,
            cancel_grace_ms: 100,
            merge_rule: MergeRule::Consensus,
        }
    }
}

impl ObserverConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.perspectives == 0 {
            return Err(ValidationError::ZeroPerspectives);
        }
        if self.round_timeout_ms == Some(0) {
            return Err(ValidationError::InvalidConfig {
                reason: "round_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Round timeout as a `Duration`.
    #[must_use]
    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }

    /// Cancellation grace period as a `Duration`.
    #[must_use]
    pub const fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Observes the target from several perspectives and derives gaps.
#[derive(Clone)]
pub struct RealityObserver {
    provider: Arc<dyn StateProvider>,
    distance: Arc<dyn DescriptorDistance>,
    config: ObserverConfig,
}

impl std::fmt::Debug for RealityObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealityObserver").field("config", &self.config).finish_non_exhaustive()
    }
}

impl RealityObserver {
    /// Create an observer with the default `StructuralDistance`.
    pub fn new(provider: Arc<dyn StateProvider>, config: ObserverConfig) -> VantageResult<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            distance: Arc::new(StructuralDistance),
            config,
        })
    }

    /// Replace the severity distance function.
    #[must_use]
    pub fn with_distance(mut self, distance: Arc<dyn DescriptorDistance>) -> Self {
        self.distance = distance;
        self
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// The underlying state provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn StateProvider> {
        &self.provider
    }

    /// Run one round with the configured perspective count.
    pub fn map_reality(&self) -> VantageResult<RealitySnapshot> {
        self.map_reality_with(self.config.perspectives, &CancelSignal::never())
    }

    /// Run one round with `perspectives` tasks, honouring `cancel`.
    ///
    /// # Errors
    /// - `ZeroPerspectives` if `perspectives == 0`
    /// - `ObservationUnavailable` if every perspective degraded
    /// - `Cancelled` if `cancel` fired before the round completed
    pub fn map_reality_with(&self, perspectives: usize, cancel: &CancelSignal) -> VantageResult<RealitySnapshot> {
        if perspectives == 0 {
            return Err(ValidationError::ZeroPerspectives.into());
        }

        let deadline = self.config.round_timeout().map(|t| Instant::now() + t);
        let round = ObservationRound::launch(&self.provider, perspectives);
        let observations = round.collect(deadline, cancel, self.config.cancel_grace())?;

        let snapshot = RealitySnapshot::merge(observations, self.config.merge_rule)?;
        info!(
            perspectives,
            captured = snapshot.perspectives().len(),
            degraded = snapshot.degraded().len(),
            subsystems = snapshot.state().len(),
            fingerprint = %snapshot.fingerprint(),
            "reality round merged"
        );
        Ok(snapshot)
    }

    /// Gaps between `snapshot` and `beliefs` using this observer's distance.
    #[must_use]
    pub fn find_gaps(&self, snapshot: &RealitySnapshot, beliefs: &BeliefModel) -> Vec<Gap> {
        find_gaps(snapshot, beliefs, self.distance.as_ref())
    }

    /// Capabilities gained or lost against the declared set in `beliefs`.
    #[must_use]
    pub fn find_capability_gaps(&self, snapshot: &RealitySnapshot, beliefs: &BeliefModel) -> Vec<CapabilityGap> {
        find_capability_gaps(snapshot, beliefs)
    }
}

fn observe(provider: &dyn StateProvider, perspective: Perspective) -> Observation {
    match provider.read_state(perspective) {
        Ok(reading) => Observation::captured(perspective, reading),
        Err(err) => {
            warn!(%perspective, error = %err, "perspective degraded");
            Observation::unavailable(perspective, err.to_string())
        }
    }
}

enum Step {
    Reported(Result<Observation, RecvError>),
    TimedOut,
    Cancelled,
}

/// Join point for the tasks of one round.
struct ObservationRound {
    rx: Receiver<Observation>,
    expected: usize,
    collected: BTreeMap<Perspective, Observation>,
}

impl ObservationRound {
    fn launch(provider: &Arc<dyn StateProvider>, perspectives: usize) -> Self {
        // Capacity == task count: late reporters never block, even once abandoned.
        let (tx, rx) = bounded::<Observation>(perspectives);
        let mut collected = BTreeMap::new();

        for idx in 0..perspectives {
            let perspective = Perspective::new(idx);
            let tx = tx.clone();
            let provider = Arc::clone(provider);
            let spawned = thread::Builder::new()
                .name(format!("vantage-observer-{idx}"))
                .spawn(move || {
                    let _ = tx.send(observe(provider.as_ref(), perspective));
                });
            if let Err(err) = spawned {
                warn!(%perspective, error = %err, "failed to spawn observer task");
                collected.insert(perspective, Observation::unavailable(perspective, format!("spawn failed: {err}")));
            }
        }

        Self {
            rx,
            expected: perspectives,
            collected,
        }
    }

    fn collect(
        mut self,
        deadline: Option<Instant>,
        cancel: &CancelSignal,
        grace: Duration,
    ) -> Result<Vec<Observation>, ExecutionError> {
        while self.collected.len() < self.expected {
            if cancel.is_cancelled() {
                return Err(self.abandon(grace));
            }

            let step = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    select! {
                        recv(self.rx) -> msg => Step::Reported(msg),
                        recv(cancel.receiver()) -> _ => Step::Cancelled,
                        default(remaining) => Step::TimedOut,
                    }
                }
                None => select! {
                    recv(self.rx) -> msg => Step::Reported(msg),
                    recv(cancel.receiver()) -> _ => Step::Cancelled,
                },
            };

            match step {
                Step::Reported(Ok(obs)) => {
                    self.collected.entry(obs.perspective()).or_insert(obs);
                }
                Step::Reported(Err(_)) => {
                    // Every sender is gone: remaining tasks died without reporting.
                    self.fill_missing("observer task exited without reporting");
                }
                Step::TimedOut => {
                    warn!(
                        outstanding = self.expected - self.collected.len(),
                        "observation round timed out"
                    );
                    self.fill_missing("round timed out");
                }
                Step::Cancelled => return Err(self.abandon(grace)),
            }
        }

        Ok(self.collected.into_values().collect())
    }

    fn fill_missing(&mut self, reason: &str) {
        for idx in 0..self.expected {
            let perspective = Perspective::new(idx);
            self.collected
                .entry(perspective)
                .or_insert_with(|| Observation::unavailable(perspective, reason));
        }
    }

    // Give outstanding tasks a bounded grace period, then detach them.
    fn abandon(mut self, grace: Duration) -> ExecutionError {
        let grace_deadline = Instant::now() + grace;
        while self.collected.len() < self.expected {
            match self.rx.recv_deadline(grace_deadline) {
                Ok(obs) => {
                    self.collected.entry(obs.perspective()).or_insert(obs);
                }
                Err(_) => break,
            }
        }
        debug!(
            abandoned = self.expected - self.collected.len(),
            "observation round cancelled"
        );
        ExecutionError::Cancelled
    }
}
