/*!
 * Adaptive concurrency management.
 *
 * The manager keeps a rolling history of performance samples, classifies the
 * recent ones into a `NetworkCondition` and moves the service's
 * `ConcurrencyConfig` up or down inside the profile bounds. Adjustments on the
 * sample path are rate limited by a cooldown; the periodic health check only
 * reacts to critical conditions and ignores the cooldown.
 */

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::app_config::{AdaptiveTuning, ServiceKind};

use super::concurrency::{ConcurrencyConfig, ServiceProfile};

/// Error rate above which the service is considered critical
const CRITICAL_ERROR_RATE: f64 = 0.30;
/// Error rate above which the service is considered poor
const POOR_ERROR_RATE: f64 = 0.15;
/// Response time above which the service is considered poor, in milliseconds
const POOR_RESPONSE_MS: f64 = 3000.0;
const EXCELLENT_RESPONSE_MS: f64 = 500.0;
const EXCELLENT_ERROR_RATE: f64 = 0.02;
const GOOD_RESPONSE_MS: f64 = 1500.0;
const GOOD_ERROR_RATE: f64 = 0.05;
/// A good service only gains a slot when it is this fast
const GOOD_SCALE_UP_RESPONSE_MS: f64 = 300.0;
/// Interval multiplier applied on excellent conditions
const EXCELLENT_INTERVAL_FACTOR: f64 = 0.9;

/// One observation of the service's behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub response_time_ms: f64,
    /// Failure ratio in [0, 1]
    pub error_rate: f64,
    /// Completions per second
    pub throughput: f64,
    pub success_rate: f64,
    pub queue_depth: usize,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl PerformanceSample {
    /// Create a sample taken now; the success rate is the complement of the error rate
    pub fn new(response_time_ms: f64, error_rate: f64, throughput: f64, queue_depth: usize) -> Self {
        let error_rate = error_rate.clamp(0.0, 1.0);
        Self {
            response_time_ms,
            error_rate,
            throughput,
            success_rate: 1.0 - error_rate,
            queue_depth,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Classification of recent service behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkCondition {
    Excellent,
    Good,
    Normal,
    Poor,
    Critical,
}

impl NetworkCondition {
    /// Classify averaged error rate and response time
    ///
    /// The rules are checked from the most severe down, so a degraded service
    /// is never reported as good.
    pub fn classify(avg_error_rate: f64, avg_response_ms: f64) -> Self {
        if avg_error_rate > CRITICAL_ERROR_RATE {
            Self::Critical
        } else if avg_error_rate > POOR_ERROR_RATE || avg_response_ms > POOR_RESPONSE_MS {
            Self::Poor
        } else if avg_response_ms < EXCELLENT_RESPONSE_MS && avg_error_rate < EXCELLENT_ERROR_RATE {
            Self::Excellent
        } else if avg_response_ms < GOOD_RESPONSE_MS || avg_error_rate <= GOOD_ERROR_RATE {
            Self::Good
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for NetworkCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Normal => "normal",
            Self::Poor => "poor",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// A configuration change applied by the manager
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub condition: NetworkCondition,
    pub previous: ConcurrencyConfig,
    pub current: ConcurrencyConfig,
}

struct ManagerState {
    config: ConcurrencyConfig,
    history: VecDeque<PerformanceSample>,
    last_adjustment: Option<Instant>,
    emergency: bool,
}

/// Averages over the evaluation window
struct WindowSummary {
    avg_response_ms: f64,
    avg_error_rate: f64,
}

/// Adaptive concurrency manager for one service
pub struct AdaptiveConcurrencyManager {
    service: ServiceKind,
    profile: ServiceProfile,
    tuning: AdaptiveTuning,
    state: Mutex<ManagerState>,
}

impl AdaptiveConcurrencyManager {
    /// Create a manager starting from the service's base profile
    pub fn new(service: ServiceKind, tuning: AdaptiveTuning) -> Self {
        let profile = ServiceProfile::for_service(service);
        let config = profile.base.clone().clamped(&profile.bounds);

        Self {
            service,
            profile,
            state: Mutex::new(ManagerState {
                config,
                history: VecDeque::with_capacity(tuning.history_size),
                last_adjustment: None,
                emergency: false,
            }),
            tuning,
        }
    }

    /// Create a manager with default tuning
    pub fn for_service(service: ServiceKind) -> Self {
        Self::new(service, AdaptiveTuning::default())
    }

    /// Record a sample and adjust the configuration if the cooldown allows
    pub fn record_metrics(&self, sample: PerformanceSample) -> Option<Adjustment> {
        let mut state = self.state.lock();

        state.history.push_back(sample);
        while state.history.len() > self.tuning.history_size.max(1) {
            state.history.pop_front();
        }

        let summary = self.summarize(&state.history)?;

        if let Some(last) = state.last_adjustment {
            if last.elapsed() < Duration::from_millis(self.tuning.cooldown_ms) {
                return None;
            }
        }

        let condition = NetworkCondition::classify(summary.avg_error_rate, summary.avg_response_ms);
        self.adjust(&mut state, condition, summary.avg_response_ms)
    }

    /// Check for a critical condition, ignoring the cooldown
    ///
    /// A critical service snaps to emergency settings immediately. Other
    /// conditions only end emergency mode; recovery of the settings happens
    /// through the regular sample path.
    pub fn health_check(&self) -> Option<Adjustment> {
        let mut state = self.state.lock();
        let summary = self.summarize(&state.history)?;
        let condition = NetworkCondition::classify(summary.avg_error_rate, summary.avg_response_ms);

        if condition == NetworkCondition::Critical {
            return self.adjust(&mut state, condition, summary.avg_response_ms);
        }

        if state.emergency {
            state.emergency = false;
            info!("{} recovered from emergency mode ({})", self.service, condition);
        }
        None
    }

    /// Run `health_check` every `health_check_interval_ms` until the manager is dropped
    pub fn spawn_health_check(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let period = match weak.upgrade() {
                    Some(manager) => manager.current_config().health_check_interval_ms,
                    None => break,
                };
                tokio::time::sleep(Duration::from_millis(period.max(1))).await;

                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Some(adjustment) = manager.health_check() {
                    debug!("Health check applied {:?}", adjustment.current);
                }
            }
        })
    }

    /// Configuration to use for the next dispatches
    pub fn current_config(&self) -> ConcurrencyConfig {
        self.state.lock().config.clone()
    }

    /// Classification of the current evaluation window
    ///
    /// Returns `Normal` until enough samples have been recorded.
    pub fn evaluate_condition(&self) -> NetworkCondition {
        let state = self.state.lock();
        match self.summarize(&state.history) {
            Some(summary) => NetworkCondition::classify(summary.avg_error_rate, summary.avg_response_ms),
            None => NetworkCondition::Normal,
        }
    }

    /// Whether the manager is holding emergency settings
    pub fn is_emergency(&self) -> bool {
        self.state.lock().emergency
    }

    /// Restore the base configuration and forget all samples
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.config = self.profile.base.clone().clamped(&self.profile.bounds);
        state.history.clear();
        state.last_adjustment = None;
        state.emergency = false;
        info!("Concurrency for {} reset to base profile", self.service);
    }

    /// Number of samples in the rolling history
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    fn summarize(&self, history: &VecDeque<PerformanceSample>) -> Option<WindowSummary> {
        let window = self.tuning.evaluation_window.max(1);
        let recent: Vec<&PerformanceSample> = history.iter().rev().take(window).collect();

        if recent.is_empty() || recent.len() < self.tuning.min_samples {
            return None;
        }

        let count = recent.len() as f64;
        Some(WindowSummary {
            avg_response_ms: recent.iter().map(|s| s.response_time_ms).sum::<f64>() / count,
            avg_error_rate: recent.iter().map(|s| s.error_rate).sum::<f64>() / count,
        })
    }

    /// Compute and apply the target for `condition`, if it clears the dead-band
    fn adjust(
        &self,
        state: &mut ManagerState,
        condition: NetworkCondition,
        avg_response_ms: f64,
    ) -> Option<Adjustment> {
        let previous = state.config.clone();
        let target = self.target_for(&previous, condition, avg_response_ms);

        if condition == NetworkCondition::Critical && !state.emergency {
            state.emergency = true;
            warn!(
                "{} entered emergency mode: concurrency {}, interval {}ms",
                self.service, target.max_concurrent, target.rate_limit_interval_ms
            );
        } else if condition != NetworkCondition::Critical && state.emergency {
            state.emergency = false;
            info!("{} recovered from emergency mode ({})", self.service, condition);
        }

        let concurrency_changed = target.max_concurrent != previous.max_concurrent;
        let interval_delta = target
            .rate_limit_interval_ms
            .abs_diff(previous.rate_limit_interval_ms);
        let interval_changed = interval_delta > 0
            && (interval_delta >= self.tuning.interval_dead_band_ms
                || condition == NetworkCondition::Critical);

        if !concurrency_changed && !interval_changed {
            return None;
        }

        state.config = target.clone();
        state.last_adjustment = Some(Instant::now());

        info!(
            "Adjusted {} concurrency ({}): {} -> {} requests, {}ms -> {}ms interval",
            self.service,
            condition,
            previous.max_concurrent,
            target.max_concurrent,
            previous.rate_limit_interval_ms,
            target.rate_limit_interval_ms
        );

        Some(Adjustment {
            condition,
            previous,
            current: target,
        })
    }

    fn target_for(
        &self,
        current: &ConcurrencyConfig,
        condition: NetworkCondition,
        avg_response_ms: f64,
    ) -> ConcurrencyConfig {
        let bounds = &self.profile.bounds;
        let mut target = current.clone();

        match condition {
            NetworkCondition::Excellent => {
                target.max_concurrent += 1;
                target.rate_limit_interval_ms =
                    (current.rate_limit_interval_ms as f64 * EXCELLENT_INTERVAL_FACTOR).round() as u64;
            }
            NetworkCondition::Good => {
                if avg_response_ms < GOOD_SCALE_UP_RESPONSE_MS {
                    target.max_concurrent += 1;
                }
            }
            NetworkCondition::Normal => {}
            NetworkCondition::Poor => {
                target.max_concurrent = current.max_concurrent.saturating_sub(1);
                target.rate_limit_interval_ms =
                    (current.rate_limit_interval_ms as f64 * current.backoff_factor).round() as u64;
            }
            NetworkCondition::Critical => {
                target.max_concurrent = bounds.min_concurrent;
                target.rate_limit_interval_ms = bounds.max_interval_ms;
            }
        }

        target.clamped(bounds)
    }
}

impl fmt::Debug for AdaptiveConcurrencyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdaptiveConcurrencyManager")
            .field("service", &self.service)
            .field("config", &state.config)
            .field("samples", &state.history.len())
            .field("emergency", &state.emergency)
            .finish()
    }
}
