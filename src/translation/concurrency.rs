/*!
 * Service-specific concurrency profiles.
 *
 * This module provides the starting concurrency settings and the hard bounds
 * for each supported service, based on characteristics such as rate limits,
 * typical response times, and whether the service runs locally.
 */

use serde::{Deserialize, Serialize};

use crate::app_config::ServiceKind;

/// Dispatch parameters read by the work pool and the rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum number of in-flight requests
    pub max_concurrent: usize,
    /// Forced delay before each dispatch, in milliseconds
    pub rate_limit_interval_ms: u64,
    /// Multiplier applied to the interval when the service degrades
    pub backoff_factor: f64,
    /// Period of the independent health check, in milliseconds
    pub health_check_interval_ms: u64,
}

impl ConcurrencyConfig {
    /// Clamp the adjustable fields into the given bounds
    pub fn clamped(mut self, bounds: &ConcurrencyBounds) -> Self {
        self.max_concurrent = self
            .max_concurrent
            .clamp(bounds.min_concurrent, bounds.max_concurrent);
        self.rate_limit_interval_ms = self
            .rate_limit_interval_ms
            .clamp(bounds.min_interval_ms, bounds.max_interval_ms);
        self
    }
}

/// Inclusive bounds the adaptive manager may never leave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyBounds {
    pub min_concurrent: usize,
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl ConcurrencyBounds {
    /// Check whether a config lies within these bounds
    pub fn contains(&self, config: &ConcurrencyConfig) -> bool {
        (self.min_concurrent..=self.max_concurrent).contains(&config.max_concurrent)
            && (self.min_interval_ms..=self.max_interval_ms)
                .contains(&config.rate_limit_interval_ms)
    }
}

/// Service-specific profile with tuned defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProfile {
    /// Configuration the manager starts from and resets to
    pub base: ConcurrencyConfig,
    /// Hard limits for every adjustment
    pub bounds: ConcurrencyBounds,
    /// Vendor quota: requests allowed per window (None for local services)
    pub requests_per_window: Option<usize>,
    /// Length of the quota window in milliseconds
    pub window_ms: u64,
}

impl ServiceProfile {
    /// Get the profile for a given service
    pub fn for_service(service: ServiceKind) -> Self {
        match service {
            ServiceKind::Ollama => Self {
                // Local, can handle high concurrency, no quota
                base: config(4, 50),
                bounds: bounds(1, 8, 25, 2_000),
                requests_per_window: None,
                window_ms: 60_000,
            },
            ServiceKind::OpenAI => Self {
                base: config(4, 200),
                bounds: bounds(1, 10, 50, 5_000),
                requests_per_window: Some(60),
                window_ms: 60_000,
            },
            ServiceKind::Anthropic => Self {
                // 45 per minute keeps a margin under the 50 rpm tier
                base: config(3, 300),
                bounds: bounds(1, 5, 100, 6_000),
                requests_per_window: Some(45),
                window_ms: 60_000,
            },
            ServiceKind::LMStudio => Self {
                base: config(3, 50),
                bounds: bounds(1, 6, 25, 2_000),
                requests_per_window: None,
                window_ms: 60_000,
            },
            ServiceKind::DeepL => Self {
                base: config(3, 250),
                bounds: bounds(1, 6, 100, 5_000),
                requests_per_window: Some(50),
                window_ms: 60_000,
            },
            ServiceKind::Google => Self {
                base: config(5, 100),
                bounds: bounds(1, 10, 50, 3_000),
                requests_per_window: Some(100),
                window_ms: 60_000,
            },
        }
    }
}

fn config(max_concurrent: usize, rate_limit_interval_ms: u64) -> ConcurrencyConfig {
    ConcurrencyConfig {
        max_concurrent,
        rate_limit_interval_ms,
        backoff_factor: 1.3,
        health_check_interval_ms: 10_000,
    }
}

fn bounds(
    min_concurrent: usize,
    max_concurrent: usize,
    min_interval_ms: u64,
    max_interval_ms: u64,
) -> ConcurrencyBounds {
    ConcurrencyBounds {
        min_concurrent,
        max_concurrent,
        min_interval_ms,
        max_interval_ms,
    }
}
