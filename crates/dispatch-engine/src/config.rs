//! Dispatch tuning read from the environment.

use dispatch_geo::DEFAULT_MAX_DISTANCE_MILES;
use std::str::FromStr;

/// Knobs for candidate selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Contractors offered the job per round.
    pub contractors_per_round: usize,
    /// Candidates farther than this are never offered the job.
    pub max_distance_miles: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            contractors_per_round: 3,
            max_distance_miles: DEFAULT_MAX_DISTANCE_MILES,
        }
    }
}

impl DispatchConfig {
    /// Reads `DISPATCH_CONTRACTORS_PER_ROUND` and `DISPATCH_MAX_DISTANCE_MILES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            contractors_per_round: env_or(
                "DISPATCH_CONTRACTORS_PER_ROUND",
                defaults.contractors_per_round,
            ),
            max_distance_miles: env_or("DISPATCH_MAX_DISTANCE_MILES", defaults.max_distance_miles),
        }
    }
}

/// Parse `name` from the environment, falling back (with a warning) on bad values.
pub fn env_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, default = %default, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
