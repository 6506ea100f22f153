//! Scaling policy and replica bounds.

use std::time::Duration;

use crate::config::ScalingConfig;

use super::autoscaler::ScalingError;

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Scale to the specified replica count.
    ScaleTo(u32),
    /// No change needed.
    NoChange,
}

/// Declarative policy consumed by the autoscaler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_utilization: f64,
    pub tolerance: f64,
    pub max_step: u32,
    pub sync_interval: Duration,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
}

impl ScalingPolicy {
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            min_replicas: config.min_replicas,
            max_replicas: config.max_replicas,
            target_utilization: config.target_utilization,
            tolerance: config.tolerance,
            max_step: config.max_step.max(1),
            sync_interval: Duration::from_secs(config.sync_interval_secs),
            scale_up_cooldown: Duration::from_secs(config.scale_up_cooldown_secs),
            scale_down_cooldown: Duration::from_secs(config.scale_down_cooldown_secs),
        }
    }

    /// Replica count the policy wants for `utilization` at `current` replicas,
    /// ignoring cooldowns.
    ///
    /// Within `tolerance` of the target the count is left alone. Otherwise the
    /// count moves toward `ceil(current * observed / target)`, clamped to the
    /// bounds and to at most `max_step` replicas away from `current`.
    pub fn desired_replicas(&self, current: u32, utilization: f64) -> u32 {
        let ratio = utilization / self.target_utilization;
        if (ratio - 1.0).abs() <= self.tolerance {
            return current;
        }

        let proposed = (current as f64 * ratio).ceil();
        let proposed = if proposed.is_finite() {
            proposed.clamp(0.0, u32::MAX as f64) as u32
        } else {
            self.max_replicas
        };
        let bounded = proposed.clamp(self.min_replicas, self.max_replicas);

        if bounded > current {
            bounded.min(current.saturating_add(self.max_step))
        } else {
            bounded.max(current.saturating_sub(self.max_step))
        }
    }
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::from_config(&ScalingConfig::default())
    }
}

/// Replica pool state. Invariant: `min <= current <= max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSet {
    current: u32,
    min: u32,
    max: u32,
    target_utilization: f64,
}

impl ReplicaSet {
    /// Pool starting at `initial`, clamped into the policy bounds.
    pub fn new(policy: &ScalingPolicy, initial: u32) -> Self {
        Self {
            current: initial.clamp(policy.min_replicas, policy.max_replicas),
            min: policy.min_replicas,
            max: policy.max_replicas,
            target_utilization: policy.target_utilization,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    pub fn target_utilization(&self) -> f64 {
        self.target_utilization
    }

    pub(crate) fn set(&mut self, replicas: u32) -> Result<(), ScalingError> {
        if replicas < self.min || replicas > self.max {
            return Err(ScalingError::OutOfBounds {
                requested: replicas,
                min: self.min,
                max: self.max,
            });
        }
        self.current = replicas;
        Ok(())
    }
}
