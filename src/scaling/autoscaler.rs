//! Utilization-driven replica scaling.
//!
//! Samples the average CPU utilization across replicas, compares it against
//! the policy target and asks a callback to resize the pool. The replica
//! state changes only after the callback reports success.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::policy::{ReplicaSet, ScaleDecision, ScalingPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ScalingError {
    #[error("utilization sample unavailable: {0}")]
    Sample(String),

    #[error("invalid utilization {0}")]
    InvalidSample(f64),

    #[error("replica count {requested} outside [{min}, {max}]")]
    OutOfBounds { requested: u32, min: u32, max: u32 },

    #[error("scaling action failed: {0}")]
    Action(String),
}

/// Average utilization across the pool, as a fraction of requested CPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilizationSample {
    pub average: f64,
}

impl UtilizationSample {
    pub fn new(average: f64) -> Self {
        Self { average }
    }
}

/// Supplier of pool utilization, typically the platform's metrics API.
pub trait UtilizationSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = Result<UtilizationSample, ScalingError>> + Send;
}

pub type ScaleFuture = Pin<Box<dyn Future<Output = Result<(), ScalingError>> + Send>>;

/// Performs the resize. Called with the target replica count.
pub type ScaleCallback = Box<dyn Fn(u32) -> ScaleFuture + Send + Sync>;

pub struct Autoscaler<S> {
    policy: ScalingPolicy,
    replicas: ReplicaSet,
    source: S,
    scale_fn: Option<ScaleCallback>,
    last_scale: Option<Instant>,
}

impl<S: UtilizationSource> Autoscaler<S> {
    /// Autoscaler whose pool starts at `min_replicas`.
    pub fn new(policy: ScalingPolicy, source: S) -> Self {
        let replicas = ReplicaSet::new(&policy, policy.min_replicas);
        Self {
            policy,
            replicas,
            source,
            scale_fn: None,
            last_scale: None,
        }
    }

    /// Start from an existing pool size.
    pub fn with_initial_replicas(mut self, initial: u32) -> Self {
        self.replicas = ReplicaSet::new(&self.policy, initial);
        self
    }

    /// Set the callback used to perform scaling.
    pub fn with_scale_fn(mut self, f: ScaleCallback) -> Self {
        self.scale_fn = Some(f);
        self
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Decide what to do with `sample` at time `now`. Does not change state.
    pub fn evaluate(&self, sample: UtilizationSample, now: Instant) -> ScaleDecision {
        let current = self.replicas.current();
        let desired = self.policy.desired_replicas(current, sample.average);

        if desired == current {
            return ScaleDecision::NoChange;
        }

        let cooldown = if desired > current {
            self.policy.scale_up_cooldown
        } else {
            self.policy.scale_down_cooldown
        };
        if let Some(last) = self.last_scale {
            if now.saturating_duration_since(last) < cooldown {
                debug!(
                    current,
                    desired,
                    utilization = sample.average,
                    "scaling suppressed by cooldown"
                );
                return ScaleDecision::NoChange;
            }
        }

        ScaleDecision::ScaleTo(desired)
    }

    /// Sample, evaluate and apply one scaling step.
    pub async fn tick(&mut self, now: Instant) -> Result<ScaleDecision, ScalingError> {
        let sample = self.source.sample().await?;
        if !sample.average.is_finite() || sample.average < 0.0 {
            return Err(ScalingError::InvalidSample(sample.average));
        }

        let decision = self.evaluate(sample, now);
        if let ScaleDecision::ScaleTo(target) = decision {
            if let Some(scale_fn) = &self.scale_fn {
                scale_fn(target).await?;
            }
            let from = self.replicas.current();
            self.replicas.set(target)?;
            self.last_scale = Some(now);
            info!(
                from,
                to = target,
                utilization = sample.average,
                target_utilization = self.policy.target_utilization,
                "scaled replica pool"
            );
        }
        Ok(decision)
    }

    /// Run the autoscaler loop until shutdown.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.policy.sync_interval.as_secs(),
            min = self.policy.min_replicas,
            max = self.policy.max_replicas,
            "autoscaler started"
        );

        let mut ticker = tokio::time::interval(self.policy.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Instant::now()).await {
                        warn!(
                            error = %e,
                            replicas = self.replicas.current(),
                            "autoscaler tick failed"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
