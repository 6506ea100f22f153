//! Replica pool autoscaling contract.
//!
//! # Data Flow
//! ```text
//! UtilizationSource ──sample──▶ Autoscaler::evaluate ──ScaleTo(n)──▶ ScaleCallback
//!                                   │                                  │ ok
//!                                   └── ScalingPolicy (bounds, step,   ▼
//!                                       tolerance, cooldowns)      ReplicaSet
//! ```
//!
//! # Design Decisions
//! - The replica process never scales itself; this models the external
//!   controller so pool behavior can be exercised in tests and `iris-cli`
//! - Decisions take an explicit clock so cooldowns are testable

pub mod autoscaler;
pub mod policy;

pub use autoscaler::{
    Autoscaler, ScaleCallback, ScaleFuture, ScalingError, UtilizationSample, UtilizationSource,
};
pub use policy::{ReplicaSet, ScaleDecision, ScalingPolicy};
