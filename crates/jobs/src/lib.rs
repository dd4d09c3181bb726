//! The job manager, warmup controller and hot-swappable runtime bundle.

mod event_flag;
mod manager;
mod runtime;
mod warmup;

pub use event_flag::AsyncEvent;
pub use manager::{JobHandle, JobManager, JobManagerError, StartJobParams, SubscriptionId};
pub use runtime::{activate_model, Activation, ActivateError, ActivateRequest, Runtime};
pub use warmup::{TriggerOutcome, WarmupController};
