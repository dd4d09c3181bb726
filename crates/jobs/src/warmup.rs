//! The warmup state machine: a single shared status plus an in-flight guard
//! that lets a second caller either piggyback on a running warmup or walk
//! away immediately.

use std::sync::Arc;

use chrono::Utc;
use voicereader_core::synth_trait::Synthesizer;
use voicereader_core::types::{WarmupState, WarmupStatusValue};

/// Cheap to clone: both fields are `Arc`s, so the controller survives model
/// activation even though its *state* is reset on every activation.
#[derive(Clone)]
pub struct WarmupController {
    state: Arc<parking_lot::Mutex<WarmupState>>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

pub struct TriggerOutcome {
    pub accepted: bool,
    pub state: WarmupState,
}

impl WarmupController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(parking_lot::Mutex::new(WarmupState::default())),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> WarmupState {
        self.state.lock().clone()
    }

    /// Called on activation: clears runs/status back to `not_started`.
    pub fn reset(&self) {
        *self.state.lock() = WarmupState::default();
    }

    /// Blocks until any currently in-flight warmup run finishes, without
    /// starting a new one. A no-op if nothing is running.
    pub async fn await_in_flight(&self) {
        let _ = self.run_lock.lock().await;
    }

    /// `wait`: block until this call's own warmup run (or, if one was
    /// already in flight, that run) completes before returning.
    /// `force`: start even if the status is already `ready`/`running`
    /// (running is still deduplicated - see below).
    pub async fn trigger(
        &self,
        synthesizer: Arc<dyn Synthesizer>,
        text: String,
        language: Option<String>,
        wait: bool,
        force: bool,
        reason: Option<String>,
    ) -> TriggerOutcome {
        let owned_guard = match Arc::clone(&self.run_lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                if wait {
                    self.await_in_flight().await;
                }
                return TriggerOutcome {
                    accepted: false,
                    state: self.snapshot(),
                };
            }
        };

        let should_start = {
            let state = self.state.lock();
            force
                || matches!(
                    state.status,
                    WarmupStatusValue::NotStarted | WarmupStatusValue::Error
                )
        };

        if !should_start {
            drop(owned_guard);
            return TriggerOutcome {
                accepted: false,
                state: self.snapshot(),
            };
        }

        let started_at = Utc::now();
        {
            let mut state = self.state.lock();
            state.status = WarmupStatusValue::Running;
            state.runs += 1;
            state.last_reason = reason;
            state.last_started_at = Some(started_at);
        }

        let state_for_task = self.state.clone();
        let task = tokio::spawn(async move {
            let _guard = owned_guard;
            let result = synthesizer.warmup(&text, language.as_deref()).await;
            let completed_at = Utc::now();
            let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

            let mut state = state_for_task.lock();
            state.last_completed_at = Some(completed_at);
            state.last_duration_ms = Some(duration_ms);
            match result {
                Ok(()) => {
                    state.status = WarmupStatusValue::Ready;
                    state.last_error = None;
                }
                Err(e) => {
                    state.status = WarmupStatusValue::Error;
                    state.last_error = Some(e.message);
                }
            }
        });

        if wait {
            let _ = task.await;
        }

        TriggerOutcome {
            accepted: true,
            state: self.snapshot(),
        }
    }
}

impl Default for WarmupController {
    fn default() -> Self {
        Self::new()
    }
}
