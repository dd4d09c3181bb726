//! Owns the active job, schedules per-chunk inference on a worker thread,
//! and fans published events out to subscribers with bounded buffering and
//! history replay.
//!
//! Locking follows the job-manager rule for this crate: async locks
//! (`tokio::sync::Mutex`) throughout, never held across an `.await` by
//! anything that isn't itself the thing being awaited. `parking_lot` is not
//! used here; it is reserved for the warmup snapshot and the audio-tool path
//! cache in sibling modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use voicereader_core::error::EngineError;
use voicereader_core::events::{AudioFrame, JobEvent, TextRange};
use voicereader_core::synth_trait::Synthesizer;
use voicereader_core::types::PlaybackSettings;
use voicereader_core::{split_text_into_chunks, ChunkingError};

const SUBSCRIBER_QUEUE_CAPACITY: usize = 128;
const MAX_TRACKED_JOBS: usize = 64;

pub type SubscriptionId = u64;

/// Everything `start_job` needs from the HTTP layer. Validation of
/// `voice_id`/`text`/ranges happens in the HTTP handler before this is
/// constructed; by this point the request is known-good.
#[derive(Debug, Clone)]
pub struct StartJobParams {
    pub voice_id: String,
    pub text: String,
    pub language: Option<String>,
    pub settings: PlaybackSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum JobManagerError {
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
}

/// Handle to a just-started job. Only the id is load-bearing; the HTTP layer
/// builds the `ws_url` response field from it directly.
#[derive(Debug, Clone, Copy)]
pub struct JobHandle {
    pub job_id: Uuid,
}

/// Append-only history plus the live subscriber set, guarded by one lock so
/// that subscribing is atomic with respect to publishing: a subscriber's
/// snapshot is always exactly `history_at_subscribe_time`, and no publish can
/// land between the snapshot and the subscriber being registered.
struct JobLog {
    history: Vec<JobEvent>,
    subscribers: HashMap<SubscriptionId, mpsc::Sender<Option<JobEvent>>>,
    next_subscription_id: SubscriptionId,
}

struct JobEntry {
    job_id: Uuid,
    created_at: DateTime<Utc>,
    cancel: crate::event_flag::AsyncEvent,
    done: crate::event_flag::AsyncEvent,
    log: Mutex<JobLog>,
    next_seq: AtomicU64,
}

impl JobEntry {
    fn new(job_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            created_at,
            cancel: crate::event_flag::AsyncEvent::new(),
            done: crate::event_flag::AsyncEvent::new(),
            log: Mutex::new(JobLog {
                history: Vec::new(),
                subscribers: HashMap::new(),
                next_subscription_id: 0,
            }),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Append `event` to history and deliver it to every subscriber with a
    /// non-blocking send; a subscriber whose queue is full is dropped rather
    /// than allowed to slow the producer. Terminal events also push a `None`
    /// sentinel so subscribers draining the channel observe end-of-stream.
    async fn publish(&self, event: JobEvent) {
        let terminal = event.is_terminal();
        let mut log = self.log.lock().await;
        log.history.push(event.clone());

        let mut dead = Vec::new();
        for (&id, tx) in log.subscribers.iter() {
            if tx.try_send(Some(event.clone())).is_err() {
                dead.push(id);
            }
        }
        for id in &dead {
            log.subscribers.remove(id);
        }

        if terminal {
            for tx in log.subscribers.values() {
                let _ = tx.try_send(None);
            }
        }
    }

    /// Backstop for the invariant "history ends with exactly one terminal
    /// event", for the rare case `run_job`'s future is dropped without
    /// reaching one of its own terminal publishes (external abort, panic).
    /// Runs from a synchronous `Drop`, so it can only take the lock on a
    /// best-effort basis; by the time the guard drops nothing else should
    /// still be holding it.
    fn ensure_terminal_on_drop(&self) {
        let Ok(mut log) = self.log.try_lock() else {
            return;
        };
        let already_terminal = matches!(log.history.last(), Some(e) if e.is_terminal());
        if already_terminal {
            return;
        }
        let event = JobEvent::JobCanceled {
            job_id: self.job_id,
        };
        log.history.push(event.clone());
        let mut dead = Vec::new();
        for (&id, tx) in log.subscribers.iter() {
            if tx.try_send(Some(event.clone())).is_err() {
                dead.push(id);
            }
        }
        for id in &dead {
            log.subscribers.remove(id);
        }
        for tx in log.subscribers.values() {
            let _ = tx.try_send(None);
        }
    }
}

/// Serializes access to the job map and the single active-job pointer.
struct Inner {
    jobs: HashMap<Uuid, Arc<JobEntry>>,
    active_job_id: Option<Uuid>,
}

pub struct JobManager {
    synthesizer: Arc<dyn Synthesizer>,
    inner: Mutex<Inner>,
}

impl JobManager {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                active_job_id: None,
            }),
        }
    }

    /// Whether the process currently has a job whose done signal has not yet
    /// fired. Used by the activate controller to reject reconfiguration
    /// while work is in flight.
    pub async fn has_active_job(&self) -> bool {
        let inner = self.inner.lock().await;
        match inner.active_job_id {
            Some(id) => inner
                .jobs
                .get(&id)
                .map(|entry| !entry.done.is_set())
                .unwrap_or(false),
            None => false,
        }
    }

    /// Cancels any active job (fire-and-forget) and starts a new one. Does
    /// not wait for the prior job to finish: it publishes `JOB_CANCELED` on
    /// its own once the worker notices the cancel flag.
    pub async fn start_job(self: &Arc<Self>, params: StartJobParams) -> JobHandle {
        let job_id = Uuid::new_v4();
        let entry = Arc::new(JobEntry::new(job_id, Utc::now()));

        {
            let mut inner = self.inner.lock().await;
            if let Some(prev_id) = inner.active_job_id {
                if let Some(prev_entry) = inner.jobs.get(&prev_id) {
                    if !prev_entry.done.is_set() {
                        prev_entry.cancel.set();
                    }
                }
            }
            inner.active_job_id = Some(job_id);
            inner.jobs.insert(job_id, entry.clone());
            prune_finished_jobs(&mut inner);
        }

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(entry, params).await;
        });

        JobHandle { job_id }
    }

    /// Idempotent: signals cancellation; returns `false` for an unknown id.
    pub async fn cancel_job(&self, job_id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        match inner.jobs.get(&job_id) {
            Some(entry) => {
                entry.cancel.set();
                true
            }
            None => false,
        }
    }

    /// Registers a new subscriber for `job_id` and returns its id, receive
    /// end and a snapshot of the history published so far. `None` if the job
    /// is unknown (including one that was pruned after finishing).
    pub async fn subscribe(
        &self,
        job_id: Uuid,
    ) -> Option<(SubscriptionId, mpsc::Receiver<Option<JobEvent>>, Vec<JobEvent>)> {
        let entry = {
            let inner = self.inner.lock().await;
            inner.jobs.get(&job_id)?.clone()
        };

        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let mut log = entry.log.lock().await;
        let snapshot = log.history.clone();
        let id = log.next_subscription_id;
        log.next_subscription_id += 1;
        log.subscribers.insert(id, tx);
        Some((id, rx, snapshot))
    }

    /// Removes a subscriber without affecting the job itself (a WebSocket
    /// disconnect unsubscribes but never cancels the job).
    pub async fn unsubscribe(&self, job_id: Uuid, subscription_id: SubscriptionId) {
        let inner = self.inner.lock().await;
        if let Some(entry) = inner.jobs.get(&job_id) {
            entry.log.lock().await.subscribers.remove(&subscription_id);
        }
    }

    async fn run_job(self: Arc<Self>, entry: Arc<JobEntry>, params: StartJobParams) {
        let _finalizer = JobFinalizer {
            manager: self.clone(),
            job_id: entry.job_id,
            entry: entry.clone(),
        };
        let synth = self.synthesizer.clone();

        entry
            .publish(JobEvent::JobStarted {
                job_id: entry.job_id,
            })
            .await;

        let chunks = match split_text_into_chunks(&params.text, params.settings.max_chars) {
            Ok(chunks) => chunks,
            Err(e) => {
                entry
                    .publish(JobEvent::job_error(
                        entry.job_id,
                        format!("chunking failed: {e}"),
                    ))
                    .await;
                return;
            }
        };

        for chunk in chunks {
            if entry.cancel.is_set() {
                entry
                    .publish(JobEvent::JobCanceled {
                        job_id: entry.job_id,
                    })
                    .await;
                return;
            }

            let audio = match synthesize_on_worker_pool(
                synth.clone(),
                chunk.text.clone(),
                params.voice_id.clone(),
                params.language.clone(),
                params.settings,
            )
            .await
            {
                Ok(audio) => audio,
                Err(e) => {
                    entry.publish(JobEvent::job_error(entry.job_id, e.message)).await;
                    return;
                }
            };

            if entry.cancel.is_set() {
                entry
                    .publish(JobEvent::JobCanceled {
                        job_id: entry.job_id,
                    })
                    .await;
                return;
            }

            let processed = voicereader_synth::apply_playback_settings(&audio, &params.settings);

            if entry.cancel.is_set() {
                entry
                    .publish(JobEvent::JobCanceled {
                        job_id: entry.job_id,
                    })
                    .await;
                return;
            }

            let seq = entry.next_seq.fetch_add(1, Ordering::SeqCst);
            entry
                .publish(JobEvent::AudioChunk {
                    job_id: entry.job_id,
                    seq,
                    audio: AudioFrame::pcm_s16le(
                        BASE64.encode(&processed.buffer),
                        processed.sample_rate,
                        processed.channels,
                    ),
                    text_range: TextRange {
                        chunk_index: chunk.chunk_index,
                        start_char: chunk.start_char,
                        end_char: chunk.end_char,
                    },
                })
                .await;

            // Yield so pending publishes reach their subscribers before the
            // next (possibly CPU-heavy) chunk starts.
            tokio::task::yield_now().await;
        }

        if entry.cancel.is_set() {
            entry
                .publish(JobEvent::JobCanceled {
                    job_id: entry.job_id,
                })
                .await;
        } else {
            entry
                .publish(JobEvent::JobDone {
                    job_id: entry.job_id,
                })
                .await;
        }
    }
}

/// Runs `synth.synthesize_chunk` on the blocking thread pool rather than the
/// job's own async task, so a slow CPU/GPU-bound backend never starves other
/// jobs' event plumbing or the HTTP event loop.
async fn synthesize_on_worker_pool(
    synth: Arc<dyn Synthesizer>,
    text: String,
    voice_id: String,
    language: Option<String>,
    settings: PlaybackSettings,
) -> Result<voicereader_core::types::SynthesizedAudio, EngineError> {
    let handle = tokio::runtime::Handle::current();
    let join_result = tokio::task::spawn_blocking(move || {
        handle.block_on(synth.synthesize_chunk(&text, &voice_id, language.as_deref(), &settings))
    })
    .await;

    match join_result {
        Ok(result) => result,
        Err(join_error) => Err(EngineError::new(
            voicereader_core::error::ErrorCode::InvalidRequest,
            format!("synthesis worker thread failed: {join_error}"),
        )),
    }
}

/// Drops finished jobs, oldest-first by `created_at`, once the map exceeds
/// [`MAX_TRACKED_JOBS`]. History for a pruned job is unrecoverable by design.
fn prune_finished_jobs(inner: &mut Inner) {
    if inner.jobs.len() <= MAX_TRACKED_JOBS {
        return;
    }

    let mut finished: Vec<(Uuid, DateTime<Utc>)> = inner
        .jobs
        .iter()
        .filter(|(_, entry)| entry.done.is_set())
        .map(|(id, entry)| (*id, entry.created_at))
        .collect();
    finished.sort_by_key(|(_, created_at)| *created_at);

    let excess = inner.jobs.len() - MAX_TRACKED_JOBS;
    for (id, _) in finished.into_iter().take(excess) {
        inner.jobs.remove(&id);
    }
}

/// Scope guard ensuring the done signal always fires and the active-job
/// pointer is always cleared, however `run_job` exits (normal return, or the
/// future being dropped by an external abort).
struct JobFinalizer {
    manager: Arc<JobManager>,
    job_id: Uuid,
    entry: Arc<JobEntry>,
}

impl Drop for JobFinalizer {
    fn drop(&mut self) {
        self.entry.ensure_terminal_on_drop();
        self.entry.done.set();
        if let Ok(mut inner) = self.manager.inner.try_lock() {
            if inner.active_job_id == Some(self.job_id) {
                inner.active_job_id = None;
            }
        }
    }
}
