//! Job event frames, as published by the job worker and replayed verbatim to
//! WebSocket subscribers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `text_range` on an `AUDIO_CHUNK` event: correlates the emitted audio with
/// the source text offsets the chunker produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRange {
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// The `audio` object embedded in an `AUDIO_CHUNK` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFrame {
    pub format: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub data_base64: String,
}

impl AudioFrame {
    pub fn pcm_s16le(data_base64: String, sample_rate: u32, channels: u16) -> Self {
        Self {
            format: "pcm_s16le",
            sample_rate,
            channels,
            data_base64,
        }
    }
}

/// Every event a job can publish. Serializes with an internally-tagged
/// `type` field matching the wire frames in the spec verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JobEvent {
    #[serde(rename = "JOB_STARTED")]
    JobStarted { job_id: Uuid },
    #[serde(rename = "AUDIO_CHUNK")]
    AudioChunk {
        job_id: Uuid,
        seq: u64,
        audio: AudioFrame,
        text_range: TextRange,
    },
    #[serde(rename = "JOB_DONE")]
    JobDone { job_id: Uuid },
    #[serde(rename = "JOB_CANCELED")]
    JobCanceled { job_id: Uuid },
    #[serde(rename = "JOB_ERROR")]
    JobError {
        job_id: Uuid,
        error: JobErrorDetail,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// `JOB_ERROR` always carries the fixed code `INFERENCE_FAILED`, which is not
/// one of the HTTP [`ErrorCode`](crate::error::ErrorCode) values — it is only
/// ever observed on the WebSocket, never as an HTTP response.
pub const INFERENCE_FAILED_CODE: &str = "INFERENCE_FAILED";

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::JobStarted { job_id }
            | JobEvent::AudioChunk { job_id, .. }
            | JobEvent::JobDone { job_id }
            | JobEvent::JobCanceled { job_id }
            | JobEvent::JobError { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobDone { .. } | JobEvent::JobCanceled { .. } | JobEvent::JobError { .. }
        )
    }

    pub fn job_error(job_id: Uuid, message: impl Into<String>) -> Self {
        JobEvent::JobError {
            job_id,
            error: JobErrorDetail {
                code: INFERENCE_FAILED_CODE.to_string(),
                message: message.into(),
                details: serde_json::json!({}),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification_matches_spec() {
        let id = Uuid::new_v4();
        assert!(!JobEvent::JobStarted { job_id: id }.is_terminal());
        assert!(JobEvent::JobDone { job_id: id }.is_terminal());
        assert!(JobEvent::JobCanceled { job_id: id }.is_terminal());
        assert!(JobEvent::job_error(id, "boom").is_terminal());
    }

    #[test]
    fn audio_chunk_serializes_with_tagged_type() {
        let id = Uuid::new_v4();
        let event = JobEvent::AudioChunk {
            job_id: id,
            seq: 1,
            audio: AudioFrame::pcm_s16le("AAAA".into(), 24_000, 1),
            text_range: TextRange {
                chunk_index: 0,
                start_char: 0,
                end_char: 5,
            },
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "AUDIO_CHUNK");
        assert_eq!(v["seq"], 1);
        assert_eq!(v["audio"]["format"], "pcm_s16le");
    }
}
