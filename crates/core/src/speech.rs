use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Fixed locale for both capture and playback.
pub const SPEECH_LOCALE: &str = "en-US";

/// How a capture attempt ended when the recognizer itself did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// One final transcript was produced.
    Utterance(String),
    /// Cancellation stopped the capture before a transcript was produced.
    /// Callers must treat this as "no result" and apply nothing.
    Cancelled,
}

/// How a playback attempt ended when synthesis itself did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// The underlying recognition reported an error; carries the platform
    /// error code.
    #[error("speech recognition failed: {0}")]
    Recognition(String),
    /// Speech synthesis failed.
    #[error("speech playback failed: {0}")]
    Playback(String),
}

// The `SpeechBridge` trait abstracts the platform speech service behind two
// independent capabilities, capture and playback. Each is its own
// `{idle, active}` state machine: `idle -> active` on start, `active -> idle`
// on completion, error, or cancellation.
//
// Cancellation is cooperative and best-effort. `cancel_capture` and
// `cancel_speech` request the active operation stop but do not resolve its
// pending future themselves; the operation reports `Cancelled` when it
// notices. The controller enforces single-flight: at most one capture and one
// playback are active process-wide, so implementations may assume no
// overlapping starts.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechBridge {
    /// Begins a single-shot, non-continuous capture in the fixed locale and
    /// suspends until one final transcript is produced, the capture is
    /// cancelled, or recognition fails.
    async fn capture_utterance(&self) -> Result<CaptureOutcome, SpeechError>;

    /// Requests the active capture (if any) stop. No-op when none is active.
    fn cancel_capture(&self);

    /// Begins playback of `text` in the fixed locale and suspends until
    /// playback ends normally, is cancelled, or fails.
    async fn speak(&self, text: &str) -> Result<PlaybackOutcome, SpeechError>;

    /// Immediately stops any in-progress playback. No-op when none is active.
    fn cancel_speech(&self);
}
