use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tiletalk_core::speech::{CaptureOutcome, PlaybackOutcome, SpeechBridge, SpeechError};
use tokio::sync::{Notify, oneshot};

/// Playback pacing: roughly how long speaking one word takes.
const MS_PER_WORD: u64 = 320;

/// A terminal stand-in for the platform speech service.
///
/// Capture resolves with the next stdin line routed to it via
/// [`ConsoleSpeech::push_line`], standing in for a final recognition result.
/// Playback prints the text and paces itself by word count, so an
/// in-progress playback is observable and cancellable.
///
/// The capture state machine is the slot: `Some` while a capture is active,
/// `None` when idle. [`ConsoleSpeech::is_capturing`] exposes it so the
/// terminal loop can route stdin lines either to the capture or to command
/// handling.
pub struct ConsoleSpeech {
    capture_slot: Mutex<Option<oneshot::Sender<String>>>,
    playback_cancel: Notify,
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self {
            capture_slot: Mutex::new(None),
            playback_cancel: Notify::new(),
        }
    }

    // Recover the guard even if a previous holder panicked; the slot itself
    // stays valid.
    fn slot(&self) -> MutexGuard<'_, Option<oneshot::Sender<String>>> {
        self.capture_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_capturing(&self) -> bool {
        self.slot().is_some()
    }

    /// Routes a line of input to the pending capture. Returns `true` when a
    /// capture consumed the line, `false` when none was active (the caller
    /// should treat the line as a command instead).
    pub fn push_line(&self, line: String) -> bool {
        if let Some(tx) = self.slot().take() {
            // The send only fails if the capture future was already dropped;
            // the line is consumed either way.
            let _ = tx.send(line);
            true
        } else {
            false
        }
    }
}

impl Default for ConsoleSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechBridge for ConsoleSpeech {
    async fn capture_utterance(&self) -> Result<CaptureOutcome, SpeechError> {
        let rx = {
            let mut slot = self.slot();
            if slot.is_some() {
                return Err(SpeechError::Recognition(
                    "a capture is already active".to_string(),
                ));
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            rx
        };

        println!("(listening - type your message and press Enter)");
        match rx.await {
            Ok(line) => Ok(CaptureOutcome::Utterance(line)),
            // The sender was dropped by `cancel_capture` before a line
            // arrived.
            Err(_) => Ok(CaptureOutcome::Cancelled),
        }
    }

    fn cancel_capture(&self) {
        // Dropping the sender resolves the pending capture as cancelled.
        // No-op when no capture is active.
        drop(self.slot().take());
    }

    async fn speak(&self, text: &str) -> Result<PlaybackOutcome, SpeechError> {
        println!("[assistant] {text}");
        let words = text.split_whitespace().count().max(1) as u64;
        let duration = Duration::from_millis(words * MS_PER_WORD);

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(PlaybackOutcome::Completed),
            _ = self.playback_cancel.notified() => Ok(PlaybackOutcome::Cancelled),
        }
    }

    fn cancel_speech(&self) {
        // notify_waiters wakes only a playback that is actually in progress,
        // so cancelling while idle leaves no stale permit behind.
        self.playback_cancel.notify_waiters();
    }
}
