use crate::completion::CompletionApi;
use crate::conversation::{ConversationBoard, Role, Turn};
use crate::speech::{CaptureOutcome, SpeechBridge};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// The controller's sub-state while a session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

/// Transient state owned by the controller and published to the presentation
/// layer. Not persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerState {
    pub active_session: Option<u32>,
    pub phase: Phase,
    pub status: Option<String>,
}

impl ControllerState {
    pub fn is_listening(&self) -> bool {
        self.phase == Phase::Listening
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.phase, Phase::Processing | Phase::Speaking)
    }
}

/// Per-session data for rendering the board: the original tile badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: u32,
    pub topic: String,
    pub turns: usize,
    pub active: bool,
}

/// Caller precondition violations on the controller API. Completion and
/// speech failures never surface as errors; they are recovered internally
/// and reported through the status text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("no session with id {0}")]
    UnknownSession(u32),
    #[error("no session is active")]
    NoActiveSession,
    #[error("a voice turn is already in progress")]
    Busy,
}

struct Inner {
    board: ConversationBoard,
    state: ControllerState,
    // Cancellation generation. Bumped on every activate/deactivate/cancel;
    // any await that completes under a stale epoch discards its result, so a
    // late capture or reply is never applied to a transcript.
    epoch: u64,
}

/// Orchestrates the conversation board, the completion client, and the
/// speech bridge.
///
/// All session logic runs on one logical thread: the inner mutex guards
/// short critical sections and is never held across an await. The service
/// handles (`CompletionApi`, `SpeechBridge`) are injected at construction,
/// so tests substitute scripted doubles for both.
pub struct SessionController<C, S> {
    completion: Arc<C>,
    speech: Arc<S>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ControllerState>,
}

impl<C, S> SessionController<C, S>
where
    C: CompletionApi + Send + Sync,
    S: SpeechBridge + Send + Sync,
{
    pub fn new(board: ConversationBoard, completion: Arc<C>, speech: Arc<S>) -> Self {
        let (state_tx, _) = watch::channel(ControllerState::default());
        Self {
            completion,
            speech,
            inner: Mutex::new(Inner {
                board,
                state: ControllerState::default(),
                epoch: 0,
            }),
            state_tx,
        }
    }

    /// A snapshot of the current transient state.
    pub fn state(&self) -> ControllerState {
        self.state_tx.borrow().clone()
    }

    /// A receiver notified on every state change, for render loops.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Per-session summaries in board order.
    pub async fn sessions(&self) -> Vec<SessionSummary> {
        let inner = self.inner.lock().await;
        inner
            .board
            .iter()
            .map(|conv| SessionSummary {
                id: conv.id,
                topic: conv.topic.clone(),
                turns: conv.turn_count(),
                active: inner.state.active_session == Some(conv.id),
            })
            .collect()
    }

    /// A clone of a session's transcript, or `None` for an unknown id.
    pub async fn transcript(&self, id: u32) -> Option<Vec<Turn>> {
        let inner = self.inner.lock().await;
        inner.board.get(id).map(|conv| conv.transcript().to_vec())
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }

    /// Makes `id` the active session, deactivating any previous one first
    /// (in-flight capture/playback is cancelled, transient status cleared).
    ///
    /// When the session's transcript is empty, an opening prompt is sent to
    /// the completion endpoint and the reply is appended as an assistant
    /// turn and played back. A completion failure leaves the transcript
    /// empty and sets an error status; re-activating a session with a
    /// non-empty transcript never re-issues the opening prompt.
    pub async fn activate_session(&self, id: u32) -> Result<(), ControllerError> {
        let (topic, needs_opening, epoch) = {
            let mut inner = self.inner.lock().await;
            let session = inner
                .board
                .get(id)
                .ok_or(ControllerError::UnknownSession(id))?;
            let topic = session.topic.clone();
            let needs_opening = session.is_empty();

            inner.epoch += 1;
            self.speech.cancel_capture();
            self.speech.cancel_speech();

            tracing::debug!(session = id, topic = %topic, "Activating session");
            inner.state = ControllerState {
                active_session: Some(id),
                phase: if needs_opening {
                    Phase::Processing
                } else {
                    Phase::Idle
                },
                status: None,
            };
            self.publish(&inner);
            (topic, needs_opening, inner.epoch)
        };

        if !needs_opening {
            return Ok(());
        }

        let prompt =
            format!("Let's start a conversation about {topic}. What would you like to know?");
        let reply = self.completion.request_reply(&prompt, &topic, &[]).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!(session = id, "Discarding stale opening reply");
            return Ok(());
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = id, error = %e, "Opening completion request failed");
                inner.state.phase = Phase::Idle;
                inner.state.status =
                    Some("Sorry, there was an error connecting to the service.".to_string());
                self.publish(&inner);
                return Ok(());
            }
        };

        if let Some(session) = inner.board.get_mut(id) {
            session.append_turn(Role::Assistant, reply.clone());
        }
        inner.state.phase = Phase::Speaking;
        inner.state.status = Some("Speaking...".to_string());
        self.publish(&inner);
        let epoch = inner.epoch;
        drop(inner);

        let playback = self.speech.speak(&reply).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return Ok(());
        }
        match playback {
            Ok(_) => {
                inner.state.phase = Phase::Idle;
                inner.state.status = None;
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "Opening playback failed");
                inner.state.phase = Phase::Idle;
                inner.state.status = Some(format!("Error: {e}"));
            }
        }
        self.publish(&inner);
        Ok(())
    }

    /// Cancels any in-flight capture/playback, clears the active session and
    /// transient status.
    pub async fn deactivate_session(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        self.speech.cancel_capture();
        self.speech.cancel_speech();
        tracing::debug!(session = ?inner.state.active_session, "Deactivating session");
        inner.state = ControllerState::default();
        self.publish(&inner);
    }

    /// Runs one voice turn against the active session: capture an utterance,
    /// append it as a user turn, request a completion with the full
    /// transcript as context, append the reply as an assistant turn, play it
    /// back.
    ///
    /// A failure at any step aborts the remaining steps and sets an error
    /// status; turns already appended remain. In particular the user's turn
    /// is not rolled back when the completion request subsequently fails,
    /// an accepted inconsistency. A capture that resolves to a blank
    /// transcript ends the turn quietly.
    pub async fn trigger_voice_turn(&self) -> Result<(), ControllerError> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.state.active_session.is_none() {
                return Err(ControllerError::NoActiveSession);
            }
            if inner.state.phase != Phase::Idle {
                return Err(ControllerError::Busy);
            }
            inner.state.phase = Phase::Listening;
            inner.state.status = Some("Listening...".to_string());
            self.publish(&inner);
            inner.epoch
        };

        let captured = self.speech.capture_utterance().await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!("Discarding capture result from a cancelled voice turn");
            return Ok(());
        }
        // Any session switch would have bumped the epoch, so the active id
        // is unchanged from when the turn started.
        let id = match inner.state.active_session {
            Some(id) => id,
            None => return Ok(()),
        };

        let utterance = match captured {
            Ok(CaptureOutcome::Utterance(text)) => text,
            Ok(CaptureOutcome::Cancelled) => {
                inner.state.phase = Phase::Idle;
                inner.state.status = None;
                self.publish(&inner);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "Speech capture failed");
                inner.state.phase = Phase::Idle;
                inner.state.status = Some(format!("Error: {e}"));
                self.publish(&inner);
                return Ok(());
            }
        };

        let utterance = utterance.trim();
        if utterance.is_empty() {
            inner.state.phase = Phase::Idle;
            inner.state.status = None;
            self.publish(&inner);
            return Ok(());
        }
        tracing::info!(session = id, "User said: \"{utterance}\"");

        // The context deliberately includes the just-appended user turn; the
        // request then carries the user message last as well, matching the
        // wire layout the endpoint is prompted with.
        let (topic, context) = match inner.board.get_mut(id) {
            Some(session) => {
                session.append_turn(Role::User, utterance);
                (session.topic.clone(), session.context())
            }
            None => return Ok(()),
        };
        inner.state.phase = Phase::Processing;
        inner.state.status = Some("Processing your message...".to_string());
        self.publish(&inner);
        let epoch = inner.epoch;
        drop(inner);

        let reply = self
            .completion
            .request_reply(utterance, &topic, &context)
            .await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!("Discarding completion reply from a cancelled voice turn");
            return Ok(());
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = id, error = %e, "Completion request failed");
                inner.state.phase = Phase::Idle;
                inner.state.status = Some(format!("Error: {e}"));
                self.publish(&inner);
                return Ok(());
            }
        };

        tracing::info!(session = id, "Assistant replied: \"{reply}\"");
        if let Some(session) = inner.board.get_mut(id) {
            session.append_turn(Role::Assistant, reply.clone());
        }
        inner.state.phase = Phase::Speaking;
        inner.state.status = Some("Speaking...".to_string());
        self.publish(&inner);
        let epoch = inner.epoch;
        drop(inner);

        let playback = self.speech.speak(&reply).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return Ok(());
        }
        match playback {
            Ok(_) => {
                inner.state.phase = Phase::Idle;
                inner.state.status = None;
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "Playback failed");
                inner.state.phase = Phase::Idle;
                inner.state.status = Some(format!("Error: {e}"));
            }
        }
        self.publish(&inner);
        Ok(())
    }

    /// Cancels any in-flight capture/playback and returns the phase to idle.
    /// The active session is unchanged.
    pub async fn cancel_voice_turn(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        self.speech.cancel_capture();
        self.speech.cancel_speech();
        inner.state.phase = Phase::Idle;
        inner.state.status = None;
        self.publish(&inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, MockCompletionApi};
    use crate::speech::{MockSpeechBridge, PlaybackOutcome, SpeechError};
    use tokio::sync::Notify;

    fn board() -> ConversationBoard {
        ConversationBoard::from_topics(["Travel Planning", "Recipe Ideas"])
    }

    // Most tests don't care about cancel calls; allow any number of them.
    fn permissive_speech() -> MockSpeechBridge {
        let mut speech = MockSpeechBridge::new();
        speech.expect_cancel_capture().return_const(());
        speech.expect_cancel_speech().return_const(());
        speech
    }

    #[tokio::test]
    async fn test_activate_empty_session_seeds_opening_turn() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .withf(|message, topic, context| {
                message == "Let's start a conversation about Travel Planning. \
                            What would you like to know?"
                    && topic == "Travel Planning"
                    && context.is_empty()
            })
            .returning(|_, _, _| Box::pin(async { Ok("Hello!".to_string()) }))
            .once();

        let mut speech = permissive_speech();
        speech
            .expect_speak()
            .withf(|text| text == "Hello!")
            .returning(|_| Box::pin(async { Ok(PlaybackOutcome::Completed) }))
            .once();

        let controller =
            SessionController::new(board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();

        let transcript = controller.transcript(1).await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::Assistant);
        assert_eq!(transcript[0].content, "Hello!");

        let state = controller.state();
        assert_eq!(state.active_session, Some(1));
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.status, None);
    }

    #[tokio::test]
    async fn test_reactivation_does_not_reissue_opening_prompt() {
        let mut completion = MockCompletionApi::new();
        // Exactly one opening request across both activations.
        completion
            .expect_request_reply()
            .returning(|_, _, _| Box::pin(async { Ok("Hello!".to_string()) }))
            .once();

        let mut speech = permissive_speech();
        speech
            .expect_speak()
            .returning(|_| Box::pin(async { Ok(PlaybackOutcome::Completed) }))
            .once();

        let controller =
            SessionController::new(board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();
        controller.activate_session(1).await.unwrap();

        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
        assert_eq!(controller.state().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_activate_unknown_session_fails() {
        let controller = SessionController::new(
            board(),
            Arc::new(MockCompletionApi::new()),
            Arc::new(permissive_speech()),
        );

        let result = controller.activate_session(99).await;
        assert_eq!(result, Err(ControllerError::UnknownSession(99)));
        assert_eq!(controller.state().active_session, None);
    }

    #[tokio::test]
    async fn test_opening_failure_leaves_transcript_empty() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .returning(|_, _, _| {
                Box::pin(async {
                    Err(CompletionError::Transport(
                        "API call failed: 500 Internal Server Error".to_string(),
                    ))
                })
            })
            .once();

        // No playback may happen on a failed opening.
        let speech = permissive_speech();

        let controller =
            SessionController::new(board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();

        assert!(controller.transcript(1).await.unwrap().is_empty());
        let state = controller.state();
        assert_eq!(state.active_session, Some(1));
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(
            state.status.as_deref(),
            Some("Sorry, there was an error connecting to the service.")
        );
    }

    // Seeds session 1 so activation takes the non-empty path and the test
    // can focus on the voice turn itself.
    fn seeded_board() -> ConversationBoard {
        let mut board = board();
        board
            .get_mut(1)
            .unwrap()
            .append_turn(Role::Assistant, "Hi there!");
        board
    }

    #[tokio::test]
    async fn test_voice_turn_appends_user_then_assistant() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .withf(|message, topic, context| {
                message == "What's the weather?"
                    && topic == "Travel Planning"
                    // Context covers the full transcript so far, ending with
                    // the just-captured user turn.
                    && context.len() == 2
                    && context[0].role == Role::Assistant
                    && context[0].content == "Hi there!"
                    && context[1].role == Role::User
                    && context[1].content == "What's the weather?"
            })
            .returning(|_, _, _| Box::pin(async { Ok("It's sunny.".to_string()) }))
            .once();

        let mut speech = permissive_speech();
        speech
            .expect_capture_utterance()
            .returning(|| {
                Box::pin(async { Ok(CaptureOutcome::Utterance("What's the weather?".to_string())) })
            })
            .once();
        speech
            .expect_speak()
            .withf(|text| text == "It's sunny.")
            .returning(|_| Box::pin(async { Ok(PlaybackOutcome::Completed) }))
            .once();

        let controller =
            SessionController::new(seeded_board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();
        controller.trigger_voice_turn().await.unwrap();

        let transcript = controller.transcript(1).await.unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[1].content, "What's the weather?");
        assert_eq!(transcript[2].role, Role::Assistant);
        assert_eq!(transcript[2].content, "It's sunny.");

        let state = controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.status, None);
        assert!(!state.is_processing());
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_user_turn() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .returning(|_, _, _| {
                Box::pin(async {
                    Err(CompletionError::Transport(
                        "API call failed: 503 Service Unavailable".to_string(),
                    ))
                })
            })
            .once();

        let mut speech = permissive_speech();
        speech
            .expect_capture_utterance()
            .returning(|| {
                Box::pin(async { Ok(CaptureOutcome::Utterance("What's the weather?".to_string())) })
            })
            .once();
        // No speak expectation: playback must not run after a failed request.

        let controller =
            SessionController::new(seeded_board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();
        controller.trigger_voice_turn().await.unwrap();

        // The user's turn stays; no assistant turn is appended.
        let transcript = controller.transcript(1).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[1].content, "What's the weather?");

        let state = controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.status.as_deref().unwrap_or("").starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_capture_error_sets_status_and_appends_nothing() {
        let mut speech = permissive_speech();
        speech
            .expect_capture_utterance()
            .returning(|| {
                Box::pin(async { Err(SpeechError::Recognition("no-speech".to_string())) })
            })
            .once();

        let controller = SessionController::new(
            seeded_board(),
            Arc::new(MockCompletionApi::new()),
            Arc::new(speech),
        );
        controller.activate_session(1).await.unwrap();
        controller.trigger_voice_turn().await.unwrap();

        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
        let state = controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.status.as_deref().unwrap_or("").contains("no-speech"));
    }

    #[tokio::test]
    async fn test_blank_capture_ends_turn_quietly() {
        let mut speech = permissive_speech();
        speech
            .expect_capture_utterance()
            .returning(|| Box::pin(async { Ok(CaptureOutcome::Utterance("   ".to_string())) }))
            .once();

        let controller = SessionController::new(
            seeded_board(),
            Arc::new(MockCompletionApi::new()),
            Arc::new(speech),
        );
        controller.activate_session(1).await.unwrap();
        controller.trigger_voice_turn().await.unwrap();

        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
        let state = controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.status, None);
    }

    #[tokio::test]
    async fn test_playback_failure_keeps_both_turns() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .returning(|_, _, _| Box::pin(async { Ok("It's sunny.".to_string()) }))
            .once();

        let mut speech = permissive_speech();
        speech
            .expect_capture_utterance()
            .returning(|| {
                Box::pin(async { Ok(CaptureOutcome::Utterance("What's the weather?".to_string())) })
            })
            .once();
        speech
            .expect_speak()
            .returning(|_| {
                Box::pin(async { Err(SpeechError::Playback("synthesis-failed".to_string())) })
            })
            .once();

        let controller =
            SessionController::new(seeded_board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();
        controller.trigger_voice_turn().await.unwrap();

        let transcript = controller.transcript(1).await.unwrap();
        assert_eq!(transcript.len(), 3);
        let state = controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(
            state
                .status
                .as_deref()
                .unwrap_or("")
                .contains("synthesis-failed")
        );
    }

    #[tokio::test]
    async fn test_trigger_without_active_session_fails() {
        let controller = SessionController::new(
            board(),
            Arc::new(MockCompletionApi::new()),
            Arc::new(permissive_speech()),
        );

        let result = controller.trigger_voice_turn().await;
        assert_eq!(result, Err(ControllerError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_trigger_while_listening_is_busy_and_cancel_discards_late_result() {
        let gate = Arc::new(Notify::new());

        let mut speech = permissive_speech();
        let capture_gate = gate.clone();
        speech
            .expect_capture_utterance()
            .returning(move || {
                let gate = capture_gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(CaptureOutcome::Utterance("late arrival".to_string()))
                })
            })
            .once();
        // No completion expectation: the discarded capture must not reach
        // the endpoint.

        let controller = Arc::new(SessionController::new(
            seeded_board(),
            Arc::new(MockCompletionApi::new()),
            Arc::new(speech),
        ));
        controller.activate_session(1).await.unwrap();

        let mut state_rx = controller.subscribe();
        let trigger = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.trigger_voice_turn().await })
        };
        while !state_rx.borrow().is_listening() {
            state_rx.changed().await.unwrap();
        }

        // Single-flight: a second trigger while listening is refused.
        assert_eq!(
            controller.trigger_voice_turn().await,
            Err(ControllerError::Busy)
        );

        // Cancel, then let the pending capture resolve. Its result is stale
        // and must not touch the transcript.
        controller.cancel_voice_turn().await;
        gate.notify_one();
        trigger.await.unwrap().unwrap();

        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
        let state = controller.state();
        assert_eq!(state.active_session, Some(1));
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.status, None);
    }

    #[tokio::test]
    async fn test_switching_session_discards_late_capture() {
        let gate = Arc::new(Notify::new());

        let mut speech = permissive_speech();
        let capture_gate = gate.clone();
        speech
            .expect_capture_utterance()
            .returning(move || {
                let gate = capture_gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(CaptureOutcome::Utterance("late arrival".to_string()))
                })
            })
            .once();

        // Both sessions seeded so no activation issues an opening prompt.
        let mut board = seeded_board();
        board
            .get_mut(2)
            .unwrap()
            .append_turn(Role::Assistant, "Welcome back!");

        let controller = Arc::new(SessionController::new(
            board,
            Arc::new(MockCompletionApi::new()),
            Arc::new(speech),
        ));
        controller.activate_session(1).await.unwrap();

        let mut state_rx = controller.subscribe();
        let trigger = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.trigger_voice_turn().await })
        };
        while !state_rx.borrow().is_listening() {
            state_rx.changed().await.unwrap();
        }

        // Switch sessions while the capture is pending.
        controller.activate_session(2).await.unwrap();
        assert!(!controller.state().is_listening());

        // The capture now resolves under a stale epoch; the now-inactive
        // session's transcript must not change.
        gate.notify_one();
        trigger.await.unwrap().unwrap();

        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
        assert_eq!(controller.transcript(2).await.unwrap().len(), 1);
        let state = controller.state();
        assert_eq!(state.active_session, Some(2));
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_deactivate_clears_state() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .returning(|_, _, _| Box::pin(async { Ok("Hello!".to_string()) }))
            .once();
        let mut speech = permissive_speech();
        speech
            .expect_speak()
            .returning(|_| Box::pin(async { Ok(PlaybackOutcome::Completed) }))
            .once();

        let controller =
            SessionController::new(board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();
        controller.deactivate_session().await;

        let state = controller.state();
        assert_eq!(state.active_session, None);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.status, None);

        // The transcript survives deactivation.
        assert_eq!(controller.transcript(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_reports_turn_counts_and_active_flag() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_request_reply()
            .returning(|_, _, _| Box::pin(async { Ok("Hello!".to_string()) }))
            .once();
        let mut speech = permissive_speech();
        speech
            .expect_speak()
            .returning(|_| Box::pin(async { Ok(PlaybackOutcome::Completed) }))
            .once();

        let controller =
            SessionController::new(board(), Arc::new(completion), Arc::new(speech));
        controller.activate_session(1).await.unwrap();

        let summaries = controller.sessions().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 1);
        assert_eq!(summaries[0].topic, "Travel Planning");
        assert_eq!(summaries[0].turns, 1);
        assert!(summaries[0].active);
        assert_eq!(summaries[1].turns, 0);
        assert!(!summaries[1].active);
    }
}
