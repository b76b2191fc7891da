use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The author of a [`Turn`]. The system instruction sent with each completion
/// request is synthesized per request and never stored in a transcript, so it
/// has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message exchanged within a session. The timestamp is set at append
/// time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A role/content pair with the timestamp stripped, in the shape the
/// completion endpoint expects as conversational context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// One topic-scoped conversation and its accumulated transcript.
///
/// The transcript is append-only during normal operation: turns are added in
/// chronological order and never removed except through [`Conversation::clear`].
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: u32,
    pub topic: String,
    transcript: Vec<Turn>,
}

impl Conversation {
    pub fn new(id: u32, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
            transcript: Vec::new(),
        }
    }

    /// Appends a turn stamped with the current time. Mutates only the
    /// transcript; cannot fail.
    pub fn append_turn(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(Turn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Projects the transcript, stripped of timestamps, in transcript order.
    /// This is the context sent along with completion requests.
    pub fn context(&self) -> Vec<ChatTurn> {
        self.transcript
            .iter()
            .map(|turn| ChatTurn {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    /// Resets the transcript to empty. Idempotent.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    pub fn turn_count(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }
}

/// The fixed set of sessions, keyed by id, created once at startup with
/// predefined topics. No sessions are added or removed at runtime.
#[derive(Debug)]
pub struct ConversationBoard {
    sessions: Vec<Conversation>,
}

impl ConversationBoard {
    /// Builds the board from an ordered list of topics, assigning ids 1..=n
    /// in order.
    pub fn from_topics<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let sessions = topics
            .into_iter()
            .enumerate()
            .map(|(i, topic)| Conversation::new(i as u32 + 1, topic))
            .collect();
        Self { sessions }
    }

    pub fn get(&self, id: u32) -> Option<&Conversation> {
        self.sessions.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Conversation> {
        self.sessions.iter_mut().find(|c| c.id == id)
    }

    /// Iterates sessions in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
