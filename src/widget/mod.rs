pub mod session;
pub mod store;

use chrono::Utc;
use log::warn;

use crate::models::chat::{ ChatMessage, Role };
use store::{ StoredTranscript, TranscriptStore };

/// Default retained conversation length, including the system message.
pub const DEFAULT_CAP: usize = 15;
/// Default number of recent turns forwarded to the proxy per request.
pub const DEFAULT_SEND_WINDOW: usize = 8;

/// Owner of the widget-side conversation state. Replaces the module-global
/// `conversationHistory` with a constructed value passed to whoever drives
/// the UI; rendering is left to the embedding host.
pub struct TranscriptManager {
    messages: Vec<ChatMessage>,
    cap: usize,
    send_window: usize,
}

impl TranscriptManager {
    pub fn new(system_prompt: impl Into<String>, cap: usize, send_window: usize) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            // The system message always survives, so a cap below two could
            // never retain a turn.
            cap: cap.max(2),
            send_window: send_window.max(1),
        }
    }

    /// Restore persisted turns. Whatever was stored, the transcript comes
    /// back with the configured system message present and first; stored
    /// system messages are ignored. Returns the persisted welcome flag.
    pub fn load(&mut self, store: &dyn TranscriptStore) -> bool {
        self.messages.truncate(1);

        let Some(stored) = store.load() else {
            return false;
        };
        self.messages.extend(
            stored.messages.into_iter().filter(|m| m.role != Role::System)
        );
        self.truncate();
        stored.welcome_shown
    }

    /// Append one user turn. Whitespace-only input is a no-op.
    pub fn append_user_turn(&mut self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.messages.push(ChatMessage::user(trimmed));
        self.truncate();
        true
    }

    pub fn append_assistant_turn(&mut self, text: &str) {
        self.messages.push(ChatMessage::assistant(text));
        self.truncate();
    }

    /// Evict oldest non-system turns until the cap holds. Index 0 is the
    /// system message and is never evicted.
    fn truncate(&mut self) {
        while self.messages.len() > self.cap {
            self.messages.remove(1);
        }
    }

    /// Conversation slice sent to the proxy: the system message plus the
    /// most recent send-window turns.
    pub fn outbound(&self) -> Vec<ChatMessage> {
        let turns = &self.messages[1..];
        let start = turns.len().saturating_sub(self.send_window);
        let mut out = Vec::with_capacity(turns.len() - start + 1);
        out.push(self.messages[0].clone());
        out.extend_from_slice(&turns[start..]);
        out
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Non-system turns, i.e. what a renderer would display.
    pub fn turns(&self) -> &[ChatMessage] {
        &self.messages[1..]
    }

    fn to_stored(&self, welcome_shown: bool) -> StoredTranscript {
        StoredTranscript {
            messages: self.turns().to_vec(),
            welcome_shown,
            saved_at: Utc::now().timestamp(),
        }
    }

    /// Best-effort persistence: storage failures are logged and swallowed so
    /// a full or broken store never blocks the turn.
    pub fn persist(&self, store: &dyn TranscriptStore, welcome_shown: bool) {
        if let Err(e) = store.save(&self.to_stored(welcome_shown)) {
            warn!("Failed to persist transcript: {}", e);
        }
    }
}
