use std::time::Duration;

use log::{ info, warn };

use super::{ DEFAULT_CAP, DEFAULT_SEND_WINDOW, TranscriptManager };
use super::store::TranscriptStore;
use crate::config::persona::PersonaConfig;
use crate::models::chat::{ ChatReply, ChatRequest };

/// Client ceiling stays at or below the proxy's own upstream ceiling so the
/// widget gives up first.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Full URL of the chat proxy endpoint.
    pub endpoint: String,
    pub cap: usize,
    pub send_window: usize,
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            cap: DEFAULT_CAP,
            send_window: DEFAULT_SEND_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TurnState {
    Idle,
    AwaitingResponse,
}

/// Resolution of one `send_turn` call, for the embedding host to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The proxy answered; the text is already appended to the transcript.
    Replied(String),
    /// The turn failed; a synthesized assistant message was appended instead.
    Fallback(String),
    /// Blank input, nothing happened.
    Ignored,
    /// A turn is already outstanding; the input was dropped.
    Busy,
}

enum TurnFailure {
    Timeout,
    Misconfigured,
    Unavailable,
}

impl TurnFailure {
    /// Static, safe fallback copy with an alternate contact channel. The raw
    /// error never reaches the transcript.
    fn fallback(&self) -> &'static str {
        match self {
            TurnFailure::Timeout =>
                "思考超时，您的问题可能比较复杂。请简化问题或直接添加微信 Jr_gyh 详聊。",
            TurnFailure::Misconfigured => "服务配置错误，请联系管理员。",
            TurnFailure::Unavailable =>
                "服务暂时繁忙，请稍后再试。紧急问题可联系邮箱 1850859427@qq.com",
        }
    }
}

/// One browser-session equivalent: transcript, storage, and the single
/// outstanding network turn. Only one send is in flight at a time; callers
/// observe `SendOutcome::Busy` instead of interleaved transcripts.
pub struct ChatSession<S: TranscriptStore> {
    transcript: TranscriptManager,
    store: S,
    http: reqwest::Client,
    endpoint: String,
    state: TurnState,
    welcome_shown: bool,
}

impl<S: TranscriptStore> ChatSession<S> {
    pub fn new(
        config: SessionConfig,
        persona: &PersonaConfig,
        store: S,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;

        let mut transcript = TranscriptManager::new(
            persona.system_prompt.clone(),
            config.cap,
            config.send_window
        );
        let welcome_shown = transcript.load(&store);

        let mut session = Self {
            transcript,
            store,
            http,
            endpoint: config.endpoint,
            state: TurnState::Idle,
            welcome_shown,
        };

        if !session.welcome_shown {
            session.transcript.append_assistant_turn(&persona.welcome_message);
            session.welcome_shown = true;
            session.persist();
        }

        Ok(session)
    }

    pub fn transcript(&self) -> &TranscriptManager {
        &self.transcript
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state == TurnState::AwaitingResponse
    }

    /// Drive one full turn: append the user message, call the proxy, append
    /// the assistant (or fallback) message, persist. Every resolution leaves
    /// a rendered assistant-style entry, so the transcript never stalls on a
    /// silent failure.
    pub async fn send_turn(&mut self, text: &str) -> SendOutcome {
        if self.state == TurnState::AwaitingResponse {
            return SendOutcome::Busy;
        }
        if !self.transcript.append_user_turn(text) {
            return SendOutcome::Ignored;
        }

        self.state = TurnState::AwaitingResponse;
        let outcome = match self.post_turn().await {
            Ok(reply) => {
                self.transcript.append_assistant_turn(&reply);
                SendOutcome::Replied(reply)
            }
            Err(failure) => {
                let fallback = failure.fallback();
                self.transcript.append_assistant_turn(fallback);
                SendOutcome::Fallback(fallback.to_string())
            }
        };
        self.persist();
        self.state = TurnState::Idle;

        outcome
    }

    async fn post_turn(&self) -> Result<String, TurnFailure> {
        let body = ChatRequest { messages: self.transcript.outbound() };

        let resp = match self.http.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!("Chat turn timed out after the client ceiling");
                return Err(TurnFailure::Timeout);
            }
            Err(e) => {
                warn!("Chat turn failed to reach the proxy: {}", e);
                return Err(TurnFailure::Unavailable);
            }
        };

        let status = resp.status();
        if status.is_success() {
            let reply: ChatReply = resp.json().await.map_err(|e| {
                warn!("Proxy answered with an unreadable body: {}", e);
                TurnFailure::Unavailable
            })?;
            info!("Chat turn completed ({} chars)", reply.reply.chars().count());
            return Ok(reply.reply);
        }

        warn!("Proxy answered turn with status {}", status);
        Err(match status.as_u16() {
            408 => TurnFailure::Timeout,
            401 => TurnFailure::Misconfigured,
            _ => TurnFailure::Unavailable,
        })
    }

    fn persist(&self) {
        self.transcript.persist(&self.store, self.welcome_shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use crate::config::persona::default_persona;
    use crate::error::ChatError;
    use crate::llm::CompletionClient;
    use crate::models::chat::{ ChatMessage, Role };
    use crate::server::api::{ AppState, router };
    use crate::widget::store::MemoryStore;
    use async_trait::async_trait;
    use clap::Parser;
    use std::sync::Arc;

    struct ScriptedCompletion {
        respond: Box<dyn (Fn() -> Result<String, ChatError>) + Send + Sync>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ChatError> {
            (self.respond)()
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    async fn spawn_proxy(
        respond: impl (Fn() -> Result<String, ChatError>) + Send + Sync + 'static
    ) -> String {
        let args = Args::parse_from([
            "neuraserve-chat",
            "--chat-api-key",
            "sk-test",
            "--chat-rate-limit",
            "1000",
        ]);
        let client = Arc::new(ScriptedCompletion { respond: Box::new(respond) });
        let state = AppState::new(&args, client, Arc::new(default_persona()));
        let app = router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/chat", addr)
    }

    fn session_for(endpoint: String, store: MemoryStore) -> ChatSession<MemoryStore> {
        ChatSession::new(SessionConfig::new(endpoint), &default_persona(), store).unwrap()
    }

    #[tokio::test]
    async fn fresh_session_shows_the_welcome_exactly_once() {
        let endpoint = spawn_proxy(|| Ok("好的".to_string())).await;
        let store = MemoryStore::new();

        let session = session_for(endpoint.clone(), store.clone());
        assert_eq!(session.transcript().turns().len(), 1);
        assert_eq!(session.transcript().turns()[0].role, Role::Assistant);
        assert!(session.transcript().turns()[0].content.contains("赵经理"));

        // A second session over the same store does not repeat it.
        let session2 = session_for(endpoint, store);
        assert_eq!(session2.transcript().turns().len(), 1);
    }

    #[tokio::test]
    async fn blank_input_leaves_the_transcript_unchanged() {
        let endpoint = spawn_proxy(|| Ok("unused".to_string())).await;
        let mut session = session_for(endpoint, MemoryStore::new());

        let before = session.transcript().turns().len();
        assert_eq!(session.send_turn("   ").await, SendOutcome::Ignored);
        assert_eq!(session.transcript().turns().len(), before);
    }

    #[tokio::test]
    async fn successful_turn_appends_user_then_assistant_and_persists() {
        let endpoint = spawn_proxy(|| Ok("¥9800/年起".to_string())).await;
        let store = MemoryStore::new();
        let mut session = session_for(endpoint, store.clone());

        let outcome = session.send_turn("价格").await;
        assert_eq!(outcome, SendOutcome::Replied("¥9800/年起".to_string()));

        let turns = session.transcript().turns();
        let n = turns.len();
        assert_eq!(turns[n - 2].role, Role::User);
        assert_eq!(turns[n - 2].content, "价格");
        assert_eq!(turns[n - 1].role, Role::Assistant);
        assert_eq!(turns[n - 1].content, "¥9800/年起");

        let stored = store.load().unwrap();
        assert!(stored.messages.len() <= DEFAULT_CAP);
        assert_eq!(stored.messages.last().unwrap().content, "¥9800/年起");
        assert!(!session.is_awaiting_response());
    }

    #[tokio::test]
    async fn proxy_failure_synthesizes_a_fallback_turn() {
        let endpoint = spawn_proxy(|| Err(ChatError::Upstream("status 503".to_string()))).await;
        let mut session = session_for(endpoint, MemoryStore::new());

        let outcome = session.send_turn("你们靠谱吗").await;
        let SendOutcome::Fallback(text) = outcome else {
            panic!("expected fallback outcome");
        };
        assert!(text.contains("1850859427@qq.com"));
        // The raw upstream error never reaches the transcript.
        let last = session.transcript().turns().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(!last.content.contains("503"));
    }

    #[tokio::test]
    async fn proxy_timeout_maps_to_the_timeout_fallback() {
        let endpoint = spawn_proxy(|| Err(ChatError::Timeout)).await;
        let mut session = session_for(endpoint, MemoryStore::new());

        let outcome = session.send_turn("一个很复杂的问题").await;
        let SendOutcome::Fallback(text) = outcome else {
            panic!("expected fallback outcome");
        };
        assert!(text.contains("Jr_gyh"));
    }

    #[tokio::test]
    async fn unreachable_proxy_still_resolves_the_turn() {
        // Nothing listens on this port.
        let mut session = session_for(
            "http://127.0.0.1:9/api/chat".to_string(),
            MemoryStore::new()
        );

        let outcome = session.send_turn("hi").await;
        assert!(matches!(outcome, SendOutcome::Fallback(_)));
        assert_eq!(session.transcript().turns().last().unwrap().role, Role::Assistant);
        assert!(!session.is_awaiting_response());
    }
}
