use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Surface diagnostic detail in error response bodies. Off in production.
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Per-second cap on proxied chat turns across all clients.
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value = "20")]
    pub chat_rate_limit: u32,

    // --- Upstream Completion API Args ---
    /// API key for the upstream chat-completion provider. Requests fail with
    /// a masked configuration error while this is unset.
    #[arg(long, env = "DEEPSEEK_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Base URL of the upstream chat-completion API.
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.deepseek.com")]
    pub chat_base_url: String,

    /// Model identifier, fixed server-side; never taken from client input.
    #[arg(long, env = "CHAT_MODEL", default_value = "deepseek-chat")]
    pub chat_model: String,

    /// Completion token budget per turn, fixed server-side.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "2000")]
    pub chat_max_tokens: u32,

    /// Sampling temperature, fixed server-side.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Ceiling in seconds for one upstream completion call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    pub upstream_timeout_secs: u64,

    /// How many recent non-system turns are forwarded upstream per request.
    #[arg(long, env = "HISTORY_WINDOW", default_value = "8")]
    pub history_window: usize,

    // --- Persona Args ---
    /// Path to the persona configuration file. Falls back to the built-in
    /// persona when unset.
    #[arg(long, env = "PERSONA_PATH")]
    pub persona_path: Option<String>,

    // --- TLS Args ---
    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,
}
