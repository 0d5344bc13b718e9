pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod widget;

use std::error::Error;
use std::sync::Arc;

use log::{ info, warn };

use cli::Args;
use config::persona;
use llm::CompletionClient;
use llm::deepseek::DeepSeekClient;
use server::Server;
use server::api::AppState;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Upstream Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Max Tokens: {}", args.chat_max_tokens);
    info!("Temperature: {}", args.chat_temperature);
    info!("Upstream Timeout: {}s", args.upstream_timeout_secs);
    info!("History Window: {}", args.history_window);
    info!("Rate Limit: {}/s", args.chat_rate_limit);
    info!("Persona Path: {}", args.persona_path.as_deref().unwrap_or("<built-in>"));
    info!("Debug Mode: {}", args.debug);
    info!("-------------------------");

    if args.chat_api_key.is_empty() {
        warn!(
            "Chat credential is not set; /api/chat will answer with a configuration error until it is."
        );
    }

    let persona_config = match &args.persona_path {
        Some(path) => persona::load_persona(path)?,
        None => Arc::new(persona::default_persona()),
    };

    let client: Arc<dyn CompletionClient> = Arc::new(DeepSeekClient::from_args(&args)?);
    let state = AppState::new(&args, client, persona_config);

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await
}
