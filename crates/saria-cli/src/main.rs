//! saria CLI — assistant relay server and client commands.
//!
//! ```text
//! saria serve [--port 5000] [--host 127.0.0.1] [--api-key KEY] [--model NAME]
//! saria chat "hello there" [--server http://localhost:5000]
//! saria voice clip.webm [--mime audio/webm] [--server ...]
//! saria interrupt / status [--server ...]
//! saria listen [--server ...]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use saria_core::types::RelayConfig;
use saria_lib::llm::{GeminiClient, GeminiConfig};
use saria_lib::relay::Relay;
use saria_lib::speech::TranslateTts;

/// saria — voice/text assistant relay
#[derive(Parser)]
#[command(name = "saria", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay server
    Serve {
        /// Listen port (falls back to $PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Generative-language API key (falls back to $GOOGLE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Generation model (falls back to $GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,
        /// Rate limiter burst capacity (falls back to $RATE_LIMIT_TOKENS)
        #[arg(long)]
        capacity: Option<f64>,
        /// Seconds to refill the limiter from empty (falls back to $RATE_LIMIT_REFILL_SEC)
        #[arg(long)]
        refill_sec: Option<f64>,
    },
    /// Send a chat message to a running relay
    Chat {
        /// Message text
        message: String,
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Upload an audio clip to a running relay
    Voice {
        /// Path to the audio file
        file: PathBuf,
        /// MIME type of the clip
        #[arg(long, default_value = "audio/webm")]
        mime: String,
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Cancel whatever the relay is working on
    Interrupt {
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Follow the relay's event stream, printing events as they arrive
    Listen {
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Get relay status
    Status {
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            api_key,
            model,
            capacity,
            refill_sec,
        } => {
            let api_key = api_key
                .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
                .expect("an API key is required: pass --api-key or set GOOGLE_API_KEY");

            let mut gemini = GeminiConfig::new(api_key);
            if let Some(model) = model.or_else(|| std::env::var("GEMINI_MODEL").ok()) {
                gemini.model = model;
            }

            let mut config = RelayConfig::default();
            if let Some(capacity) = capacity.or_else(|| env_f64("RATE_LIMIT_TOKENS")) {
                config.capacity = capacity;
            }
            if let Some(secs) = refill_sec.or_else(|| env_f64("RATE_LIMIT_REFILL_SEC")) {
                config.refill_period = Duration::from_secs_f64(secs);
            }

            let relay = Relay::new(
                config,
                Arc::new(GeminiClient::new(gemini)),
                Arc::new(TranslateTts::new()),
            )
            .expect("invalid relay configuration");
            let app = saria_lib::server::router(Arc::new(relay));

            let port = port
                .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
                .unwrap_or(5000);
            let addr = format!("{host}:{port}");
            eprintln!("saria listening on {addr}");

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .expect("failed to bind");

            axum::serve(listener, app).await.expect("server error");
        }

        Command::Chat { message, server } => {
            let resp = reqwest::Client::new()
                .post(format!("{server}/chat"))
                .json(&serde_json::json!({ "message": message }))
                .send()
                .await
                .expect("request failed");
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Voice { file, mime, server } => {
            let bytes = std::fs::read(&file).expect("failed to read audio file");
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("clip")
                .to_string();
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(name)
                .mime_str(&mime)
                .expect("invalid MIME type");
            let form = reqwest::multipart::Form::new()
                .part("file", part)
                .text("mimeType", mime);

            let resp = reqwest::Client::new()
                .post(format!("{server}/voice"))
                .multipart(form)
                .send()
                .await
                .expect("request failed");
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Interrupt { server } => post_simple(&server, "interrupt").await,

        Command::Listen { server } => {
            let resp = reqwest::Client::new()
                .get(format!("{server}/stream"))
                .send()
                .await
                .expect("request failed");
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
                    Err(e) => {
                        eprintln!("stream error: {e}");
                        break;
                    }
                }
            }
        }

        Command::Status { server } => {
            let resp = reqwest::Client::new()
                .get(format!("{server}/status"))
                .send()
                .await
                .expect("request failed");
            println!("{}", resp.text().await.unwrap_or_default());
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

async fn post_simple(server: &str, endpoint: &str) {
    let resp = reqwest::Client::new()
        .post(format!("{server}/{endpoint}"))
        .send()
        .await
        .expect("request failed");
    println!("{}", resp.text().await.unwrap_or_default());
}
