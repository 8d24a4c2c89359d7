use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use chat_client::audio::{self, StablePolicy};
use chat_client::settings::{self, ClientSettings};
use chat_client::transcription::{self, SttClient};
use chat_client::{ChatSession, ConnectionState, SessionUpdate};

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    Silent(String),
    Clear,
    Connect,
    Disconnect,
    Transcribe(PathBuf),
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Send(line.to_string()));
    }

    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match name {
        "/silent" if !rest.is_empty() => Command::Silent(rest.to_string()),
        "/clear" => Command::Clear,
        "/connect" => Command::Connect,
        "/disconnect" => Command::Disconnect,
        "/transcribe" if !rest.is_empty() => Command::Transcribe(PathBuf::from(rest)),
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    };
    Some(command)
}

/// `--url <ws-url>` or `--url=<ws-url>`
fn url_arg(mut args: impl Iterator<Item = String>) -> Option<String> {
    while let Some(arg) = args.next() {
        if arg == "--url" {
            return args.next();
        }
        if let Some(url) = arg.strip_prefix("--url=") {
            return Some(url.to_string());
        }
    }
    None
}

/// Print connection changes and finished assistant replies.
async fn render_updates(session: Arc<ChatSession>) {
    let mut updates = session.subscribe();
    let mut printed: HashSet<String> = HashSet::new();

    loop {
        match updates.recv().await {
            Ok(SessionUpdate::Connection(status)) => match (status.state, status.error) {
                (ConnectionState::Connected, _) => println!("* connected"),
                (ConnectionState::Connecting, _) => println!("* connecting..."),
                (state, Some(error)) => println!("* {:?}: {}", state, error),
                (state, None) => println!("* {:?}", state),
            },
            Ok(SessionUpdate::Transcript { len: 0 }) => {
                printed.clear();
                println!("* transcript cleared");
            }
            Ok(SessionUpdate::Transcript { .. }) => {
                for (index, entry) in session.entries().iter().enumerate() {
                    if !entry.is_received() || entry.streaming || !entry.visible {
                        continue;
                    }
                    if printed.insert(format!("{}:{}", index, entry.id)) {
                        println!("assistant> {}", entry.content);
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("Renderer skipped {} updates", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn transcribe_file(settings: &ClientSettings, path: &Path) -> Result<String, String> {
    let client = SttClient::from_settings(settings).map_err(|e| e.to_string())?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    let language = settings.language_hint();

    let is_webm = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("webm"));

    if !is_webm {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3");
        return client
            .transcribe_bytes(bytes, filename, language)
            .await
            .map_err(|e| e.to_string());
    }

    let dir = settings
        .recordings_dir
        .clone()
        .unwrap_or_else(audio::default_recordings_dir);
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let saved = audio::save_recording(&dir, &bytes, &timestamp)
        .await
        .map_err(|e| e.to_string())?;

    transcription::transcribe_stored_file(
        &dir,
        &saved.filename,
        &client,
        language,
        &StablePolicy::default(),
    )
    .await
    .map(|t| t.text)
    .map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("TLS crypto provider already installed");
    }

    let mut settings = settings::load_settings();
    settings.apply_env_overrides();
    if let Some(url) = url_arg(std::env::args().skip(1)) {
        settings.ws_url = url;
    }

    log::info!("Chat backend: {}", settings.ws_url);
    if !transcription::is_api_key_configured() {
        log::info!("No speech-to-text API key configured, /transcribe is unavailable");
    }

    let session = Arc::new(ChatSession::new(settings.session_config()));
    let renderer = tokio::spawn(render_updates(session.clone()));
    session.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            Command::Send(text) => {
                if !session.send(&text, false) {
                    println!("* not sent (not connected)");
                }
            }
            Command::Silent(text) => {
                if !session.send(&text, true) {
                    println!("* not sent (not connected)");
                }
            }
            Command::Clear => session.clear(),
            Command::Connect => session.connect(),
            Command::Disconnect => session.disconnect(),
            Command::Transcribe(path) => match transcribe_file(&settings, &path).await {
                Ok(text) => {
                    println!("you (transcribed)> {}", text);
                    if !session.send(&text, false) {
                        println!("* not sent (not connected)");
                    }
                }
                Err(e) => println!("* transcription failed: {}", e),
            },
            Command::Quit => break,
            Command::Unknown(name) => println!("* unknown command {}", name),
        }
    }

    session.disconnect();
    renderer.abort();
    log::info!("Bye");
}
