//! CLI entry point for vaxbot.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::config::VaxConfig;
use crate::error::{Result, VaxError};
use crate::server;
use crate::service::{ChatService, TurnRequest};
use crate::translator::ResponseMode;
use crate::types::ModelMessage;

/// Vaccination booking assistant
#[derive(Parser, Debug)]
#[command(name = "vaxbot", version, about = "Vaccination booking assistant")]
pub struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Run one chat turn and print the response chunks as NDJSON
    Chat(ChatArgs),
}

/// Arguments for `vaxbot serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides configuration)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,
}

/// Arguments for `vaxbot chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Bearer token forwarded to the booking backend
    #[arg(short, long)]
    pub token: String,

    /// Agent to resume at (defaults to the entry agent)
    #[arg(short, long)]
    pub agent: Option<String>,

    /// JSON file holding the previous turn's history
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// User message
    pub message: String,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = VaxConfig::load(self.config.as_deref())?;
        match self.command {
            Commands::Serve(args) => {
                if let Some(bind) = args.bind {
                    config.bind = bind;
                }
                server::start_server(&config).await
            }
            Commands::Chat(args) => chat(&config, args).await,
        }
    }
}

async fn chat(config: &VaxConfig, args: ChatArgs) -> Result<()> {
    let mut request = TurnRequest::new(args.message, args.token);
    if let Some(agent) = args.agent {
        request = request.with_agent(agent);
    }
    if let Some(path) = &args.history {
        request = request.with_history(read_history(path)?);
    }

    let service = ChatService::from_config(config)?;
    let mut chunks = service.stream_turn(request, ResponseMode::Chat).await?;
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = chunks.next().await {
        stdout.write_all(chunk?.to_ndjson()?.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn read_history(path: &Path) -> Result<Vec<ModelMessage>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        VaxError::InvalidArgument(format!("invalid history in {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["vaxbot", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.bind.unwrap().port(), 9000),
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "vaxbot",
            "--config",
            "vaxbot.toml",
            "chat",
            "--token",
            "abc",
            "--agent",
            "clinic_agent",
            "--history",
            "history.json",
            "I want the flu vaccine",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("vaxbot.toml")));
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.token, "abc");
                assert_eq!(args.agent.as_deref(), Some("clinic_agent"));
                assert_eq!(args.history.as_deref(), Some(Path::new("history.json")));
                assert_eq!(args.message, "I want the flu vaccine");
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn chat_requires_token() {
        assert!(Cli::try_parse_from(["vaxbot", "chat", "hello"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["vaxbot"]).is_err());
    }

    #[test]
    fn history_file_is_read_as_transcript() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let history = vec![ModelMessage::user("hi"), ModelMessage::assistant("Hello!")];
        write!(file, "{}", serde_json::to_string(&history).unwrap()).unwrap();
        assert_eq!(read_history(file.path()).unwrap(), history);
    }

    #[test]
    fn malformed_history_is_invalid_argument() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            read_history(file.path()),
            Err(VaxError::InvalidArgument(_))
        ));
    }
}
