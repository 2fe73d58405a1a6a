//! CLI definitions for the `tether` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tether CLI
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Talk to an AG-UI agent from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and stream the reply
    Chat(ChatArgs),
    /// Decode a captured response body and print its events
    Decode(DecodeArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Run endpoint (overrides TETHER_ENDPOINT and the config file)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Model hint forwarded to the agent
    #[arg(short, long)]
    pub model: Option<String>,

    /// Conversation thread id
    #[arg(long)]
    pub thread_id: Option<String>,

    /// User prompt (positional)
    pub prompt: Option<String>,
}

/// Arguments for the `decode` subcommand.
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// File holding a raw `event:` / `data:` response body
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_arguments() {
        let cli = Cli::parse_from(["tether", "chat", "--model", "gpt-4o", "hello there"]);
        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.model.as_deref(), Some("gpt-4o"));
        assert_eq!(args.prompt.as_deref(), Some("hello there"));
        assert!(args.endpoint.is_none());
    }

    #[test]
    fn parses_decode_arguments() {
        let cli = Cli::parse_from(["tether", "decode", "body.txt"]);
        assert!(matches!(cli.command, Commands::Decode(args) if args.file == PathBuf::from("body.txt")));
    }
}
