//! Tether CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tether::adapter::{create_adapter, AdapterEvent, AdapterOptions, SendOptions};
use tether::cli::{ChatArgs, Cli, Commands, DecodeArgs};
use tether::config::TetherConfig;
use tether::protocol::FrameDecoder;
use tether::types::{Message, RunOutcome};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args).await,
        Commands::Decode(args) => handle_decode(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let Some(prompt) = args.prompt else {
        eprintln!("Usage: tether chat \"your prompt here\"");
        std::process::exit(1);
    };

    let mut config = TetherConfig::load()?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(thread_id) = args.thread_id {
        config.thread_id = Some(thread_id);
    }

    let adapter = create_adapter(config, AdapterOptions::default())?;

    // Message events carry the full text so far; print only the new tail.
    let printed = Arc::new(std::sync::Mutex::new(0usize));
    let _sub = adapter.subscribe(Arc::new(move |event: &AdapterEvent| match event {
        AdapterEvent::Message { content, .. } => {
            let mut printed = printed.lock().unwrap_or_else(|e| e.into_inner());
            let tail = content.get(*printed..).unwrap_or(content);
            print!("{tail}");
            let _ = std::io::stdout().flush();
            *printed = content.len();
        }
        AdapterEvent::ToolCall {
            tool_name,
            tool_call_id,
            complete: false,
            ..
        } => {
            eprintln!("\n⚡ {tool_name} ({tool_call_id})");
        }
        AdapterEvent::Error { message, .. } => {
            eprintln!("\nagent error: {message}");
        }
        AdapterEvent::RunFinished { usage: Some(usage), .. } => {
            eprintln!(
                "\n[tokens: {} in, {} out]",
                usage.input_tokens, usage.output_tokens
            );
        }
        _ => {}
    }));

    adapter.connect().await?;
    let options = SendOptions::builder().maybe_model(args.model).build();
    let outcome = adapter.send_message(Message::user(prompt), options).await;
    adapter.disconnect().await;
    println!();

    match outcome? {
        RunOutcome::AwaitingToolResults { pending } => {
            eprintln!("agent requested client tools: {}", pending.join(", "));
        }
        RunOutcome::Failed { message } => return Err(message.into()),
        RunOutcome::Completed | RunOutcome::Cancelled => {}
    }
    Ok(())
}

fn handle_decode(args: DecodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let body = std::fs::read(&args.file)?;
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.push(&body);
    frames.extend(decoder.finish());

    for frame in frames {
        match frame.event_name {
            Some(name) => println!("{name}: {:?}", frame.event),
            None => println!("{:?}", frame.event),
        }
    }
    Ok(())
}
