//! CLI binary for finvox.

use clap::{Parser, Subcommand};
use finvox::VoiceSession;
use finvox::audio::CpalAudio;
use finvox::audio::capture::CpalCapture;
use finvox::audio::playback::CpalPlayback;
use finvox::config::VoxConfig;
use finvox::finance::{FinanceClient, FinanceToolHandler, PaymentConfirmation};
use finvox::session::{SessionNotice, SessionState};
use finvox::transcript::TranscriptRole;
use finvox::transport::ws::WsConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Finvox: voice-driven personal finance assistant.
#[derive(Parser)]
#[command(name = "finvox", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a voice conversation with the finance assistant.
    Chat,

    /// List available audio devices.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy dependency logs by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("finvox=info,tungstenite=warn,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        VoxConfig::from_file(path)?
    } else {
        VoxConfig::default()
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Devices => list_devices(),
    }
}

async fn run_chat(config: VoxConfig) -> anyhow::Result<()> {
    println!("Finvox v{}", env!("CARGO_PKG_VERSION"));

    let api_key = std::env::var(&config.session.api_key_env).ok();
    if api_key.is_none() {
        println!(
            "Warning: {} is not set; the service will reject the connection.",
            config.session.api_key_env
        );
    }

    let connector = Arc::new(WsConnector::new(config.session.service_url.clone(), api_key));
    let finance = FinanceClient::new(&config.finance)?;
    let (handler, mut confirmations) = FinanceToolHandler::new(finance);

    let session = Arc::new(VoiceSession::new(
        config,
        connector,
        Arc::new(CpalAudio),
        Arc::new(handler),
    ));

    session.start().await?;
    println!("\nConnected. Speak into your microphone. Press Ctrl+C to stop.\n");

    let mut notices = session.subscribe();
    let mut state = session.state();
    // One reader for the whole run: a per-prompt reader would discard any
    // bytes its buffer had already consumed from stdin.
    let mut input = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("received Ctrl+C, shutting down...");
                }
                break;
            }
            notice = notices.recv() => {
                match notice {
                    Ok(notice) => print_notice(&notice),
                    Err(_) => break,
                }
            }
            confirmation = confirmations.recv() => {
                let Some(confirmation) = confirmation else { break };
                handle_confirmation(&session, confirmation, &mut input).await;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if *state.borrow() == SessionState::Idle {
                    println!("Session ended.");
                    break;
                }
            }
        }
    }

    session.stop().await;
    Ok(())
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::Transcript(event) => {
            let speaker = match event.role {
                TranscriptRole::User => "You",
                TranscriptRole::Assistant => "Finvox",
            };
            if event.starts_turn {
                println!("\n{speaker}: {}", event.text);
            } else {
                print!("{}", event.text);
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
        }
        SessionNotice::ToolCall { name, .. } => println!("\n[tool call: {name}]"),
        SessionNotice::ToolResult { name, success, .. } => {
            println!("[tool {name}: {}]", if *success { "ok" } else { "failed" });
        }
        SessionNotice::TransportFailure { message } => {
            println!(
                "\nConnection lost: {}",
                message.as_deref().unwrap_or("closed by peer")
            );
        }
        SessionNotice::State(_) => {}
    }
}

/// Prompt for a yes/no decision on a pending bill payment.
async fn handle_confirmation(
    session: &VoiceSession,
    confirmation: PaymentConfirmation,
    input: &mut tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>,
) {
    println!(
        "\nPayment request: ${:.2} to {} (bill {}).",
        confirmation.amount, confirmation.biller_name, confirmation.bill_id
    );
    println!("Confirm? [y/N] ");

    let approved = matches!(
        input.next_line().await,
        Ok(Some(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    );

    let (token, result) = if approved {
        confirmation.approve().await
    } else {
        confirmation.decline()
    };
    session.send_deferred_response(token, result).await;
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalCapture::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in CpalPlayback::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}
