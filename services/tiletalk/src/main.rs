mod config;
mod console_speech;

use crate::config::Config;
use crate::console_speech::ConsoleSpeech;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tiletalk_core::completion::CompletionClient;
use tiletalk_core::controller::SessionController;
use tiletalk_core::conversation::ConversationBoard;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

/// The predefined topic catalog; ids are assigned 1..=10 in order.
const DEFAULT_TOPICS: [&str; 10] = [
    "Travel Planning",
    "Recipe Ideas",
    "Tech Support",
    "Language Learning",
    "Fitness Advice",
    "Book Recommendations",
    "Career Guidance",
    "Mental Wellness",
    "Home Improvement",
    "Financial Planning",
];

type Controller = SessionController<CompletionClient, ConsoleSpeech>;

#[derive(Parser)]
#[command(name = "tiletalk", about = "Topic-tile voice chat in the terminal")]
struct Cli {
    /// Topics for the session board; the built-in catalog is used when none
    /// are given
    topics: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting tiletalk service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    let topics: Vec<String> = if args.topics.is_empty() {
        DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
    } else {
        args.topics
    };

    // --- 4. Wire Services ---
    // The controller receives its service handles at construction; nothing
    // here is global.
    let completion = Arc::new(CompletionClient::new(
        config.openai_api_key.clone(),
        config.chat_model.clone(),
    ));
    let speech = Arc::new(ConsoleSpeech::new());
    let board = ConversationBoard::from_topics(topics);
    let controller = Arc::new(SessionController::new(board, completion, speech.clone()));

    render_board(&controller).await;
    print_help();

    // Re-render the board on every controller state change, and echo the
    // status line the controller publishes.
    let mut state_rx = controller.subscribe();
    let render_controller = controller.clone();
    let render_handle = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            render_board(&render_controller).await;
            if let Some(status) = &state.status {
                println!("{status}");
            }
        }
    });

    let input_handle = tokio::spawn(input_loop(controller.clone(), speech));

    tokio::select! {
        _ = render_handle => {},
        result = input_handle => {
            if let Ok(Err(e)) = result {
                tracing::error!("Input loop failed: {:?}", e);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }

    controller.deactivate_session().await;
    tracing::info!("Shutting down...");
    Ok(())
}

/// Reads stdin lines and routes them: to the pending capture while one is
/// active, otherwise as commands.
async fn input_loop(controller: Arc<Controller>, speech: Arc<ConsoleSpeech>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim().to_string();

        // While a capture is pending, the next line is the utterance.
        if speech.push_line(line.clone()) {
            continue;
        }

        match line.as_str() {
            "q" => break,
            "x" => controller.cancel_voice_turn().await,
            "h" => print_transcript(&controller).await,
            "" => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = controller.trigger_voice_turn().await {
                        println!("{e}");
                    }
                });
            }
            other => match other.parse::<u32>() {
                Ok(id) => {
                    // Selecting the already-active tile toggles it off.
                    if controller.state().active_session == Some(id) {
                        controller.deactivate_session().await;
                    } else {
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            if let Err(e) = controller.activate_session(id).await {
                                println!("{e}");
                            }
                        });
                    }
                }
                Err(_) => print_help(),
            },
        }
    }
    Ok(())
}

async fn render_board(controller: &Controller) {
    println!();
    for session in controller.sessions().await {
        let marker = if session.active { "*" } else { " " };
        if session.turns > 0 {
            println!(
                " {marker} [{}] {} ({} messages)",
                session.id, session.topic, session.turns
            );
        } else {
            println!(" {marker} [{}] {}", session.id, session.topic);
        }
    }
}

async fn print_transcript(controller: &Controller) {
    let Some(id) = controller.state().active_session else {
        println!("No session is active.");
        return;
    };
    let Some(transcript) = controller.transcript(id).await else {
        return;
    };
    for turn in transcript {
        let speaker = match turn.role {
            tiletalk_core::conversation::Role::User => "You",
            tiletalk_core::conversation::Role::Assistant => "Assistant",
        };
        println!("{speaker}: {}", turn.content);
    }
}

fn print_help() {
    println!();
    println!("Commands:");
    println!("  <number>   activate a session tile (again to deactivate)");
    println!("  <enter>    start a voice turn on the active session");
    println!("  x          cancel the current voice turn");
    println!("  h          show the active session's transcript");
    println!("  q          quit");
}
