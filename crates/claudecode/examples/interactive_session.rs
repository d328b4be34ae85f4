//! Interactive Session Example
//!
//! A small REPL over one long-lived CLI process. It demonstrates:
//! - Opening a session with an initial prompt
//! - Sending follow-up prompts read from stdin
//! - Interrupting with Ctrl-C
//! - Closing the session
//!
//! Type `/quit` to exit.
//!
//! Run with: cargo run --example interactive_session

use claudecode::{CancellationToken, Client, Message, Options, SessionOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let client = Client::new(Options::new())?;
    let cancel = CancellationToken::new();
    let session = client
        .new_session(
            SessionOptions::default().with_initial_prompt("Say hello in one short sentence."),
            &cancel,
        )
        .await?;

    print_turn(&session).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("\n> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        session.send(line).await?;
        tokio::select! {
            turn = print_turn(&session) => turn?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupting...");
                session.interrupt().await?;
                print_turn(&session).await?;
            }
        }
    }

    session.close().await?;
    println!("Session {} closed", session.session_id());
    Ok(())
}

async fn print_turn(session: &claudecode::Session) -> claudecode::Result<()> {
    for message in session.receive_one().await? {
        match message {
            Message::Assistant(assistant) => println!("{}", assistant.text()),
            Message::Result(result) if result.is_error => {
                println!("[turn failed: {}]", result.subtype)
            }
            _ => {}
        }
    }
    Ok(())
}
