//! Simple Query Example
//!
//! The most basic use of the SDK. It demonstrates:
//! - Creating a client
//! - Sending a one-shot query
//! - Printing the reply and the result summary
//!
//! Requires the `claude` CLI on PATH.
//!
//! Run with: cargo run --example simple_query

use claudecode::{CancellationToken, Client, ContentBlock, Message, Options};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Step 1: Create a client
    let client = Client::new(Options::new().with_max_turns(1))?;

    // Step 2: Send a query and wait for the result
    println!("Sending query to Claude...");
    let messages = client
        .query(
            "What is 2 + 2? Respond with just the answer.",
            &CancellationToken::new(),
        )
        .await?;

    // Step 3: Print the response
    println!("\nResponse from Claude:");
    for message in &messages {
        match message {
            Message::Assistant(assistant) => {
                for block in &assistant.content {
                    match block {
                        ContentBlock::Text { text } => println!("{}", text),
                        other => println!("({} block)", other.block_type()),
                    }
                }
            }
            Message::Result(result) => {
                println!(
                    "\nSession {} finished in {} ms over {} turn(s)",
                    result.session_id, result.duration_ms, result.num_turns
                );
                if let Some(cost) = result.total_cost_usd {
                    println!("Cost: ${:.4}", cost);
                }
            }
            _ => {}
        }
    }

    Ok(())
}
