//! One streamed turn against a live completion endpoint.
//!
//! Needs OPENAI_API_KEY (or a .env file providing it).

use chatloom::{utils, ChatApp, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new()?;
    let app = ChatApp::from_settings(&settings, Settings::api_key()?)?;

    let mut session = app.new_thread();

    utils::print_prompt("You: ");
    println!("What is a thread-scoped conversation store?");

    utils::print_prompt("Assistant: ");
    app.send_streaming(
        &mut session,
        "What is a thread-scoped conversation store? Answer in two sentences.",
        utils::print_fragment,
    )
    .await?;
    println!();

    utils::print_info(&format!("Saved as thread {}", session.thread_id()));
    Ok(())
}
