use anyhow::{Context, Result};
use chatloom::cli::{Cli, Commands};
use chatloom::{
    utils, ChatApp, ChatSession, Message, MessageStore, Role, Settings, SqliteMessageStore,
};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.logging.level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            prompt,
            thread,
            no_stream,
        } => {
            let app = ChatApp::from_settings(&settings, Settings::api_key()?)?;
            handle_chat(app, prompt, thread, no_stream).await
        }
        Commands::Interactive { thread } => {
            let app = ChatApp::from_settings(&settings, Settings::api_key()?)?;
            handle_interactive(app, thread).await
        }
        // Read-only commands work without an API key.
        Commands::Threads => handle_threads(&settings).await,
        Commands::History { thread_id } => handle_history(&settings, thread_id).await,
    }
}

async fn handle_chat(
    app: ChatApp,
    prompt: String,
    thread: Option<String>,
    no_stream: bool,
) -> Result<()> {
    let mut session = match thread {
        Some(id) => app.resume(id).await?,
        None => app.new_thread(),
    };

    if no_stream {
        let reply = app.send(&mut session, prompt).await?;
        println!("{}", reply.content);
    } else {
        app.send_streaming(&mut session, prompt, utils::print_fragment)
            .await?;
        println!();
    }

    utils::print_info(&format!("Thread: {}", session.thread_id()));
    Ok(())
}

async fn handle_interactive(app: ChatApp, thread: Option<String>) -> Result<()> {
    utils::print_header("Interactive Chat");

    match app.threads().await {
        Ok(threads) if threads.is_empty() => utils::print_info("No stored threads yet"),
        Ok(threads) => {
            utils::print_info("Stored threads:");
            for id in threads {
                println!("  {}", id);
            }
        }
        // A listing failure is not "no threads"; say so and carry on.
        Err(e) => utils::print_error(&format!("Could not list threads: {}", e)),
    }

    let mut session = match thread {
        Some(id) => app.resume(id).await?,
        None => app.new_thread(),
    };

    utils::print_info(&format!("Thread: {}", session.thread_id()));
    if session.message_count() > 0 {
        utils::print_success(&format!(
            "Resumed with {} previous messages",
            session.message_count()
        ));
        render_history(session.history());
        if session.last_role() == Some(Role::User) {
            utils::print_error("The last message never got a reply; send it again to retry.");
        }
    }
    utils::print_info("Type your messages (/help for commands, Ctrl+C to exit)\n");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/new" => {
                session = app.new_thread();
                utils::print_success(&format!("Started new thread {}", session.thread_id()));
                println!();
                continue;
            }
            "/threads" => {
                match app.threads().await {
                    Ok(threads) => {
                        for id in threads {
                            println!("  {}", id);
                        }
                    }
                    Err(e) => utils::print_error(&format!("Could not list threads: {}", e)),
                }
                println!();
                continue;
            }
            "/help" => {
                println!("Special commands:");
                println!("  /new      - Start a new thread");
                println!("  /threads  - List stored threads");
                println!("  /help     - Show this help");
                println!("  Ctrl+C    - Exit\n");
                continue;
            }
            _ => {}
        }

        utils::print_prompt("Assistant: ");
        match app
            .send_streaming(&mut session, input, utils::print_fragment)
            .await
        {
            Ok(_) => println!("\n"),
            Err(e) => {
                // The user message is already persisted; resubmitting retries
                // the turn against the same history.
                println!();
                utils::print_error(&format!("Turn failed: {}", e));
                utils::print_info("Your message was saved; send it again to retry.\n");
            }
        }
    }

    Ok(())
}

async fn handle_threads(settings: &Settings) -> Result<()> {
    let store = SqliteMessageStore::open(&settings.storage.database_path)?;
    let threads = store.list_threads().await?;

    if threads.is_empty() {
        utils::print_info("No stored threads");
    } else {
        for id in threads {
            println!("{}", id);
        }
    }
    Ok(())
}

async fn handle_history(settings: &Settings, thread_id: String) -> Result<()> {
    let store = Arc::new(SqliteMessageStore::open(&settings.storage.database_path)?);
    let session = ChatSession::load(store, thread_id).await?;

    if session.message_count() == 0 {
        utils::print_info("No messages in this thread");
    } else {
        render_history(session.history());
    }
    Ok(())
}

fn render_history(messages: &[Message]) {
    for message in messages {
        match message.role {
            Role::User => {
                utils::print_prompt("You: ");
                println!("{}", message.content);
            }
            Role::Assistant => {
                utils::print_prompt("Assistant: ");
                println!("{}", message.content);
            }
        }
    }
    println!();
}
