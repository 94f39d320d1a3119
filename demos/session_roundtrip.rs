//! Store/session round-trip without any network: append a turn by hand,
//! reload the thread from disk, and enumerate stored threads.

use chatloom::{ChatSession, MessageStore, SqliteMessageStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::open("demo-threads.db")?);

    let thread_id = {
        let mut session = ChatSession::start_new(store.clone());
        session.append_user("Hello").await?;
        session.append_assistant("Hi there").await?;
        println!(
            "Wrote {} messages to thread {}",
            session.message_count(),
            session.thread_id()
        );
        session.thread_id().to_string()
    };

    // Replay the thread from the store.
    let session = ChatSession::load(store.clone(), thread_id).await?;
    println!("\nReloaded history:");
    for message in session.history() {
        println!("  {}: {}", message.role.as_str(), message.content);
    }

    println!("\nStored threads:");
    for id in store.list_threads().await? {
        println!("  {}", id);
    }

    Ok(())
}
