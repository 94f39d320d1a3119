use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatloom")]
#[command(author, version, about = "Thread-aware chatbot with persistent history", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a single message and print the reply
    Chat {
        prompt: String,

        /// Continue an existing thread instead of starting a new one
        #[arg(short = 't', long)]
        thread: Option<String>,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Start an interactive chat session
    Interactive {
        /// Resume an existing thread (default: start a new one)
        #[arg(short = 't', long)]
        thread: Option<String>,
    },

    /// List all stored conversation threads
    Threads,

    /// Print the full history of a thread
    History { thread_id: String },
}
