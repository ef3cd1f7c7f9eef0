use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize news articles with pretrained seq2seq models", long_about = None)]
pub struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Directory for downloaded model files. Defaults to the HuggingFace hub cache.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Use the offline dummy backend instead of downloading models.
    #[arg(long, global = true)]
    dummy: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the summarizer page.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8501")]
        addr: SocketAddr,
    },
}

impl Cli {
    fn inference_config(&self) -> ns_inference::Config {
        ns_inference::Config {
            cache_dir: self.cache_dir.clone(),
            dummy: self.dummy,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = cli.inference_config();

    match cli.command {
        Commands::Serve { addr } => {
            let summarizer = ns_inference::create_summarizer(&config)?;
            info!(
                "🧠 Models load on first use ({})",
                if config.dummy { "dummy backend" } else { "HuggingFace hub" }
            );
            ns_web::serve(ns_web::AppState::new(summarizer), addr).await?;
        }
    }

    Ok(())
}
