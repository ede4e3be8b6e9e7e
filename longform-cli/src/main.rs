//! longform: entry point.
//!
//! ```text
//! longform capture <tree.json> [--send-to <addr>]   Capture an article
//! longform send <file> --peer <addr> [--name <n>]   Send a file to a peer
//! longform listen                                   Emulate a peer
//! longform --config <path>                          Load a custom config TOML
//! longform --gen-config                             Write default config to stdout
//! ```

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use longform_cli::config::LongformConfig;
use longform_cli::service;
use longform_core::capture::PREVIEW_CHARS;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "longform", about = "Capture long-form articles and send them to e-ink readers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "longform.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture an article from a recorded UI tree (JSON).
    Capture {
        fixture: PathBuf,
        /// Send the captured article to this peer address.
        #[arg(long)]
        send_to: Option<String>,
    },
    /// Send a file to a peer.
    Send {
        file: PathBuf,
        /// Peer address.
        #[arg(short, long)]
        peer: String,
        /// Name announced to the peer; defaults to the file name.
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Emulate an e-ink peer and store received files.
    Listen {
        /// Override the configured bind address.
        #[arg(short, long)]
        bind: Option<String>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&LongformConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("No subcommand given; see --help.");
        std::process::exit(2);
    };

    // Load config.
    let mut config = LongformConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("longform v{}", env!("CARGO_PKG_VERSION"));

    // Ctrl-C handler.
    let stop = CancellationToken::new();
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop_clone.cancel();
    });

    match command {
        Command::Capture { fixture, send_to } => {
            let captured = service::capture(&config, &fixture, stop.clone()).await?;
            println!("{} ({})", captured.article.display_title(), captured.phase);
            println!("{}", captured.article.preview(PREVIEW_CHARS));

            if let (Some(address), Some(path)) = (send_to, captured.path) {
                let name = file_name_of(&path);
                let report = service::send(
                    &config,
                    &address,
                    &name,
                    captured.article.text().into_bytes(),
                    stop,
                    print_status,
                )
                .await?;
                println!();
                println!("sent {} bytes (MTU {})", report.bytes, report.mtu);
            }
        }
        Command::Send { file, peer, name } => {
            let payload = tokio::fs::read(&file).await?;
            let name = name.unwrap_or_else(|| file_name_of(&file));
            let report = service::send(&config, &peer, &name, payload, stop, print_status).await?;
            println!();
            println!("sent {} bytes (MTU {})", report.bytes, report.mtu);
            if let Some(note) = report.name_truncation {
                println!("note: {note}");
            }
        }
        Command::Listen { bind } => {
            if let Some(bind) = bind {
                config.listen.bind = bind;
            }
            service::listen(&config, stop).await?;
        }
    }

    Ok(())
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_status(status: &str, percent: u8) {
    print!("\r\x1b[2K[{percent:>3}%] {status}");
    let _ = std::io::stdout().flush();
}
