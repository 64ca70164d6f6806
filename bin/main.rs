//! Command-line front end for the pooled mailer.
//!
//! Sends one message (or `--count` copies, concurrently) through a pool
//! built from a TOML configuration file.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mailpool::{Config, ConnectionPool, Mailer, Message, SendError, SmtpConnector};
use tokio::task::JoinSet;

/// Send transactional mail over pooled SMTP sessions
#[derive(Parser, Debug)]
#[command(name = "mailpool")]
#[command(about = "Send mail over pooled SMTP sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./mailpool.config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compose and send a multipart/alternative message
    Send {
        /// Envelope sender and From header
        #[arg(long)]
        from: String,

        /// Recipient, repeat for several
        #[arg(long, required = true)]
        to: Vec<String>,

        #[arg(long, default_value = "")]
        subject: String,

        /// Plain-text alternative
        #[arg(long, default_value = "")]
        text: String,

        /// HTML alternative
        #[arg(long, default_value = "")]
        html: String,

        /// Number of copies to send concurrently
        #[arg(long, default_value = "1")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailpool::logging::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("Loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Send {
            from,
            to,
            subject,
            text,
            html,
            count,
        } => {
            let message = to
                .into_iter()
                .fold(Message::new(from), Message::to)
                .subject(subject)
                .text(text)
                .html(html);

            tokio::select! {
                result = cmd_send(config, message, count) => result?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Interrupted, abandoning in-flight sends");
                }
            }
        }
    }

    Ok(())
}

async fn cmd_send(config: Config, message: Message, count: usize) -> anyhow::Result<()> {
    let connector = SmtpConnector::new(&config.smtp).context("Preparing connector")?;
    let pool = Arc::new(ConnectionPool::new(connector, config.smtp.max_idle));
    let mailer = Mailer::new(Arc::clone(&pool));

    let message = Arc::new(message);
    let credentials = config.credentials.map(Arc::new);

    let mut sends = JoinSet::new();
    for _ in 0..count {
        let mailer = mailer.clone();
        let message = Arc::clone(&message);
        let credentials = credentials.clone();
        sends.spawn(async move { mailer.send(&message, credentials.as_deref()).await });
    }

    let failed = drain(sends).await;

    pool.shutdown().await;

    println!("Sent {} of {count} to {}", count - failed, pool.endpoint());
    if failed > 0 {
        anyhow::bail!("{failed} sends failed");
    }

    Ok(())
}

/// Waits for every send, counting failures. A panicked task counts as one.
async fn drain(mut sends: JoinSet<Result<(), SendError>>) -> usize {
    let mut failed = 0;
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                eprintln!("{err}");
                failed += 1;
            }
            Err(err) => {
                eprintln!("Send task panicked: {err}");
                failed += 1;
            }
        }
    }
    failed
}
