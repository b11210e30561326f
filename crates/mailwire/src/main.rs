//! mailwire - command-line front end for the mail engine.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mailwire_core::{MailEngine, Message, OutgoingAttachment, OutgoingMail, SearchQuery};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "mailwire", version)]
#[command(about = "Read, search, send and watch mail over IMAP and SMTP")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show the most recent messages
    Summaries {
        /// Number of messages (at most 20)
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Search a mailbox
    Search {
        /// Full-text match
        #[arg(long)]
        text: Option<String>,

        /// Sender match
        #[arg(long)]
        from: Option<String>,

        /// Received on or after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        since: Option<NaiveDate>,

        /// Received before this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        before: Option<NaiveDate>,

        /// Mailbox to search; alone, lists the mailbox
        #[arg(long)]
        folder: Option<String>,

        /// Maximum number of results (at most 50)
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a conversation
    Thread {
        /// Message-ID of any message in the thread
        message_id: String,
    },

    /// Save attachments of a message
    Download {
        /// Message UID
        uid: u32,

        /// Part locators (e.g. 2, 1.3)
        #[arg(required = true)]
        locators: Vec<String>,

        /// Directory to save into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Send a message
    Send {
        /// Recipient (repeatable)
        #[arg(long, required = true)]
        to: Vec<String>,

        /// Carbon-copy recipient (repeatable)
        #[arg(long)]
        cc: Vec<String>,

        /// Blind-copy recipient (repeatable)
        #[arg(long)]
        bcc: Vec<String>,

        /// Subject line
        #[arg(long)]
        subject: String,

        /// Body text; read from stdin when absent
        #[arg(long)]
        body: Option<String>,

        /// File to attach (repeatable)
        #[arg(long)]
        attach: Vec<PathBuf>,
    },

    /// Poll for new mail until interrupted
    Watch,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{s}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwire=info,mailwire_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let path = args.config.clone().unwrap_or_else(config::default_path);
    let config = CliConfig::load(&path)?;

    let engine = MailEngine::tls(config.options());
    engine.configure(config.server).await;

    match args.command {
        Command::Summaries { count } => {
            let messages = engine.fetch_summaries(count).await?;
            print_messages(&messages, args.json)?;
        }
        Command::Search {
            text,
            from,
            since,
            before,
            folder,
            limit,
        } => {
            let query = SearchQuery {
                text,
                sender: from,
                since,
                before,
                folder,
                limit,
            };
            let messages = engine.search(&query).await?;
            print_messages(&messages, args.json)?;
        }
        Command::Thread { message_id } => {
            let messages = engine.fetch_thread(&message_id).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for message in &messages {
                    print_message_detail(message);
                }
            }
        }
        Command::Download { uid, locators, out } => {
            cmd_download(&engine, uid, &locators, &out).await?;
        }
        Command::Send {
            to,
            cc,
            bcc,
            subject,
            body,
            attach,
        } => {
            let body = match body {
                Some(body) => body,
                None => std::io::read_to_string(std::io::stdin()).context("reading body from stdin")?,
            };
            let attachments = attach
                .iter()
                .map(|path| load_attachment(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let mail = OutgoingMail {
                to,
                cc,
                bcc,
                subject,
                body,
                attachments,
            };
            engine.send(mail).await?;
            println!("Message sent.");
        }
        Command::Watch => cmd_watch(&engine, args.json).await?,
    }

    Ok(())
}

async fn cmd_download(
    engine: &MailEngine,
    uid: u32,
    locators: &[String],
    out: &Path,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let parts = if let [locator] = locators {
        vec![engine.download_attachment(uid, locator).await?]
    } else {
        engine.download_all_attachments(uid, locators).await?
    };

    for part in &parts {
        let path = out.join(safe_filename(&part.filename));
        std::fs::write(&path, &part.data).with_context(|| format!("writing {}", path.display()))?;
        println!(
            "{} ({}, {} bytes) -> {}",
            part.locator,
            part.media_type,
            part.data.len(),
            path.display()
        );
    }
    if parts.len() < locators.len() {
        println!("{} of {} part(s) could not be saved", locators.len() - parts.len(), locators.len());
    }
    Ok(())
}

async fn cmd_watch(engine: &MailEngine, json: bool) -> anyhow::Result<()> {
    engine
        .set_new_message_handler(move |messages| {
            for message in messages {
                if json {
                    if let Ok(line) = serde_json::to_string(message) {
                        println!("{line}");
                    }
                } else {
                    println!("{:<8} {:<30} {}", message.uid, truncate(&message.from, 28), message.subject);
                }
            }
        })
        .await;

    engine.start_background_sync().await?;
    info!(interval = ?engine.options().poll_interval, "watching for new mail, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    engine.stop_background_sync().await;
    Ok(())
}

fn load_attachment(path: &Path) -> anyhow::Result<OutgoingAttachment> {
    let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(OutgoingAttachment::new(filename, content))
}

/// Keeps only the final path component of a server-supplied filename.
fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}

fn print_messages(messages: &[Message], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No messages found.");
        return Ok(());
    }

    println!("{:<8} {:<32} {:<30} Subject", "UID", "Date", "From");
    println!("{}", "-".repeat(100));
    for message in messages {
        let clip = if message.attachments.is_empty() { "" } else { " [+]" };
        println!(
            "{:<8} {:<32} {:<30} {}{clip}",
            message.uid,
            truncate(&message.date, 31),
            truncate(&message.from, 28),
            truncate(&message.subject, 50),
        );
    }
    println!("\n{} message(s)", messages.len());
    Ok(())
}

fn print_message_detail(message: &Message) {
    println!("UID:        {}", message.uid);
    println!("Date:       {}", message.date);
    println!("From:       {}", message.from);
    println!("Subject:    {}", message.subject);
    println!("Message-ID: {}", message.message_id);
    if let Some(parent) = &message.in_reply_to {
        println!("Reply to:   {parent}");
    }
    for attachment in &message.attachments {
        println!(
            "Attachment: [{}] {} ({}, {} bytes)",
            attachment.locator, attachment.filename, attachment.media_type, attachment.size
        );
    }
    println!("\n{}", message.body);
    if message.truncated {
        println!("[truncated]");
    }
    println!("{}", "=".repeat(72));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
