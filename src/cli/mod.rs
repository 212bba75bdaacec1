//! CLI command implementations.
//!
//! The binary parses [`Cli`] and hands it to [`run`]. Commands write their
//! output to the supplied writer; logs go to stderr through `tracing`.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `identity add` | Register a new identity |
//! | `identity list` | List active identities |
//! | `classify` | Classify one piece of content as new or duplicate |
//! | `records` | List records submitted by an identity or its team |
//! | `token` | Obtain an access token and show its expiry |
//! | `config` | Show the effective configuration with secrets redacted |
//!
//! # Example Usage
//!
//! ```bash
//! wechat-dedup identity add oX1_user "Alex" --supervisor oX9_lead
//! wechat-dedup classify oX1_user https://mmbiz.qpic.cn/sz_mmbiz_jpg/abc123/0
//! wechat-dedup records oX9_lead --days 7 --supervised
//! ```

mod config;
mod content;
mod identity;
mod token;

use crate::config::AppConfig;
use crate::storage::{ContentStore, IdentityStore, InMemoryStore, SqliteStore};
use crate::{Error, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Duplicate detection, identity registry and access-token lifecycle for a
/// WeChat webhook.
#[derive(Debug, Parser)]
#[command(name = "wechat-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "WECHAT_DEDUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use a throwaway in-memory store instead of the database file.
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage registered identities.
    Identity {
        /// Identity action.
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Classify one piece of content.
    Classify {
        /// Sender identity key.
        owner: String,

        /// Content locator (picture URL).
        locator: String,

        /// Explicit fingerprint instead of deriving it from the URL.
        #[arg(short, long)]
        fingerprint: Option<String>,
    },

    /// List records.
    Records {
        /// Identity key.
        owner: String,

        /// How many days back to look.
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// List records of everyone `owner` supervises instead.
        #[arg(long)]
        supervised: bool,
    },

    /// Obtain an access token.
    Token {
        /// How long to wait for a token.
        #[arg(long, default_value = "15")]
        wait_secs: u64,
    },

    /// Show the effective configuration.
    Config,
}

/// Identity subcommands.
#[derive(Debug, Subcommand)]
pub enum IdentityAction {
    /// Register a new identity.
    Add {
        /// Identity key (`OpenID`).
        key: String,

        /// Display name.
        name: String,

        /// Supervisor's identity key.
        #[arg(short, long)]
        supervisor: Option<String>,
    },

    /// List active identities.
    List,
}

/// Store handles shared by the commands.
pub(crate) struct Stores {
    pub content: Arc<dyn ContentStore>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Stores {
    fn open(config: &AppConfig, in_memory: bool) -> Result<Self> {
        if in_memory {
            let store = Arc::new(InMemoryStore::new());
            return Ok(Self {
                content: store.clone(),
                identities: store,
            });
        }
        let store = Arc::new(SqliteStore::open(&config.database.path)?);
        Ok(Self {
            content: store.clone(),
            identities: store,
        })
    }
}

/// Runs the parsed command.
///
/// # Errors
///
/// Returns the command's error, or an error if `out` cannot be written.
pub async fn run(cli: Cli, config: AppConfig, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Command::Config => config::show(&config, out),
        Command::Token { wait_secs } => token::show(&config, wait_secs, out).await,
        Command::Identity { action } => {
            let stores = Stores::open(&config, cli.in_memory)?;
            match action {
                IdentityAction::Add {
                    key,
                    name,
                    supervisor,
                } => identity::add(&stores, &config, &key, &name, supervisor.as_deref(), out).await,
                IdentityAction::List => identity::list(&stores, out).await,
            }
        },
        Command::Classify {
            owner,
            locator,
            fingerprint,
        } => {
            let stores = Stores::open(&config, cli.in_memory)?;
            content::classify(&stores, &config, &owner, &locator, fingerprint.as_deref(), out).await
        },
        Command::Records {
            owner,
            days,
            supervised,
        } => {
            let stores = Stores::open(&config, cli.in_memory)?;
            content::records(&stores, &owner, days, supervised, out).await
        },
    }
}

fn write_err(e: std::io::Error) -> Error {
    Error::operation("write_output", e)
}
