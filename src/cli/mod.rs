//! Command-line interface.

pub mod commands;
pub mod doctor;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::moderation::{DEFAULT_LEADERBOARD_LIMIT, ModerationService};
use crate::notice::{Notice, NoticeLevel, Notifier};
use crate::storage::FileStore;
use crate::wallet::{
    DisconnectIntent, InjectedProvider, ProviderAdapter, RpcWalletProvider, SessionHandle,
    WalletSession,
};

/// File under the arbiter home holding the disconnect flag.
pub const STORAGE_FILE: &str = "storage.json";

#[derive(Parser, Debug)]
#[command(name = "arbiter", version, about = "Wallet session and moderation client")]
pub struct Cli {
    /// TOML config overlay (default: ~/.arbiter/config.toml)
    #[arg(long, global = true, env = "ARBITER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write connection settings to ~/.arbiter/.env
    Init {
        #[arg(long)]
        contract_address: Option<String>,
        #[arg(long)]
        wallet_rpc_url: Option<String>,
        #[arg(long)]
        rpc_url: Option<String>,
    },
    /// Check configuration and endpoint reachability
    Doctor {
        /// Exit non-zero when any check fails
        #[arg(long)]
        strict: bool,
    },
    /// Show the wallet session
    Status,
    /// Connect the wallet and switch to the arbitration network
    Connect,
    /// Forget the connected address
    Disconnect,
    /// Pick a different wallet account
    SwitchAccount,
    /// Follow session changes until interrupted
    Watch,
    /// List moderation cases
    Cases {
        /// Only resolved cases
        #[arg(long, conflicts_with = "open")]
        resolved: bool,
        /// Only unresolved cases
        #[arg(long)]
        open: bool,
        /// Only cases filed by this address
        #[arg(long)]
        owner: Option<String>,
    },
    /// File an incident report for arbitration
    FileReport {
        /// Description or evidence link
        #[arg(long)]
        report: String,
        /// Ruleset to judge the report against
        #[arg(long)]
        rules: String,
    },
    /// Trigger consensus on a case
    Arbitrate { case_id: String },
    /// Top arbiters by reputation
    Leaderboard {
        #[arg(long, default_value_t = DEFAULT_LEADERBOARD_LIMIT)]
        limit: usize,
    },
    /// Reputation points of an address (default: the connected one)
    Reputation { address: Option<String> },
}

/// Running session plus the services commands operate on.
pub struct App {
    pub config: Config,
    pub notifier: Notifier,
    pub session: WalletSession,
    pub moderation: ModerationService,
    notices: broadcast::Receiver<Notice>,
}

impl App {
    /// Wire the wallet provider, flag storage, session and moderation
    /// service from `config`, then initialize the session.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let notifier = Notifier::new();
        let notices = notifier.subscribe();

        let provider: Option<Arc<dyn InjectedProvider>> = match &config.wallet.rpc_url {
            Some(url) => {
                let provider: Arc<dyn InjectedProvider> =
                    RpcWalletProvider::spawn(url.clone(), config.wallet.poll_interval);
                Some(provider)
            }
            None => None,
        };
        let adapter = ProviderAdapter::new(provider, config.network.clone());
        let store = FileStore::new(config.home.join(STORAGE_FILE));
        let intent = DisconnectIntent::new(Arc::new(store));

        let session = WalletSession::start(adapter, intent, notifier.clone());
        session.handle().initialize().await?;

        let moderation = ModerationService::from_config(session.handle(), &config, notifier.clone());

        Ok(Self {
            config,
            notifier,
            session,
            moderation,
            notices,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.session.handle()
    }

    /// Print every notice published so far.
    pub fn flush_notices(&mut self) {
        loop {
            match self.notices.try_recv() {
                Ok(notice) => print_notice(&notice),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} notices", skipped);
                }
                Err(_) => break,
            }
        }
    }

    pub async fn next_notice(&mut self) -> Option<Notice> {
        loop {
            match self.notices.recv().await {
                Ok(notice) => return Some(notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} notices", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub async fn shutdown(mut self) {
        self.flush_notices();
        self.session.shutdown().await;
    }
}

pub fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Loading => "...",
        NoticeLevel::Cancelled => "cancelled",
        NoticeLevel::ConfigError => "config",
    };
    match &notice.description {
        Some(description) => eprintln!("[{tag}] {}: {description}", notice.title),
        None => eprintln!("[{tag}] {}", notice.title),
    }
    if let Some(action) = &notice.action {
        eprintln!("       {}: {}", action.label, action.url);
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Init {
        contract_address,
        wallet_rpc_url,
        rpc_url,
    } = &cli.command
    {
        return commands::init(
            contract_address.as_deref(),
            wallet_rpc_url.as_deref(),
            rpc_url.as_deref(),
        );
    }

    let config = Config::from_env_with_toml(cli.config.as_deref())?;

    if let Command::Doctor { strict } = &cli.command {
        return doctor::run_doctor_command(&config, *strict).await;
    }

    let mut app = App::start(config).await?;
    let result = commands::dispatch(&mut app, cli.command, cli.json).await;
    app.shutdown().await;
    result
}
