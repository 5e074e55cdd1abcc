//! Custody Vault - encrypted key custody and exchange withdrawals
//!
//! # WARNING
//! - Withdrawals move real funds and cannot be reversed.
//! - The vault password is never stored; losing it loses the secrets.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use custody_vault::cli::commands::{self, ExchangeFields, WithdrawArgs};
use custody_vault::config::{Config, LoggingConfig};

/// Custody Vault - encrypted key custody and exchange withdrawals
#[derive(Parser)]
#[command(name = "custody")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Vault password sealed with the transit key; prompted when absent
    #[arg(long, env = "CUSTODY_SEALED_PASSWORD", hide_env_values = true, global = true)]
    sealed_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange credentials and exchange calls
    Exchange {
        #[command(subcommand)]
        action: ExchangeAction,
    },

    /// Wallet custody
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Source to target address mappings
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Show current configuration (secrets masked)
    Config,
}

/// Credential fields; secrets are transit-sealed and prompted when absent
#[derive(Args)]
struct FieldArgs {
    /// Platform: binance, bitget, okx, gate, bybit
    #[arg(long)]
    platform: Option<String>,

    /// Transit-sealed API key
    #[arg(long)]
    apikey: Option<String>,

    /// Transit-sealed API secret
    #[arg(long)]
    secret: Option<String>,

    /// Transit-sealed API passphrase (Bitget, OKX)
    #[arg(long)]
    passphrase: Option<String>,

    /// Proxy: user:pwd@ip:port, ip:port:user:pwd or ip:port
    #[arg(long)]
    ip: Option<String>,
}

impl From<FieldArgs> for ExchangeFields {
    fn from(args: FieldArgs) -> Self {
        Self {
            platform: args.platform,
            apikey: args.apikey,
            secret: args.secret,
            passphrase: args.passphrase,
            ip: args.ip,
        }
    }
}

#[derive(Subcommand)]
enum ExchangeAction {
    /// List exchange names and platforms
    Names,

    /// Show one exchange with transit-sealed secrets
    Show { name: String },

    /// Store a new exchange
    Add {
        name: String,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Rotate credentials of an exchange
    Update {
        name: String,
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete an exchange
    Delete {
        name: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Withdraw from an exchange
    Withdraw {
        /// Exchange name
        exchange: String,

        /// Coin symbol (e.g. USDT)
        coin: String,

        /// Amount to withdraw, as a plain decimal (e.g. 12.5)
        amount: String,

        /// Destination address
        to_address: String,

        /// Withdrawal network (e.g. ERC20, TRC20)
        #[arg(long)]
        network: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Withdrawal fee for a coin on a network
    Fee {
        exchange: String,
        coin: String,
        network: String,
    },

    /// Balance of one coin, or every non-zero coin
    Balance {
        exchange: String,
        coin: Option<String>,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// List projects
    Projects,

    /// Wallet counts per project
    Stats,

    /// List wallets by address or project
    List {
        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Show one wallet
    Show { address: String },

    /// Import `address[,privateKey[,phrase]]` lines from a file
    Import {
        file: PathBuf,

        #[arg(long)]
        project: String,

        #[arg(long, default_value = "")]
        remark: String,

        /// Keys and phrases in the file are transit-sealed
        #[arg(long)]
        sealed: bool,
    },

    /// Generate wallets
    Create {
        /// Wallet kind: evm or sol
        #[arg(long, default_value = "sol")]
        kind: String,

        #[arg(long, default_value = "1")]
        count: usize,

        #[arg(long)]
        project: String,

        #[arg(long, default_value = "")]
        remark: String,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// Import `source,target` lines from a file
    Import {
        file: PathBuf,

        #[arg(long, default_value = "")]
        project: String,

        #[arg(long, default_value = "")]
        remark: String,
    },

    /// Look up targets for one or more source addresses
    Query {
        #[arg(required = true)]
        sources: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    let password = cli.sealed_password.as_deref();

    // Execute command
    let result = match cli.command {
        Commands::Exchange { action } => match action {
            ExchangeAction::Names => commands::exchange_names(&config).await,
            ExchangeAction::Show { name } => commands::exchange_show(&config, &name, password).await,
            ExchangeAction::Add { name, fields } => {
                commands::exchange_add(&config, &name, fields.into(), password).await
            }
            ExchangeAction::Update { name, fields } => {
                commands::exchange_update(&config, &name, fields.into(), password).await
            }
            ExchangeAction::Delete { name, force } => {
                commands::exchange_delete(&config, &name, force).await
            }
            ExchangeAction::Withdraw {
                exchange,
                coin,
                amount,
                to_address,
                network,
                force,
            } => {
                let args = WithdrawArgs {
                    exchange,
                    coin,
                    amount,
                    to_address,
                    network,
                };
                commands::exchange_withdraw(&config, args, password, force).await
            }
            ExchangeAction::Fee {
                exchange,
                coin,
                network,
            } => commands::exchange_fee(&config, &exchange, &coin, &network, password).await,
            ExchangeAction::Balance { exchange, coin } => {
                commands::exchange_balance(&config, &exchange, coin.as_deref(), password).await
            }
        },
        Commands::Wallet { action } => match action {
            WalletAction::Projects => commands::wallet_projects(&config).await,
            WalletAction::Stats => commands::wallet_stats(&config).await,
            WalletAction::List { address, project } => {
                commands::wallet_list(&config, address.as_deref(), project.as_deref(), password).await
            }
            WalletAction::Show { address } => commands::wallet_show(&config, &address, password).await,
            WalletAction::Import {
                file,
                project,
                remark,
                sealed,
            } => commands::wallet_import(&config, &file, &project, &remark, sealed, password).await,
            WalletAction::Create {
                kind,
                count,
                project,
                remark,
            } => commands::wallet_create(&config, &kind, count, &project, &remark, password).await,
        },
        Commands::Mapping { action } => match action {
            MappingAction::Import {
                file,
                project,
                remark,
            } => commands::mapping_import(&config, &file, &project, &remark).await,
            MappingAction::Query { sources } => commands::mapping_query(&config, &sources).await,
        },
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Install the global subscriber; logs go to stderr
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("custody_vault={}", logging.level)));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}
