//! SPV Wallet CLI Application
//!
//! Offline inspection of wallet files: addresses, balances and unsigned
//! transactions.

use clap::{Parser, Subcommand};
use spv_wallet::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spv-wallet")]
#[command(version = "0.1.0")]
#[command(about = "SPV wallet core: multisig addresses, balances and coin selection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a multisig address
    Multisig {
        /// Required signatures (M)
        #[arg(short, long)]
        required: usize,

        /// Signer public key (hex), once per signer
        #[arg(short, long = "key", required = true)]
        keys: Vec<String>,

        /// Address to check against the derived one
        #[arg(long)]
        verify: Option<String>,
    },

    /// Standard address of a public key
    Address {
        /// Public key (hex)
        #[arg(short, long)]
        pubkey: String,
    },

    /// Show balance and UTXOs of a watched address
    Balance {
        #[command(flatten)]
        wallet: WalletArgs,
    },

    /// Select coins and print the unsigned transaction
    CreateTx {
        #[command(flatten)]
        wallet: WalletArgs,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount to send
        #[arg(long)]
        amount: u64,

        /// Only spend outputs paid to this address
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(clap::Args)]
struct WalletArgs {
    /// Coin config file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Transaction list file (JSON)
    #[arg(short, long)]
    txs: PathBuf,

    /// Wallet address to watch
    #[arg(short, long)]
    address: String,

    /// Current chain height (defaults to the highest confirmed transaction)
    #[arg(long)]
    height: Option<u32>,
}

impl WalletArgs {
    fn load(&self) -> cli::CliResult<spv_wallet::wallet::Wallet> {
        cli::load_wallet(&self.config, &self.txs, &self.address, self.height)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Multisig {
            required,
            keys,
            verify,
        } => cli::cmd_multisig(required, &keys, verify.as_deref()),
        Commands::Address { pubkey } => cli::cmd_address(&pubkey),
        Commands::Balance { wallet } => cli::cmd_balance(&wallet.load()?),
        Commands::CreateTx {
            wallet,
            to,
            amount,
            from,
        } => cli::cmd_create_tx(&wallet.load()?, &to, amount, from.as_deref()),
    }
}
