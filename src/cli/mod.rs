//! Command-line interface

pub mod commands;

pub use commands::{cmd_address, cmd_balance, cmd_create_tx, cmd_multisig, load_wallet, CliResult};
