use crate::core::ScriptError;
use crate::crypto::KeyError;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Create transaction error: {0}")]
    CreateTransaction(String),
    #[error("Balance not enough: have {available}, need {required}")]
    BalanceNotEnough { available: u64, required: u64 },
    #[error("Transaction size exceeds limit, max amount {max_amount}")]
    CreateTransactionExceedSize { max_amount: u64 },
    #[error("Wrong account type: {0}")]
    WrongAccountType(String),
    #[error("Sign error: {0}")]
    Sign(String),
    #[error("Wrong password")]
    WrongPassword,
    #[error("Wallet error: {0}")]
    Wallet(String),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
