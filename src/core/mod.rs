//! Core wallet data types
//!
//! This module contains the fundamental building blocks:
//! - Transactions (asset-tagged outputs, lock time, replace-by-fee)
//! - Redeem scripts (single-signature and M-of-N multisig)
//! - Merkle blocks (header plus partial merkle tree)
//! - Fee policy

pub mod fee;
pub mod merkle_block;
pub mod script;
pub mod transaction;

pub use fee::{fee_for_size, DEFAULT_FEE_PER_KB, MAX_FEE_PER_KB, MIN_FEE_PER_KB};
pub use merkle_block::{BlockError, MerkleBlock, BLOCK_HEADER_SIZE, MAX_TIME_DRIFT};
pub use script::{
    multisig_redeem_script, parse_multisig_script, standard_redeem_script, MultisigScript,
    ScriptError, MAX_MULTISIG_KEYS, OP_1, OP_16, OP_CHECKSIG, OP_CROSSCHAIN, OP_MULTISIG,
};
pub use transaction::{
    AssetId, Attribute, AttributeUsage, OutPoint, Program, Transaction, TransactionBuilder,
    TxHash, TxInput, TxOutput, TxType, SEQUENCE_RBF_MAX, SIGNATURE_PUSH_LEN, TXIN_SEQUENCE,
    TX_MAX_LOCK_HEIGHT, TX_MAX_SIZE, TX_MIN_OUTPUT_AMOUNT, TX_RECHARGE_OUTPUT_SIZE,
    TX_UNCONFIRMED,
};
