//! Transaction model for the wallet
//!
//! Transactions as the wallet sees them after wire parsing: inputs that
//! reference previous outputs, asset-tagged outputs paid to addresses,
//! attributes, and the signing programs. Also covers:
//! - Deterministic serialization (hash, signing data, byte size)
//! - Lock time and replace-by-fee signalling
//! - Confirmation height bookkeeping

use crate::core::script::parse_multisig_script;
use crate::crypto::{double_sha256, sha256};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Largest transaction the wallet will build or treat as spendable (bytes)
pub const TX_MAX_SIZE: usize = 100_000;

/// Outputs below this amount are dust
pub const TX_MIN_OUTPUT_AMOUNT: u64 = 546;

/// Block height of a transaction not yet included in a block
pub const TX_UNCONFIRMED: u32 = i32::MAX as u32;

/// Lock times below this value are block heights, above are timestamps
pub const TX_MAX_LOCK_HEIGHT: u32 = 500_000_000;

/// Default input sequence; disables lock time
pub const TXIN_SEQUENCE: u32 = u32::MAX;

/// Any input sequence below this value signals replace-by-fee
pub const SEQUENCE_RBF_MAX: u32 = u32::MAX - 1;

/// Serialized size reserved for a change output
pub const TX_RECHARGE_OUTPUT_SIZE: usize = 32 + 8 + 4 + 1 + 34;

/// Length-prefixed compact signature inside a program parameter
pub const SIGNATURE_PUSH_LEN: usize = 65;

/// Hex form of the chain's native asset id
pub const SYSTEM_ASSET_ID_HEX: &str =
    "a3d0eaa466df74983b5d7c543de6904f4c9418ead5ffd6d25814234a96db37b0";

// =============================================================================
// Hash types
// =============================================================================

macro_rules! hash_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hash_newtype!(TxHash, "Transaction hash (double SHA-256 of the unsigned serialization)");
hash_newtype!(AssetId, "Identifier of the asset an output carries");

impl AssetId {
    /// The chain's native asset
    pub fn system() -> Self {
        Self::from_hex(SYSTEM_ASSET_ID_HEX).unwrap_or_default()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Serialization helpers
// =============================================================================

/// Bitcoin-style variable length integer
pub(crate) fn put_var_int(buf: &mut BytesMut, n: u64) {
    match n {
        0..=0xFC => buf.put_u8(n as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(0xFD);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(0xFE);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xFF);
            buf.put_u64_le(n);
        }
    }
}

fn put_var_bytes(buf: &mut BytesMut, data: &[u8]) {
    put_var_int(buf, data.len() as u64);
    buf.put_slice(data);
}

// =============================================================================
// Transaction parts
// =============================================================================

/// Kind of transaction payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TxType {
    CoinBase,
    #[default]
    TransferAsset,
    TransferCrossChainAsset,
}

impl TxType {
    fn code(&self) -> u8 {
        match self {
            TxType::CoinBase => 0x00,
            TxType::TransferAsset => 0x02,
            TxType::TransferCrossChainAsset => 0x08,
        }
    }
}

/// Purpose of a transaction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeUsage {
    Nonce,
    Confirmations,
    Memo,
    Description,
}

impl AttributeUsage {
    fn code(&self) -> u8 {
        match self {
            AttributeUsage::Nonce => 0x00,
            AttributeUsage::Confirmations => 0x92,
            AttributeUsage::Memo => 0x81,
            AttributeUsage::Description => 0x90,
        }
    }
}

/// Free-form data attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub usage: AttributeUsage,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction holding the spent output
    pub prev_hash: TxHash,
    /// Index of the spent output
    pub index: u32,
    /// Sequence number for replace-by-fee and lock time
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    /// Address the spent output was paid to, when known
    #[serde(default)]
    pub address: String,
}

fn default_sequence() -> u32 {
    TXIN_SEQUENCE
}

impl TxInput {
    pub fn new(prev_hash: TxHash, index: u32) -> Self {
        Self {
            prev_hash,
            index,
            sequence: TXIN_SEQUENCE,
            address: String::new(),
        }
    }

    /// Check if this input signals replace-by-fee
    pub fn signals_rbf(&self) -> bool {
        self.sequence < SEQUENCE_RBF_MAX
    }

    /// The outpoint this input spends
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            hash: self.prev_hash,
            index: self.index,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Recipient address
    pub address: String,
    /// Amount in the asset's smallest unit
    pub amount: u64,
    /// Asset carried by this output
    #[serde(default = "AssetId::system")]
    pub asset_id: AssetId,
    #[serde(default)]
    pub output_lock: u32,
}

impl TxOutput {
    pub fn new(address: &str, amount: u64, asset_id: AssetId) -> Self {
        Self {
            address: address.to_string(),
            amount,
            asset_id,
            output_lock: 0,
        }
    }
}

/// Redeem script plus the signatures satisfying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(with = "hex_bytes")]
    pub code: Vec<u8>,
    /// Concatenated signature pushes
    #[serde(with = "hex_bytes")]
    pub parameter: Vec<u8>,
}

impl Program {
    /// Append one signature push
    pub fn push_signature(&mut self, signature: &[u8]) {
        self.parameter.push(signature.len() as u8);
        self.parameter.extend_from_slice(signature);
    }

    pub fn signature_count(&self) -> usize {
        self.parameter.len() / SIGNATURE_PUSH_LEN
    }

    /// Enough signatures for the script's threshold
    pub fn is_complete(&self) -> bool {
        match parse_multisig_script(&self.code) {
            Ok(script) => self.signature_count() >= script.required,
            Err(_) => !self.parameter.is_empty(),
        }
    }
}

/// Reference to a single transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: TxHash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: TxHash, index: u32) -> Self {
        Self { hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A wallet transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub tx_type: TxType,
    #[serde(default)]
    pub payload_version: u8,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub lock_time: u32,
    #[serde(default)]
    pub programs: Vec<Program>,
    /// Height of the including block, `TX_UNCONFIRMED` until then
    #[serde(default = "default_block_height")]
    pub block_height: u32,
    /// Timestamp of the including block (or first sight)
    #[serde(default)]
    pub timestamp: u32,
    /// Fee decided by the builder; informational
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub remark: String,
}

fn default_block_height() -> u32 {
    TX_UNCONFIRMED
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Transaction {
    /// Create a new unconfirmed, unsigned transfer
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            attributes: Vec::new(),
            inputs,
            outputs,
            lock_time: 0,
            programs: Vec::new(),
            block_height: TX_UNCONFIRMED,
            timestamp: 0,
            fee: 0,
            remark: String::new(),
        }
    }

    fn write_unsigned(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tx_type.code());
        buf.put_u8(self.payload_version);

        put_var_int(buf, self.attributes.len() as u64);
        for attribute in &self.attributes {
            buf.put_u8(attribute.usage.code());
            put_var_bytes(buf, &attribute.data);
        }

        put_var_int(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.put_slice(input.prev_hash.as_bytes());
            buf.put_u32_le(input.index);
            buf.put_u32_le(input.sequence);
        }

        put_var_int(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.put_slice(output.asset_id.as_bytes());
            buf.put_u64_le(output.amount);
            buf.put_u32_le(output.output_lock);
            put_var_bytes(buf, output.address.as_bytes());
        }

        buf.put_u32_le(self.lock_time);
    }

    /// Serialization without programs (what gets hashed and signed)
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_unsigned(&mut buf);
        buf.to_vec()
    }

    /// Full serialization including programs
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_unsigned(&mut buf);
        put_var_int(&mut buf, self.programs.len() as u64);
        for program in &self.programs {
            put_var_bytes(&mut buf, &program.code);
            put_var_bytes(&mut buf, &program.parameter);
        }
        buf.to_vec()
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        self.to_bytes().len()
    }

    /// Transaction hash
    pub fn hash(&self) -> TxHash {
        TxHash(double_sha256(&self.unsigned_bytes()))
    }

    /// Digest every signature commits to
    pub fn signing_data(&self) -> Vec<u8> {
        sha256(&self.unsigned_bytes())
    }

    /// At least one program, and every program carries enough signatures
    pub fn is_signed(&self) -> bool {
        !self.programs.is_empty() && self.programs.iter().all(|p| p.is_complete())
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_height != TX_UNCONFIRMED
    }

    /// Get total output amount
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Check if any input signals replace-by-fee
    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(|i| i.signals_rbf())
    }

    /// Any output strictly below `min_amount`
    pub fn has_dust_output(&self, min_amount: u64) -> bool {
        self.outputs.iter().any(|o| o.amount < min_amount)
    }

    /// Whether the lock time still lies in the future
    ///
    /// Only inputs with a non-final sequence enable the lock time. Height
    /// locks must be reachable by the next block; any lock value past the
    /// current wall clock is in the future.
    pub fn lock_time_in_future(&self, block_height: u32, now: u64) -> bool {
        self.inputs.iter().any(|input| {
            input.sequence < TXIN_SEQUENCE
                && ((self.lock_time < TX_MAX_LOCK_HEIGHT
                    && self.lock_time as u64 > block_height as u64 + 1)
                    || self.lock_time as u64 > now)
        })
    }

    /// Add an attribute (nonce, memo, ...)
    pub fn add_attribute(&mut self, usage: AttributeUsage, data: Vec<u8>) {
        self.attributes.push(Attribute { usage, data });
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Fluent builder for hand-assembled transactions
pub struct TransactionBuilder {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    enable_rbf: bool,
    block_height: u32,
    timestamp: u32,
    programs: Vec<Program>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            enable_rbf: false,
            block_height: TX_UNCONFIRMED,
            timestamp: 0,
            programs: Vec::new(),
        }
    }

    /// Add an input spending `hash:index`
    pub fn add_input(mut self, hash: TxHash, index: u32) -> Self {
        let mut input = TxInput::new(hash, index);
        if self.enable_rbf {
            input.sequence = SEQUENCE_RBF_MAX - 1;
        }
        self.inputs.push(input);
        self
    }

    /// Add an input with custom sequence
    pub fn add_input_with_sequence(mut self, hash: TxHash, index: u32, sequence: u32) -> Self {
        self.inputs.push(TxInput {
            sequence,
            ..TxInput::new(hash, index)
        });
        self
    }

    /// Add an output of the native asset
    pub fn add_output(mut self, address: &str, amount: u64) -> Self {
        self.outputs
            .push(TxOutput::new(address, amount, AssetId::system()));
        self
    }

    /// Set lock time (block height or timestamp)
    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Enable replace-by-fee
    pub fn with_rbf(mut self) -> Self {
        self.enable_rbf = true;
        for input in &mut self.inputs {
            if input.sequence == TXIN_SEQUENCE {
                input.sequence = SEQUENCE_RBF_MAX - 1;
            }
        }
        self
    }

    /// Mark as included at `height`
    pub fn confirmed_at(mut self, height: u32, timestamp: u32) -> Self {
        self.block_height = height;
        self.timestamp = timestamp;
        self
    }

    /// Attach a program
    pub fn program(mut self, code: Vec<u8>, parameter: Vec<u8>) -> Self {
        self.programs.push(Program { code, parameter });
        self
    }

    pub fn build(self) -> Transaction {
        let mut tx = Transaction::new(self.inputs, self.outputs);
        tx.lock_time = self.lock_time;
        tx.block_height = self.block_height;
        tx.timestamp = self.timestamp;
        tx.programs = self.programs;
        tx
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
