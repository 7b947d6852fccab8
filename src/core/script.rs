//! Redeem scripts
//!
//! The two program shapes the wallet produces: a single-key CHECKSIG
//! script and an M-of-N MULTISIG script.

use thiserror::Error;

/// Pushes the number 1; OP_1 + n - 1 pushes n for n in 1..=16
pub const OP_1: u8 = 0x51;

/// Pushes the number 16
pub const OP_16: u8 = 0x60;

pub const OP_CHECKSIG: u8 = 0xAC;

pub const OP_MULTISIG: u8 = 0xAE;

pub const OP_CROSSCHAIN: u8 = 0xAF;

/// Largest signer set a multisig script can express
pub const MAX_MULTISIG_KEYS: usize = (OP_16 - OP_1 + 1) as usize;

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Malformed script: {0}")]
    Malformed(String),
}

/// `len || pubkey || CHECKSIG`
pub fn standard_redeem_script(public_key: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(public_key.len() + 2);
    script.push(public_key.len() as u8);
    script.extend_from_slice(public_key);
    script.push(OP_CHECKSIG);
    script
}

/// Emit an M-of-N multisig script over keys in the given order
pub fn multisig_redeem_script(ordered_keys: &[Vec<u8>], required: usize) -> Result<Vec<u8>, ScriptError> {
    let total = ordered_keys.len();
    if required == 0 || required > total {
        return Err(ScriptError::InvalidThreshold(format!(
            "{} of {} signers",
            required, total
        )));
    }
    if total > MAX_MULTISIG_KEYS {
        return Err(ScriptError::InvalidThreshold(format!(
            "{} signers exceeds {}",
            total, MAX_MULTISIG_KEYS
        )));
    }

    let mut script = Vec::with_capacity(3 + total * 34);
    script.push(OP_1 + (required - 1) as u8);
    for key in ordered_keys {
        script.push(key.len() as u8);
        script.extend_from_slice(key);
    }
    script.push(OP_1 + (total - 1) as u8);
    script.push(OP_MULTISIG);
    Ok(script)
}

/// Decoded multisig script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigScript {
    pub required: usize,
    pub public_keys: Vec<Vec<u8>>,
}

/// Parse a script produced by [`multisig_redeem_script`]
pub fn parse_multisig_script(script: &[u8]) -> Result<MultisigScript, ScriptError> {
    if script.len() < 3 || script[script.len() - 1] != OP_MULTISIG {
        return Err(ScriptError::Malformed("not a multisig script".to_string()));
    }

    let m = script[0];
    let n = script[script.len() - 2];
    if !(OP_1..=OP_16).contains(&m) || !(OP_1..=OP_16).contains(&n) {
        return Err(ScriptError::Malformed("bad signer count opcode".to_string()));
    }

    let body = &script[1..script.len() - 2];
    let mut public_keys = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let len = body[pos] as usize;
        let key = body
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| ScriptError::Malformed("truncated key".to_string()))?;
        public_keys.push(key.to_vec());
        pos += 1 + len;
    }

    if public_keys.len() != (n - OP_1 + 1) as usize {
        return Err(ScriptError::Malformed("signer count mismatch".to_string()));
    }

    Ok(MultisigScript {
        required: (m - OP_1 + 1) as usize,
        public_keys,
    })
}
