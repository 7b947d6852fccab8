//! CLI commands for offline wallet inspection
//!
//! Implements the command handlers for the CLI interface. Every command
//! works on files only; nothing touches the network.

use crate::config::CoinConfig;
use crate::core::Transaction;
use crate::crypto::{public_key_to_address, public_key_from_hex};
use crate::multisig::{multisig_address, verify_address};
use crate::wallet::{SingleAddress, Wallet};
use std::fs;
use std::io::BufReader;
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn decode_public_key(hex_key: &str) -> CliResult<Vec<u8>> {
    Ok(public_key_from_hex(hex_key)?.serialize().to_vec())
}

/// Load a watch-only wallet for `address` from config and transaction files
pub fn load_wallet(
    config_path: &Path,
    txs_path: &Path,
    address: &str,
    height: Option<u32>,
) -> CliResult<Wallet> {
    let config = CoinConfig::load(config_path)?;
    let file = fs::File::open(txs_path)?;
    let transactions: Vec<Transaction> = serde_json::from_reader(BufReader::new(file))?;

    let wallet = Wallet::new(
        &config,
        Box::new(SingleAddress::new(address.to_string())),
        transactions,
    )?;
    if let Some(height) = height {
        wallet.set_block_height(height);
    }
    Ok(wallet)
}

/// Derive, and optionally verify, a multisig address
pub fn cmd_multisig(required: usize, keys: &[String], verify: Option<&str>) -> CliResult<()> {
    let keys = keys
        .iter()
        .map(|k| decode_public_key(k))
        .collect::<CliResult<Vec<_>>>()?;

    let address = multisig_address(&keys, required)?;
    println!("🔐 {}-of-{} multisig", required, keys.len());
    println!("   Address: {}", address);

    if let Some(expected) = verify {
        if verify_address(&keys, required, expected)? {
            println!("   ✅ {} matches", expected);
        } else {
            println!("   ❌ {} does not match", expected);
            return Err(format!("address {} does not belong to these signers", expected).into());
        }
    }

    Ok(())
}

/// Standard address of a public key
pub fn cmd_address(pubkey: &str) -> CliResult<()> {
    let public_key = decode_public_key(pubkey)?;
    println!("{}", public_key_to_address(&public_key));
    Ok(())
}

/// Print balance, totals and UTXOs
pub fn cmd_balance(wallet: &Wallet) -> CliResult<()> {
    let utxos = wallet.utxos();

    println!("💰 {} wallet at height {}", wallet.chain_id(), wallet.block_height());
    println!("   Balance: {}", wallet.balance());
    println!("   Received: {}", wallet.total_received());
    println!("   Sent: {}", wallet.total_sent());
    println!("   Transactions: {}", wallet.transaction_count());
    println!("   UTXOs: {}", utxos.len());

    if !utxos.is_empty() {
        println!("\n   Unspent outputs:");
        for utxo in utxos.iter().take(10) {
            println!("   └─ {} = {}", utxo.outpoint(), utxo.amount);
        }
        if utxos.len() > 10 {
            println!("   ... and {} more", utxos.len() - 10);
        }
    }

    Ok(())
}

/// Run coin selection and print the unsigned transaction
pub fn cmd_create_tx(wallet: &Wallet, to: &str, amount: u64, from: Option<&str>) -> CliResult<()> {
    let tx = wallet.create_transaction(from, amount, to, "", "")?;

    log::info!(
        "Built transaction {} with {} inputs, fee {}",
        tx.hash(),
        tx.inputs.len(),
        tx.fee
    );
    println!("{}", serde_json::to_string_pretty(&tx)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubWalletType;
    use crate::core::TransactionBuilder;
    use crate::crypto::KeyPair;
    use tempfile::tempdir;

    #[test]
    fn test_load_wallet_from_files() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("coin.json");
        let txs_path = dir.path().join("txs.json");

        let address = KeyPair::generate().address();
        let mut config = CoinConfig::new("ELA", SubWalletType::Mainchain);
        config.single_address = true;
        config.min_fee = 1;
        config.save(&config_path).unwrap();

        let tx = TransactionBuilder::new()
            .add_output(&address, 5_000)
            .confirmed_at(3, 100)
            .program(vec![0xac], vec![0x40; 65])
            .build();
        fs::write(&txs_path, serde_json::to_string(&vec![tx]).unwrap()).unwrap();

        let wallet = load_wallet(&config_path, &txs_path, &address, Some(4)).unwrap();
        assert_eq!(wallet.balance(), 5_000);
        assert_eq!(wallet.block_height(), 4);
        cmd_balance(&wallet).unwrap();

        let to = KeyPair::generate().address();
        cmd_create_tx(&wallet, &to, 1_000, None).unwrap();
        assert!(cmd_create_tx(&wallet, &to, 10_000, None).is_err());
    }

    #[test]
    fn test_multisig_command_verifies() {
        let keys: Vec<String> = (0..3).map(|_| KeyPair::generate().public_key_hex()).collect();
        let decoded: Vec<Vec<u8>> = keys.iter().map(|k| hex::decode(k).unwrap()).collect();
        let address = multisig_address(&decoded, 2).unwrap();

        cmd_multisig(2, &keys, Some(&address)).unwrap();
        assert!(cmd_multisig(3, &keys, Some(&address)).is_err());
        assert!(cmd_multisig(2, &["zz".to_string()], None).is_err());
    }
}
