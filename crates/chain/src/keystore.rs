//! Encrypted keystore files.
//!
//! Keys are stored as standard Web3 Secret Storage JSON files, one per
//! account, named by the lowercase hex address.

use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::{debug, info};

use crate::error::ChainError;
use crate::signer::KeystoreSigner;

/// Encrypt a hex private key into a new keystore file under `dir`.
///
/// Returns the address the key controls.
pub fn import_private_key(
    dir: &Path,
    private_key: &str,
    password: &str,
) -> Result<Address, ChainError> {
    let key_hex = private_key.trim().trim_start_matches("0x");
    let key = hex::decode(key_hex)
        .map_err(|e| ChainError::Keystore(format!("private key is not hex: {e}")))?;
    let address = PrivateKeySigner::from_slice(&key)
        .map_err(|e| ChainError::Keystore(format!("invalid private key: {e}")))?
        .address();

    fs::create_dir_all(dir).map_err(|e| {
        ChainError::Keystore(format!("cannot create {}: {e}", dir.display()))
    })?;

    let name = hex::encode(address);
    let mut rng = rand::thread_rng();
    PrivateKeySigner::encrypt_keystore(dir, &mut rng, &key, password, Some(name.as_str()))
        .map_err(|e| ChainError::Keystore(e.to_string()))?;

    info!(address = %address, dir = %dir.display(), "Key imported into keystore");
    Ok(address)
}

/// Find the keystore file for `address` under `dir`.
pub fn find_keystore(dir: &Path, address: Address) -> Result<PathBuf, ChainError> {
    let needle = hex::encode(address);
    let entries = fs::read_dir(dir)
        .map_err(|e| ChainError::Keystore(format!("cannot read {}: {e}", dir.display())))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if matches {
            debug!(path = %path.display(), "Keystore file found");
            return Ok(path);
        }
    }

    Err(ChainError::Keystore(format!(
        "no keystore for {address} in {}",
        dir.display()
    )))
}

/// Decrypt the keystore for `address` into a signer.
pub fn load_signer(
    dir: &Path,
    address: Address,
    password: &str,
) -> Result<KeystoreSigner, ChainError> {
    let path = find_keystore(dir, address)?;
    let signer = PrivateKeySigner::decrypt_keystore(&path, password)
        .map_err(|e| ChainError::Keystore(format!("cannot unlock {}: {e}", path.display())))?;

    if signer.address() != address {
        return Err(ChainError::Keystore(format!(
            "keystore {} holds {}, expected {address}",
            path.display(),
            signer.address()
        )));
    }

    info!(address = %address, "Wallet unlocked");
    Ok(KeystoreSigner::new(signer))
}
