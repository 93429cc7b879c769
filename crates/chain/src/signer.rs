//! Transaction signing.
//!
//! The keeper signs locally and broadcasts raw bytes, so a send never has
//! to hold a wallet-filled provider. Nonces are handed out by
//! [`NonceManager`] from a single chain read per submission pass.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::error::ChainError;

/// Signs fully populated transaction requests.
#[async_trait]
pub trait TransactionSigner: Send + Sync + Debug {
    /// Account that signs and pays for transactions.
    fn address(&self) -> Address;

    /// Sign a transaction and return its EIP-2718 encoding.
    async fn sign(&self, tx: TransactionRequest) -> Result<Bytes, ChainError>;
}

/// Signer backed by a local private key (usually decrypted from a keystore).
#[derive(Clone)]
pub struct KeystoreSigner {
    wallet: EthereumWallet,
    address: Address,
}

impl KeystoreSigner {
    /// Wrap a local private key signer.
    pub fn new(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            wallet: EthereumWallet::from(signer),
            address,
        }
    }

    /// Create from a hex private key (with or without 0x prefix).
    pub fn from_private_key(private_key: &str) -> Result<Self, ChainError> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str
            .parse()
            .map_err(|e| ChainError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer))
    }
}

#[async_trait]
impl TransactionSigner for KeystoreSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: TransactionRequest) -> Result<Bytes, ChainError> {
        let envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(envelope.encoded_2718().into())
    }
}

impl Debug for KeystoreSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Local nonce counter for one submission pass.
///
/// Seeded from the chain's pending nonce; each dispatched transaction takes
/// the next value.
#[derive(Debug)]
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    /// Create a counter starting at the chain's pending nonce.
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Take the next nonce.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Nonce the next transaction would receive.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;

    // Well-known development key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_nonce_manager() {
        let manager = NonceManager::new(10);

        assert_eq!(manager.current(), 10);
        assert_eq!(manager.next(), 10);
        assert_eq!(manager.current(), 11);
        assert_eq!(manager.next(), 11);
        assert_eq!(manager.current(), 12);
    }

    #[test]
    fn test_signer_address_from_key() {
        let signer = KeystoreSigner::from_private_key(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        // Prefix is optional
        let bare = KeystoreSigner::from_private_key(TEST_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(bare.address(), signer.address());
    }

    #[test]
    fn test_signer_rejects_bad_key() {
        let result = KeystoreSigner::from_private_key("0xnot-a-key");
        assert!(matches!(result, Err(ChainError::Signing(_))));
    }

    #[tokio::test]
    async fn test_sign_eip1559_transaction() {
        let signer = KeystoreSigner::from_private_key(TEST_KEY).unwrap();
        let tx = TransactionRequest::default()
            .with_from(signer.address())
            .with_to(Address::repeat_byte(0x11))
            .with_input(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
            .with_nonce(7)
            .with_chain_id(1)
            .with_gas_limit(120_000)
            .with_max_fee_per_gas(100_000_000_000)
            .with_max_priority_fee_per_gas(2_000_000_000);

        let raw = signer.sign(tx).await.unwrap();
        assert_eq!(raw[0], 0x02);

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        assert!(matches!(envelope, TxEnvelope::Eip1559(_)));
    }

    #[tokio::test]
    async fn test_sign_legacy_transaction() {
        let signer = KeystoreSigner::from_private_key(TEST_KEY).unwrap();
        let tx = TransactionRequest::default()
            .with_from(signer.address())
            .with_to(Address::repeat_byte(0x11))
            .with_nonce(0)
            .with_chain_id(1)
            .with_gas_limit(21_000)
            .with_gas_price(5_000_000_000);

        let raw = signer.sign(tx).await.unwrap();
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        assert!(matches!(envelope, TxEnvelope::Legacy(_)));
    }
}
