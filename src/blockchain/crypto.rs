use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

use super::encoding::EncodingError;
use super::transaction::Transaction;

/// Length of a raw `x || y` P-256 public key
const RAW_PUBLIC_KEY_LEN: usize = 64;

/// SEC1 tag for an uncompressed point
const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(#[from] hex::FromHexError),

    #[error("Message encoding error: {0}")]
    MessageError(#[from] EncodingError),
}

/// Represents an ECDSA P-256 signature as hex of the 64-byte `r || s` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(signature.to_bytes()))
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0)?;

        Signature::from_slice(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a hex encoded P-256 public key
///
/// Accepts the raw 64-byte `x || y` form as well as SEC1 compressed (33 bytes)
/// and uncompressed (65 bytes) encodings.
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, CryptoError> {
    let mut bytes = hex::decode(public_key_hex)?;

    if bytes.len() == RAW_PUBLIC_KEY_LEN {
        bytes.insert(0, SEC1_UNCOMPRESSED_TAG);
    }

    VerifyingKey::from_sec1_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Represents a key pair able to sign transactions
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);

        Wallet {
            signing_key,
            verifying_key,
        }
    }

    /// Creates a wallet from an existing 32-byte secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(secret_key_bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        let verifying_key = VerifyingKey::from(&signing_key);

        Ok(Wallet {
            signing_key,
            verifying_key,
        })
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Gets the wallet's public key as hex of the raw 64-byte `x || y` form
    pub fn public_key_hex(&self) -> String {
        let point = self.verifying_key.to_encoded_point(false);
        hex::encode(&point.as_bytes()[1..])
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature: Signature = self.signing_key.sign(message);
        DigitalSignature::from_signature(&signature)
    }

    /// Signs the canonical encoding of a transaction
    pub fn sign_transaction(&self, transaction: &Transaction) -> Result<DigitalSignature, CryptoError> {
        let message = transaction.signing_message()?;
        Ok(self.sign(&message))
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Checks that a transaction was signed by the holder of `public_key_hex`
///
/// Malformed hex, a key that is not on the curve, a badly sized signature and
/// a failed verification all yield `false`.
pub fn verify_transaction_signature(
    public_key_hex: &str,
    signature_hex: &str,
    transaction: &Transaction,
) -> bool {
    let result = parse_public_key(public_key_hex).and_then(|public_key| {
        let message = transaction.signing_message()?;
        verify_signature(&message, &DigitalSignature(signature_hex.to_string()), &public_key)
    });

    match result {
        Ok(verified) => verified,
        Err(err) => {
            log::debug!("signature check failed: {}", err);
            false
        }
    }
}
