//! Signer capability.
//!
//! A signer is built from the configured key on demand and never touches the
//! network. A missing or unparseable key is an [`AuthError`].

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use schoolnet_core::AuthError;
use std::str::FromStr;
use zeroize::Zeroize;

/// Build the local signer for `chain_id` from a hex-encoded key.
pub fn load_signer(private_key: Option<&str>, chain_id: u64) -> Result<LocalWallet, AuthError> {
    let key = private_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AuthError::SignerUnavailable("no signing key configured".into()))?;

    let mut digits = key.strip_prefix("0x").unwrap_or(key).to_string();
    let parsed = LocalWallet::from_str(&digits);
    digits.zeroize();

    // The parse error may echo key material; report only that it failed.
    let wallet = parsed.map_err(|_| AuthError::SignerUnavailable("configured signing key is not a valid secp256k1 key".into()))?;
    Ok(wallet.with_chain_id(chain_id))
}

/// Address the configured key signs as, if any.
pub fn signer_address(private_key: Option<&str>, chain_id: u64) -> Result<Address, AuthError> {
    load_signer(private_key, chain_id).map(|w| w.address())
}
