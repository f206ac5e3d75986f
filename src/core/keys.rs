//! Shared secret handling and key derivation.
//!
//! The client's shared secret is expanded once with HKDF-SHA256 into every key
//! the station needs for that registration. The secret itself is zeroized as
//! soon as the expansion is done.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, StationError};

/// Length of the client shared secret in bytes
pub const SHARED_SECRET_LEN: usize = 32;

/// Fixed HKDF salt shared with registration clients
const KEY_SALT: &[u8] = b"conjureconjureconjureconjure";

/// HKDF info string for the Min transport tag
const TRANSPORT_TAG_INFO: &[u8] = b"MinTransportHMACString";

const FSP_KEY_LEN: usize = 16;
const FSP_IV_LEN: usize = 12;
const VSP_KEY_LEN: usize = 16;
const VSP_IV_LEN: usize = 12;
const MASTER_SECRET_LEN: usize = 48;
const PHANTOM_SEED_LEN: usize = 16;
const KEY_MATERIAL_LEN: usize =
    FSP_KEY_LEN + FSP_IV_LEN + VSP_KEY_LEN + VSP_IV_LEN + MASTER_SECRET_LEN + PHANTOM_SEED_LEN;

/// Per-client shared secret as received on the wire
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn new(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy a secret out of a slice, failing on any length other than 32
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SHARED_SECRET_LEN] = bytes.try_into().map_err(|_| {
            StationError::DerivationError(format!(
                "shared secret must be {SHARED_SECRET_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Fresh random secret, as a registrar would generate for a client
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SHARED_SECRET_LEN];
        getrandom::fill(&mut bytes)
            .map_err(|e| StationError::DerivationError(format!("rng failure: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }

    /// Consume the secret, producing the registration keys.
    pub fn into_keys(self) -> Result<DerivedKeys> {
        derive_keys(&self.0)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Key material bound to one registration
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    pub fsp_key: [u8; FSP_KEY_LEN],
    pub fsp_iv: [u8; FSP_IV_LEN],
    pub vsp_key: [u8; VSP_KEY_LEN],
    pub vsp_iv: [u8; VSP_IV_LEN],
    pub master_secret: [u8; MASTER_SECRET_LEN],
    pub phantom_seed: [u8; PHANTOM_SEED_LEN],
    /// First bytes a Min transport client sends on the phantom connection
    pub transport_tag: [u8; 32],
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys").finish_non_exhaustive()
    }
}

/// Expand a shared secret into [`DerivedKeys`].
///
/// Pure and deterministic: the same secret always yields the same keys.
///
/// # Errors
/// Returns `StationError::DerivationError` if `secret` is not exactly
/// [`SHARED_SECRET_LEN`] bytes.
pub fn derive_keys(secret: &[u8]) -> Result<DerivedKeys> {
    if secret.len() != SHARED_SECRET_LEN {
        return Err(StationError::DerivationError(format!(
            "shared secret must be {SHARED_SECRET_LEN} bytes, got {}",
            secret.len()
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), secret);

    let mut okm = [0u8; KEY_MATERIAL_LEN];
    hk.expand(&[], &mut okm)
        .map_err(|e| StationError::DerivationError(e.to_string()))?;

    let mut transport_tag = [0u8; 32];
    hk.expand(TRANSPORT_TAG_INFO, &mut transport_tag)
        .map_err(|e| StationError::DerivationError(e.to_string()))?;

    let mut keys = DerivedKeys {
        fsp_key: [0; FSP_KEY_LEN],
        fsp_iv: [0; FSP_IV_LEN],
        vsp_key: [0; VSP_KEY_LEN],
        vsp_iv: [0; VSP_IV_LEN],
        master_secret: [0; MASTER_SECRET_LEN],
        phantom_seed: [0; PHANTOM_SEED_LEN],
        transport_tag,
    };

    // Read sequentially, in the order clients expand the same stream
    let mut offset = 0;
    for field in [
        &mut keys.fsp_key[..],
        &mut keys.fsp_iv[..],
        &mut keys.vsp_key[..],
        &mut keys.vsp_iv[..],
        &mut keys.master_secret[..],
        &mut keys.phantom_seed[..],
    ] {
        let end = offset + field.len();
        field.copy_from_slice(&okm[offset..end]);
        offset = end;
    }

    okm.zeroize();
    transport_tag.zeroize();
    Ok(keys)
}
