//! Per-tag key derivation.
//!
//! Each pack/unpack derives fresh keys from a master-key record and seed
//! bytes taken from the unencrypted parts of the dump:
//!
//! ```text
//! tag seed (64 bytes)
//!   [0x00] write counter      internal[0x029..0x02B]
//!   [0x02] zero               (0x0E bytes)
//!   [0x10] UID block          internal[0x1D4..0x1DC]
//!   [0x18] UID block again    internal[0x1D4..0x1DC]
//!   [0x20] keygen salt        internal[0x1E8..0x208]
//!
//! DRBG seed
//!   type_string through its NUL
//!   || tag_seed[..16 - magic_bytes_size]
//!   || magic_bytes[..magic_bytes_size]
//!   || tag_seed[0x10..0x20]
//!   || tag_seed[0x20..0x40] XOR xor_pad
//! ```
//!
//! The DRBG output (48 bytes) splits into AES key, AES IV and HMAC key.

use std::fmt;

use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::drbg::generate_bytes;
use crate::formats::amiibo::{AMIIBO_SIZE, KEYGEN_SALT_POS, UID_POS, WRITE_COUNTER_POS};
use crate::keys::{KeySet, MasterKeys};
use crate::utils::span;
use crate::Result;

/// Size of the tag seed extracted from a dump.
pub const KEYGEN_SEED_SIZE: usize = 64;

/// Size of the DRBG output consumed by [`DerivedKeys`].
pub const DERIVED_KEYS_SIZE: usize = 48;

/// Cipher and MAC keys for a single dump. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    pub aes_key: [u8; 16],
    pub aes_iv: [u8; 16],
    pub hmac_key: [u8; 16],
}

impl DerivedKeys {
    fn from_bytes(b: &[u8; DERIVED_KEYS_SIZE]) -> Self {
        let mut keys = Self {
            aes_key: [0; 16],
            aes_iv: [0; 16],
            hmac_key: [0; 16],
        };
        keys.aes_key.copy_from_slice(&b[0x00..0x10]);
        keys.aes_iv.copy_from_slice(&b[0x10..0x20]);
        keys.hmac_key.copy_from_slice(&b[0x20..0x30]);
        keys
    }
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derived keys for both master records of a [`KeySet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpKeys {
    /// From the unfixed key: payload cipher and data HMAC.
    pub data: DerivedKeys,
    /// From the fixed key: tag HMAC.
    pub tag: DerivedKeys,
}

/// Extract the 64-byte tag seed from an internal-layout dump.
pub fn calc_seed(internal: &[u8; AMIIBO_SIZE]) -> [u8; KEYGEN_SEED_SIZE] {
    let mut seed = [0u8; KEYGEN_SEED_SIZE];
    seed[0x00..0x02].copy_from_slice(&internal[span(WRITE_COUNTER_POS, 2)]);
    seed[0x10..0x18].copy_from_slice(&internal[span(UID_POS, 8)]);
    seed[0x18..0x20].copy_from_slice(&internal[span(UID_POS, 8)]);
    seed[0x20..0x40].copy_from_slice(&internal[span(KEYGEN_SALT_POS, 0x20)]);
    seed
}

/// Build the DRBG seed for one master-key record.
pub fn prepare_seed(keys: &MasterKeys, seed: &[u8; KEYGEN_SEED_SIZE]) -> Vec<u8> {
    let magic = keys.magic();
    let lead = 16 - magic.len();

    let mut out = Vec::with_capacity(keys.type_label().len() + 16 + 16 + 32);
    out.extend_from_slice(keys.type_label());
    out.extend_from_slice(&seed[..lead]);
    out.extend_from_slice(magic);
    out.extend_from_slice(&seed[0x10..0x20]);
    out.extend(
        seed[0x20..0x40]
            .iter()
            .zip(keys.xor_pad.iter())
            .map(|(s, p)| s ^ p),
    );
    out
}

/// Expand a tag seed into [`DerivedKeys`] under one master-key record.
pub fn keygen(keys: &MasterKeys, seed: &[u8; KEYGEN_SEED_SIZE]) -> Result<DerivedKeys> {
    let mut prepared = prepare_seed(keys, seed);
    let mut raw = [0u8; DERIVED_KEYS_SIZE];
    let res = generate_bytes(&keys.hmac_key, &prepared, &mut raw);
    prepared.zeroize();
    res?;
    let derived = DerivedKeys::from_bytes(&raw);
    raw.zeroize();
    Ok(derived)
}

/// Derive keys for one master-key record straight from a dump.
pub fn derive(keys: &MasterKeys, internal: &[u8; AMIIBO_SIZE]) -> Result<DerivedKeys> {
    keygen(keys, &calc_seed(internal))
}

/// Derive both the data and the tag keys for a dump.
pub fn derive_all(keys: &KeySet, internal: &[u8; AMIIBO_SIZE]) -> Result<DumpKeys> {
    let seed = calc_seed(internal);
    let data = keygen(&keys.data, &seed)?;
    let tag = keygen(&keys.tag, &seed)?;
    trace!("derived data and tag keys");
    Ok(DumpKeys { data, tag })
}
