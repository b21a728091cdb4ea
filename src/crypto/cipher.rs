//! AES-128-CTR payload cipher and the two HMAC-SHA256 integrity tags.
//!
//! Both operate on **internal layout** dumps (see [`crate::formats::amiibo`]).
//!
//! ## Cipher
//! 0x188 bytes at internal 0x02C are XORed with an AES-128-CTR keystream. The
//! 128-bit counter block starts at the derived `aes_iv` and is incremented as
//! a big-endian integer. Encryption and decryption are the same operation.
//!
//! ## HMACs
//! * **Tag HMAC** (internal 0x1B4), keyed by the fixed key's derivation, over
//!   internal 0x1D4..0x208 (UID, model info, keygen salt). That region is
//!   never encrypted, so the tag HMAC binds the figure to one physical UID.
//! * **Data HMAC** (internal 0x008), keyed by the unfixed key's derivation,
//!   over plaintext internal 0x029..0x208. The range includes the tag HMAC
//!   field, so the tag HMAC must be computed first.
//!
//! Stored HMACs are compared in constant time.

use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::Mac;

use super::drbg::HmacSha256;
use super::keygen::{DerivedKeys, DumpKeys};
use crate::formats::amiibo::{
    AMIIBO_SIZE, CONFIG_POS, CONFIG_SIZE, DATA_HMAC_START, HMAC_POS_DATA, HMAC_POS_TAG, HMAC_SIZE,
    PAYLOAD_SIZE, PAYLOAD_START, TAG_DATA_END, TAG_DATA_START,
};
use crate::utils::span;
use crate::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Plaintext recovered from a dump together with the verification verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// Internal-layout plaintext with both HMAC fields recomputed.
    pub plain: [u8; AMIIBO_SIZE],
    /// True when both recomputed HMACs matched the stored ones.
    pub authentic: bool,
}

/// Run the payload keystream from `input` into `out`.
///
/// Besides the payload this copies the unencrypted header (0x000..0x008),
/// the marker and write counter (0x028..0x02C) and the UID/model/salt block
/// (0x1D4..0x208). The HMAC fields and configuration pages of `out` are left
/// as they were.
pub fn apply_keystream(keys: &DerivedKeys, input: &[u8; AMIIBO_SIZE], out: &mut [u8; AMIIBO_SIZE]) {
    let mut cipher = Aes128Ctr::new(&keys.aes_key.into(), &keys.aes_iv.into());
    let payload = span(PAYLOAD_START, PAYLOAD_SIZE);
    out[payload.clone()].copy_from_slice(&input[payload.clone()]);
    cipher.apply_keystream(&mut out[payload]);

    out[0x000..0x008].copy_from_slice(&input[0x000..0x008]);
    out[0x028..PAYLOAD_START].copy_from_slice(&input[0x028..PAYLOAD_START]);
    out[TAG_DATA_START..TAG_DATA_END].copy_from_slice(&input[TAG_DATA_START..TAG_DATA_END]);
}

fn tag_mac(keys: &DerivedKeys, plain: &[u8; AMIIBO_SIZE]) -> Result<HmacSha256> {
    let mut mac = new_mac(keys)?;
    mac.update(&plain[TAG_DATA_START..TAG_DATA_END]);
    Ok(mac)
}

fn data_mac(
    keys: &DerivedKeys,
    plain: &[u8; AMIIBO_SIZE],
    tag_hmac: &[u8],
) -> Result<HmacSha256> {
    let mut mac = new_mac(keys)?;
    mac.update(&plain[DATA_HMAC_START..HMAC_POS_TAG]);
    mac.update(tag_hmac);
    mac.update(&plain[TAG_DATA_START..TAG_DATA_END]);
    Ok(mac)
}

fn new_mac(keys: &DerivedKeys) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(&keys.hmac_key)
        .map_err(|_| Error::InvalidKey("unusable derived HMAC key"))
}

fn finish(mac: HmacSha256) -> [u8; HMAC_SIZE] {
    let mut out = [0u8; HMAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Compute the tag HMAC of an internal-layout plaintext.
pub fn tag_hmac(keys: &DerivedKeys, plain: &[u8; AMIIBO_SIZE]) -> Result<[u8; HMAC_SIZE]> {
    Ok(finish(tag_mac(keys, plain)?))
}

/// Compute the data HMAC of an internal-layout plaintext given its tag HMAC.
pub fn data_hmac(
    keys: &DerivedKeys,
    plain: &[u8; AMIIBO_SIZE],
    tag_hmac: &[u8; HMAC_SIZE],
) -> Result<[u8; HMAC_SIZE]> {
    Ok(finish(data_mac(keys, plain, tag_hmac)?))
}

/// Decrypt an internal-layout dump and recompute both HMACs.
///
/// The plaintext is returned whether or not the stored HMACs match; callers
/// that must not trust unauthenticated data use [`decrypt_and_verify`].
pub fn decrypt_unchecked(keys: &DumpKeys, internal: &[u8; AMIIBO_SIZE]) -> Result<Decrypted> {
    let mut plain = [0u8; AMIIBO_SIZE];
    apply_keystream(&keys.data, internal, &mut plain);
    plain[span(CONFIG_POS, CONFIG_SIZE)].copy_from_slice(&internal[span(CONFIG_POS, CONFIG_SIZE)]);

    let stored_tag = &internal[span(HMAC_POS_TAG, HMAC_SIZE)];
    let stored_data = &internal[span(HMAC_POS_DATA, HMAC_SIZE)];

    let mac = tag_mac(&keys.tag, &plain)?;
    let tag_ok = mac.clone().verify_slice(stored_tag).is_ok();
    let tag = finish(mac);
    plain[span(HMAC_POS_TAG, HMAC_SIZE)].copy_from_slice(&tag);

    let mac = data_mac(&keys.data, &plain, &tag)?;
    let data_ok = mac.clone().verify_slice(stored_data).is_ok();
    plain[span(HMAC_POS_DATA, HMAC_SIZE)].copy_from_slice(&finish(mac));

    Ok(Decrypted {
        plain,
        // Non-short-circuiting: both comparisons always run.
        authentic: tag_ok & data_ok,
    })
}

/// Decrypt an internal-layout dump, failing unless both HMACs verify.
pub fn decrypt_and_verify(keys: &DumpKeys, internal: &[u8; AMIIBO_SIZE]) -> Result<[u8; AMIIBO_SIZE]> {
    let decrypted = decrypt_unchecked(keys, internal)?;
    if decrypted.authentic {
        Ok(decrypted.plain)
    } else {
        Err(Error::AuthenticationFailed)
    }
}

/// Sign and encrypt an internal-layout plaintext.
///
/// The HMACs are computed over the plaintext first, then the payload is
/// encrypted; the result is still in internal layout.
pub fn encrypt_and_sign(keys: &DumpKeys, plain: &[u8; AMIIBO_SIZE]) -> Result<[u8; AMIIBO_SIZE]> {
    let mut out = [0u8; AMIIBO_SIZE];

    let tag = tag_hmac(&keys.tag, plain)?;
    out[span(HMAC_POS_TAG, HMAC_SIZE)].copy_from_slice(&tag);
    out[span(HMAC_POS_DATA, HMAC_SIZE)].copy_from_slice(&data_hmac(&keys.data, plain, &tag)?);

    apply_keystream(&keys.data, plain, &mut out);
    out[span(CONFIG_POS, CONFIG_SIZE)].copy_from_slice(&plain[span(CONFIG_POS, CONFIG_SIZE)]);
    Ok(out)
}
