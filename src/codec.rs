//! Buffer-to-buffer pack and unpack.
//!
//! | Direction | Input layout | Output layout |
//! |-----------|--------------|---------------|
//! | [`unpack`] | on-tag, encrypted | internal, decrypted |
//! | [`pack`]   | internal, decrypted | on-tag, encrypted |
//!
//! Both buffers must hold at least [`AMIIBO_SIZE`] bytes and be the same
//! length; either violation is an [`Error::SizeMismatch`]. Bytes past
//! [`AMIIBO_SIZE`] are copied from input to output unchanged. Every check and
//! the whole transform run before the first byte of `output` is written, so a
//! failed call leaves `output` as it was.

use tracing::{debug, warn};

use crate::crypto::cipher::{decrypt_and_verify, decrypt_unchecked, encrypt_and_sign};
use crate::crypto::keygen::derive_all;
use crate::formats::amiibo::{AMIIBO_SIZE, TagDump, internal_to_tag, tag_to_internal};
use crate::keys::{KeySet, KeyStore};
use crate::{Error, Result};

fn check_lengths(input: &[u8], output: &[u8]) -> Result<()> {
    if input.len() < AMIIBO_SIZE {
        return Err(Error::SizeMismatch {
            expected: AMIIBO_SIZE,
            got: input.len(),
        });
    }
    if output.len() < AMIIBO_SIZE {
        return Err(Error::SizeMismatch {
            expected: AMIIBO_SIZE,
            got: output.len(),
        });
    }
    if input.len() != output.len() {
        return Err(Error::SizeMismatch {
            expected: input.len(),
            got: output.len(),
        });
    }
    Ok(())
}

fn commit(dump: &TagDump<'_>, image: [u8; AMIIBO_SIZE], output: &mut [u8]) -> Result<()> {
    TagDump {
        image,
        trailing: dump.trailing,
    }
    .serialize_into(output)
}

/// Decrypt and authenticate an on-tag dump.
///
/// Fails with [`Error::AuthenticationFailed`] if either HMAC does not match;
/// `output` is left untouched in that case.
pub fn unpack(keys: &KeySet, input: &[u8], output: &mut [u8]) -> Result<()> {
    debug!(len = input.len(), "unpack");
    check_lengths(input, output)?;
    let dump = TagDump::parse(input)?;
    let internal = tag_to_internal(&dump.image);
    let derived = derive_all(keys, &internal)?;

    let plain = decrypt_and_verify(&derived, &internal).inspect_err(|_| {
        warn!("amiibo dump failed HMAC verification");
    })?;
    commit(&dump, plain, output)
}

/// Decrypt an on-tag dump without rejecting it on an HMAC mismatch.
///
/// The decrypted dump is always written to `output`. Returns whether both
/// HMACs matched. Size and key errors are still reported as errors.
pub fn unpack_unverified(keys: &KeySet, input: &[u8], output: &mut [u8]) -> Result<bool> {
    debug!(len = input.len(), "unpack (unverified)");
    check_lengths(input, output)?;
    let dump = TagDump::parse(input)?;
    let internal = tag_to_internal(&dump.image);
    let derived = derive_all(keys, &internal)?;

    let decrypted = decrypt_unchecked(&derived, &internal)?;
    if !decrypted.authentic {
        warn!("amiibo dump failed HMAC verification, keeping plaintext");
    }
    commit(&dump, decrypted.plain, output)?;
    Ok(decrypted.authentic)
}

/// Sign and encrypt a decrypted (internal layout) dump into on-tag layout.
///
/// Any HMAC values already present in `input` are ignored and replaced.
pub fn pack(keys: &KeySet, input: &[u8], output: &mut [u8]) -> Result<()> {
    debug!(len = input.len(), "pack");
    check_lengths(input, output)?;
    let dump = TagDump::parse(input)?;
    let derived = derive_all(keys, &dump.image)?;

    let tag = internal_to_tag(&encrypt_and_sign(&derived, &dump.image)?);
    commit(&dump, tag, output)
}

/// [`unpack`] into a freshly allocated buffer of the input's length.
pub fn unpack_to_vec(keys: &KeySet, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; input.len()];
    unpack(keys, input, &mut out)?;
    Ok(out)
}

/// [`pack`] into a freshly allocated buffer of the input's length.
pub fn pack_to_vec(keys: &KeySet, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; input.len()];
    pack(keys, input, &mut out)?;
    Ok(out)
}

impl KeyStore {
    /// [`unpack`] with the currently loaded keys.
    pub fn unpack(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let keys = self.key_set()?;
        unpack(&keys, input, output)
    }

    /// [`pack`] with the currently loaded keys.
    pub fn pack(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let keys = self.key_set()?;
        pack(&keys, input, output)
    }
}
