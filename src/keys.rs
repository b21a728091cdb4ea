//! Key management for amiibo cryptography.
//!
//! Amiibo dumps are protected by two master-key records, each 80 bytes:
//!
//! * **Unfixed key** (`unfixed infos`) - the *data* key. Seeds the AES-CTR
//!   keystream over the payload and the data HMAC.
//! * **Fixed key** (`locked secret`) - the *tag* key. Seeds the tag HMAC,
//!   which binds the figure identity and keygen salt to the tag's UID.
//!
//! Neither record is used directly as a cipher key; [`crate::crypto::keygen`]
//! expands it together with per-tag seed bytes into [`DerivedKeys`].
//!
//! ## Record layout
//! ```text
//! [0x00] hmac_key         (16 bytes) - DRBG HMAC key
//! [0x10] type_string      (14 bytes) - NUL-terminated ASCII label
//! [0x1E] rfu              (1 byte)
//! [0x1F] magic_bytes_size (1 byte, <= 16)
//! [0x20] magic_bytes      (16 bytes)
//! [0x30] xor_pad          (32 bytes)
//! ```
//!
//! The retail key file (`key_retail.bin`) is the unfixed record followed by
//! the fixed record, 160 bytes in total. Genuine retail records have known
//! SHA-256 digests; [`KeySet::verify_retail_digests`] checks them so a
//! corrupted or swapped file is reported as a key error instead of every
//! dump failing authentication.
//!
//! [`DerivedKeys`]: crate::crypto::keygen::DerivedKeys

use std::fmt;
use std::io::{BufRead, BufReader, Cursor, Read};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::utils::{bytesa, u8};
use crate::{Error, Result};

/// Size of one master-key record.
pub const MASTER_KEY_SIZE: usize = 80;

/// Size of the combined retail key file (unfixed record then fixed record).
pub const RETAIL_KEY_SIZE: usize = 2 * MASTER_KEY_SIZE;

/// Largest `magic_bytes_size` the seed expansion accepts.
pub const MAX_MAGIC_BYTES: usize = 16;

/// SHA-256 of the retail unfixed (data) record.
pub const UNFIXED_KEY_SHA256: [u8; 32] = [
    0x86, 0x81, 0x06, 0x13, 0x59, 0x41, 0xcb, 0xca,
    0xb3, 0x55, 0x2b, 0xd1, 0x48, 0x80, 0xa7, 0xa3,
    0x43, 0x04, 0xef, 0x34, 0x09, 0x58, 0xa6, 0x99,
    0x8b, 0x61, 0xa3, 0x8b, 0xa3, 0xce, 0x13, 0xd3,
];

/// SHA-256 of the retail fixed (tag) record.
pub const FIXED_KEY_SHA256: [u8; 32] = [
    0xb4, 0x87, 0x27, 0x79, 0x7c, 0xd2, 0x54, 0x82,
    0x00, 0xb9, 0x9c, 0x66, 0x5b, 0x20, 0xa7, 0x81,
    0x90, 0x47, 0x01, 0x63, 0xcc, 0xb8, 0xe5, 0x68,
    0x21, 0x49, 0xf1, 0xb2, 0xf7, 0xa0, 0x06, 0xcf,
];

/// One 80-byte master-key record.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKeys {
    pub hmac_key: [u8; 16],
    pub type_string: [u8; 14],
    pub rfu: u8,
    pub magic_bytes_size: u8,
    pub magic_bytes: [u8; 16],
    pub xor_pad: [u8; 32],
}

impl MasterKeys {
    /// Parse a record from exactly [`MASTER_KEY_SIZE`] bytes.
    ///
    /// Returns [`Error::InvalidKeyLength`] for any other length and
    /// [`Error::InvalidKey`] when `magic_bytes_size` exceeds 16.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MASTER_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: MASTER_KEY_SIZE,
                got: bytes.len(),
            });
        }
        Self::read(&mut Cursor::new(bytes))
    }

    fn read<R: Read>(r: &mut R) -> Result<Self> {
        let keys = Self {
            hmac_key: bytesa::<16>(r)?,
            type_string: bytesa::<14>(r)?,
            rfu: u8(r)?,
            magic_bytes_size: u8(r)?,
            magic_bytes: bytesa::<16>(r)?,
            xor_pad: bytesa::<32>(r)?,
        };
        if keys.magic_bytes_size as usize > MAX_MAGIC_BYTES {
            return Err(Error::InvalidKey("magic bytes size exceeds 16"));
        }
        Ok(keys)
    }

    /// Serialize back to the 80-byte on-disk record.
    pub fn to_bytes(&self) -> [u8; MASTER_KEY_SIZE] {
        let mut out = [0u8; MASTER_KEY_SIZE];
        out[0x00..0x10].copy_from_slice(&self.hmac_key);
        out[0x10..0x1E].copy_from_slice(&self.type_string);
        out[0x1E] = self.rfu;
        out[0x1F] = self.magic_bytes_size;
        out[0x20..0x30].copy_from_slice(&self.magic_bytes);
        out[0x30..0x50].copy_from_slice(&self.xor_pad);
        out
    }

    /// The type string up to and including its NUL terminator.
    ///
    /// A string that fills all 14 bytes without a terminator is returned
    /// whole.
    pub fn type_label(&self) -> &[u8] {
        match self.type_string.iter().position(|&b| b == 0) {
            Some(nul) => &self.type_string[..=nul],
            None => &self.type_string,
        }
    }

    /// The active prefix of `magic_bytes`.
    pub fn magic(&self) -> &[u8] {
        &self.magic_bytes[..self.magic_bytes_size as usize]
    }

    /// SHA-256 of the serialized 80-byte record.
    pub fn sha256(&self) -> [u8; 32] {
        let mut raw = self.to_bytes();
        let digest = Sha256::digest(raw);
        raw.zeroize();
        digest.into()
    }

    fn check_digest(&self, expected: &[u8; 32], reason: &'static str) -> Result<()> {
        if self.sha256() == *expected {
            Ok(())
        } else {
            warn!(reason, "key record digest mismatch");
            Err(Error::InvalidKey(reason))
        }
    }
}

impl fmt::Debug for MasterKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeys")
            .field("type_string", &String::from_utf8_lossy(self.type_label()))
            .field("magic_bytes_size", &self.magic_bytes_size)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

/// Both master-key records needed to pack or unpack a dump.
///
/// A `KeySet` is immutable once built and is shared by reference across any
/// number of concurrent pack/unpack calls.
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Unfixed ("data") key.
    pub data: MasterKeys,
    /// Fixed ("tag", "locked secret") key.
    pub tag: MasterKeys,
}

impl KeySet {
    /// Build a key set from separate fixed (tag) and unfixed (data) records.
    pub fn from_bytes(tag: &[u8], data: &[u8]) -> Result<Self> {
        Ok(Self {
            data: MasterKeys::from_bytes(data)?,
            tag: MasterKeys::from_bytes(tag)?,
        })
    }

    /// Build a key set from the 160-byte combined retail key file contents.
    pub fn from_retail_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RETAIL_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: RETAIL_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let (data, tag) = bytes.split_at(MASTER_KEY_SIZE);
        Self::from_bytes(tag, data)
    }

    /// Load the combined retail key file from a reader.
    ///
    /// The reader must hold exactly [`RETAIL_KEY_SIZE`] bytes; trailing data
    /// means the file is not a key file and is rejected.
    pub fn load_retail<R: Read>(reader: R) -> Result<Self> {
        let mut buf = BufReader::new(reader);
        let mut raw = [0u8; RETAIL_KEY_SIZE];
        buf.read_exact(&mut raw)?;
        let keys = if buf.fill_buf()?.is_empty() {
            Self::from_retail_bytes(&raw)
        } else {
            Err(Error::InvalidKey("trailing data after retail key file"))
        };
        raw.zeroize();
        keys
    }

    /// Like [`KeySet::from_retail_bytes`], but also requires both records
    /// to match the retail digests.
    pub fn from_retail_bytes_checked(bytes: &[u8]) -> Result<Self> {
        let keys = Self::from_retail_bytes(bytes)?;
        keys.verify_retail_digests()?;
        Ok(keys)
    }

    /// Check both records against the known retail SHA-256 digests.
    ///
    /// Returns [`Error::InvalidKey`] naming the first record that differs.
    /// Key sets built from other material (test keys, for instance) fail
    /// this check but still work with pack and unpack.
    pub fn verify_retail_digests(&self) -> Result<()> {
        self.data
            .check_digest(&UNFIXED_KEY_SHA256, "unfixed key does not match retail digest")?;
        self.tag
            .check_digest(&FIXED_KEY_SHA256, "fixed key does not match retail digest")
    }

    /// Serialize to the 160-byte combined retail layout.
    pub fn to_retail_bytes(&self) -> [u8; RETAIL_KEY_SIZE] {
        let mut out = [0u8; RETAIL_KEY_SIZE];
        out[..MASTER_KEY_SIZE].copy_from_slice(&self.data.to_bytes());
        out[MASTER_KEY_SIZE..].copy_from_slice(&self.tag.to_bytes());
        out
    }
}

#[derive(Default)]
struct Slots {
    tag: Option<MasterKeys>,
    data: Option<MasterKeys>,
}

/// Load-once holder for the process's key material.
///
/// Every setter validates its input completely before taking the write lock,
/// so a rejected load never disturbs what was loaded before, and readers see
/// either the old or the new record, never a partial one.
#[derive(Default)]
pub struct KeyStore {
    slots: RwLock<Slots>,
}

impl KeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both records at once.
    pub fn load(&self, tag: &[u8], data: &[u8]) -> Result<()> {
        let set = KeySet::from_bytes(tag, data).inspect_err(|e| {
            warn!(error = %e, "rejected key material");
        })?;
        let mut slots = self.slots.write();
        slots.tag = Some(set.tag.clone());
        slots.data = Some(set.data.clone());
        debug!("loaded fixed and unfixed keys");
        Ok(())
    }

    /// Replace the fixed (tag) record.
    pub fn set_fixed(&self, tag: &[u8]) -> Result<()> {
        let keys = MasterKeys::from_bytes(tag).inspect_err(|e| {
            warn!(error = %e, "rejected fixed key");
        })?;
        self.slots.write().tag = Some(keys);
        debug!("loaded fixed key");
        Ok(())
    }

    /// Replace the unfixed (data) record.
    pub fn set_unfixed(&self, data: &[u8]) -> Result<()> {
        let keys = MasterKeys::from_bytes(data).inspect_err(|e| {
            warn!(error = %e, "rejected unfixed key");
        })?;
        self.slots.write().data = Some(keys);
        debug!("loaded unfixed key");
        Ok(())
    }

    /// Returns true once both records are present.
    pub fn is_loaded(&self) -> bool {
        let slots = self.slots.read();
        slots.tag.is_some() && slots.data.is_some()
    }

    /// Snapshot the currently loaded key set.
    ///
    /// Returns [`Error::KeysNotLoaded`] while either record is missing.
    pub fn key_set(&self) -> Result<KeySet> {
        let slots = self.slots.read();
        match (&slots.tag, &slots.data) {
            (Some(tag), Some(data)) => Ok(KeySet {
                data: data.clone(),
                tag: tag.clone(),
            }),
            _ => Err(Error::KeysNotLoaded),
        }
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("KeyStore")
            .field("fixed", &slots.tag.is_some())
            .field("unfixed", &slots.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: &[u8; 14], magic_size: u8, fill: u8) -> [u8; MASTER_KEY_SIZE] {
        let mut r = [fill; MASTER_KEY_SIZE];
        r[0x10..0x1E].copy_from_slice(label);
        r[0x1E] = 0;
        r[0x1F] = magic_size;
        r
    }

    #[test]
    fn record_roundtrips_and_exposes_label() {
        let raw = record(b"unfixed infos\0", 14, 0x11);
        let keys = MasterKeys::from_bytes(&raw).unwrap();
        assert_eq!(keys.to_bytes(), raw);
        assert_eq!(keys.type_label(), b"unfixed infos\0");
        assert_eq!(keys.magic().len(), 14);
    }

    #[test]
    fn unterminated_label_is_used_whole() {
        let keys = MasterKeys::from_bytes(&record(b"ABCDEFGHIJKLMN", 16, 0)).unwrap();
        assert_eq!(keys.type_label(), b"ABCDEFGHIJKLMN");
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = MasterKeys::from_bytes(&[0u8; 79]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyLength {
                expected: 80,
                got: 79
            }
        ));
    }

    #[test]
    fn oversized_magic_is_rejected() {
        let err = MasterKeys::from_bytes(&record(b"locked secret\0", 17, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn retail_file_is_data_then_tag() {
        let data = record(b"unfixed infos\0", 14, 0x01);
        let tag = record(b"locked secret\0", 16, 0x02);
        let mut file = data.to_vec();
        file.extend_from_slice(&tag);

        let set = KeySet::load_retail(Cursor::new(&file)).unwrap();
        assert_eq!(set.data.hmac_key, [0x01; 16]);
        assert_eq!(set.tag.hmac_key, [0x02; 16]);
        assert_eq!(set.to_retail_bytes().as_slice(), file.as_slice());

        file.push(0);
        assert!(matches!(
            KeySet::load_retail(Cursor::new(&file)),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySet::load_retail(Cursor::new(&file[..100])),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn record_digest_is_sha256_of_serialized_bytes() {
        let raw = record(b"unfixed infos\0", 14, 0x01);
        let keys = MasterKeys::from_bytes(&raw).unwrap();
        assert_eq!(keys.sha256().as_slice(), Sha256::digest(raw).as_slice());

        let own = keys.sha256();
        keys.check_digest(&own, "mismatch").unwrap();
        assert!(matches!(
            keys.check_digest(&UNFIXED_KEY_SHA256, "mismatch"),
            Err(Error::InvalidKey("mismatch"))
        ));
    }

    #[test]
    fn non_retail_keys_fail_digest_check() {
        let data = record(b"unfixed infos\0", 14, 0x01);
        let tag = record(b"locked secret\0", 16, 0x02);
        let mut file = data.to_vec();
        file.extend_from_slice(&tag);

        let set = KeySet::from_retail_bytes(&file).unwrap();
        assert!(matches!(
            set.verify_retail_digests(),
            Err(Error::InvalidKey("unfixed key does not match retail digest"))
        ));
        assert!(matches!(
            KeySet::from_retail_bytes_checked(&file),
            Err(Error::InvalidKey(_))
        ));
        // Size errors still come first.
        assert!(matches!(
            KeySet::from_retail_bytes_checked(&file[..100]),
            Err(Error::InvalidKeyLength { .. })
        ));
        assert_ne!(UNFIXED_KEY_SHA256, FIXED_KEY_SHA256);
    }

    #[test]
    fn fixture_keys_are_not_retail() {
        let keys = crate::test_support::fixture_keys();
        assert!(matches!(keys.verify_retail_digests(), Err(Error::InvalidKey(_))));
        assert!(KeySet::from_retail_bytes_checked(&keys.to_retail_bytes()).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let keys = MasterKeys::from_bytes(&record(b"locked secret\0", 16, 0xAB)).unwrap();
        let shown = format!("{keys:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }

    #[test]
    fn store_requires_both_halves() {
        let store = KeyStore::new();
        assert!(matches!(store.key_set(), Err(Error::KeysNotLoaded)));
        store
            .set_fixed(&record(b"locked secret\0", 16, 0x02))
            .unwrap();
        assert!(!store.is_loaded());
        store
            .set_unfixed(&record(b"unfixed infos\0", 14, 0x01))
            .unwrap();
        assert!(store.is_loaded());
        assert_eq!(store.key_set().unwrap().tag.hmac_key, [0x02; 16]);
    }

    #[test]
    fn failed_load_keeps_previous_keys() {
        let store = KeyStore::new();
        let tag = record(b"locked secret\0", 16, 0x02);
        let data = record(b"unfixed infos\0", 14, 0x01);
        store.load(&tag, &data).unwrap();

        let other = record(b"locked secret\0", 16, 0x09);
        assert!(matches!(
            store.load(&other, &data[..40]),
            Err(Error::InvalidKeyLength { .. })
        ));
        assert!(store.set_unfixed(&[0u8; 81]).is_err());

        let set = store.key_set().unwrap();
        assert_eq!(set.tag.hmac_key, [0x02; 16]);
        assert_eq!(set.data.hmac_key, [0x01; 16]);
    }
}
