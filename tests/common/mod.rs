#![allow(dead_code)]

use amiikit::KeySet;
use amiikit::keys::MASTER_KEY_SIZE;
use sha2::{Digest, Sha256};

fn record(hmac: u8, label: &[u8; 14], magic_size: u8, magic: u8, pad: u8) -> [u8; MASTER_KEY_SIZE] {
    let mut r = [0u8; MASTER_KEY_SIZE];
    for (i, b) in r[0x00..0x10].iter_mut().enumerate() {
        *b = hmac + i as u8;
    }
    r[0x10..0x1E].copy_from_slice(label);
    r[0x1F] = magic_size;
    for (i, b) in r[0x20..0x30].iter_mut().enumerate() {
        *b = magic + i as u8;
    }
    for (i, b) in r[0x30..0x50].iter_mut().enumerate() {
        *b = pad + i as u8;
    }
    r
}

/// Unfixed (data) record of the test key set.
pub fn data_record() -> [u8; MASTER_KEY_SIZE] {
    record(0x10, b"unfixed infos\0", 14, 0xA0, 0x40)
}

/// Fixed (tag) record of the test key set.
pub fn tag_record() -> [u8; MASTER_KEY_SIZE] {
    record(0x20, b"locked secret\0", 16, 0xC0, 0x60)
}

pub fn keys() -> KeySet {
    KeySet::from_bytes(&tag_record(), &data_record()).unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
