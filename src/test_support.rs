//! Deterministic key material shared by the unit tests.

use crate::keys::{KeySet, MASTER_KEY_SIZE};

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

pub(crate) fn fixture_keys() -> KeySet {
    let data = record(0x10, b"unfixed infos\0", 14, 0xA0, 0x40);
    let tag = record(0x20, b"locked secret\0", 16, 0xC0, 0x60);
    KeySet::from_bytes(&tag, &data).unwrap()
}
