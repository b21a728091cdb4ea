//! NTAG215 page helpers for preparing an amiibo dump for a blank tag.
//!
//! An NTAG215 exposes 135 pages of 4 bytes. The pages that matter here, in
//! tag layout:
//!
//! ```text
//! page 0x00  UID0 UID1 UID2 BCC0
//! page 0x01  UID3 UID4 UID5 UID6
//! page 0x02  BCC1 INT  LOCK0 LOCK1   - static lock, 0F E0 when locked
//! page 0x03  F1 10 FF EE             - capability container
//! page 0x82  01 00 0F 00             - dynamic lock, RFUI byte zero
//! page 0x83  00 00 00 04             - CFG0 (AUTH0 = page 4)
//! page 0x84  5F 00 00 00             - CFG1 (ACCESS)
//! page 0x85  PWD
//! page 0x86  PACK RFUI
//! ```
//!
//! Nothing here talks to hardware; these functions only shape the bytes a
//! tag writer sends.

use crate::formats::amiibo::{AMIIBO_SIZE, UID_POS};
use crate::{Error, Result};

/// Bytes per NTAG215 page.
pub const PAGE_SIZE: usize = 4;

/// Smallest dump the page checks accept (everything up to and including CFG1).
pub const TAG_FILE_SIZE: usize = 0x214;

pub const PAGE_STATIC_LOCK: usize = 0x02;
pub const PAGE_CAPABILITY: usize = 0x03;
pub const PAGE_DYNAMIC_LOCK: usize = 0x82;
pub const PAGE_CFG0: usize = 0x83;
pub const PAGE_CFG1: usize = 0x84;
pub const PAGE_PWD: usize = 0x85;
pub const PAGE_PACK: usize = 0x86;

const STATIC_LOCK: [u8; 2] = [0x0F, 0xE0];
const CAPABILITY: [u8; 4] = [0xF1, 0x10, 0xFF, 0xEE];
const DYNAMIC_LOCK: [u8; 4] = [0x01, 0x00, 0x0F, 0x00];
const CFG0: [u8; 4] = [0x00, 0x00, 0x00, 0x04];
const CFG1: [u8; 4] = [0x5F, 0x00, 0x00, 0x00];
const PACK: [u8; 4] = [0x80, 0x80, 0x00, 0x00];

fn page(dump: &[u8], index: usize) -> &[u8] {
    &dump[index * PAGE_SIZE..(index + 1) * PAGE_SIZE]
}

fn page_mut(dump: &mut [u8], index: usize) -> &mut [u8] {
    &mut dump[index * PAGE_SIZE..(index + 1) * PAGE_SIZE]
}

/// Split a tag-layout dump into 4-byte pages.
///
/// A trailing partial page is dropped.
pub fn split_pages(dump: &[u8]) -> Result<Vec<[u8; PAGE_SIZE]>> {
    if dump.len() < TAG_FILE_SIZE {
        return Err(Error::SizeMismatch {
            expected: TAG_FILE_SIZE,
            got: dump.len(),
        });
    }
    let (pages, _) = dump.as_chunks::<PAGE_SIZE>();
    Ok(pages.to_vec())
}

/// Check the fixed bytes every written amiibo tag image carries.
pub fn validate(dump: &[u8]) -> Result<()> {
    if dump.len() < TAG_FILE_SIZE {
        return Err(Error::SizeMismatch {
            expected: TAG_FILE_SIZE,
            got: dump.len(),
        });
    }
    if page(dump, 0)[0] != 0x04 {
        return Err(Error::Parse("tag must start with 0x04"));
    }
    if page(dump, PAGE_STATIC_LOCK)[2..] != STATIC_LOCK {
        return Err(Error::Parse("lock signature mismatch"));
    }
    if page(dump, PAGE_CAPABILITY) != CAPABILITY {
        return Err(Error::Parse("capability container mismatch"));
    }
    if page(dump, PAGE_DYNAMIC_LOCK)[..3] != DYNAMIC_LOCK[..3] {
        return Err(Error::Parse("dynamic lock signature mismatch"));
    }
    if page(dump, PAGE_CFG0) != CFG0 {
        return Err(Error::Parse("CFG0 signature mismatch"));
    }
    if page(dump, PAGE_CFG1) != CFG1 {
        return Err(Error::Parse("CFG1 signature mismatch"));
    }
    Ok(())
}

/// Returns true if the static lock bytes already mark the tag as an amiibo.
///
/// A locked tag cannot be rewritten.
pub fn is_locked(pages0_2: &[u8]) -> bool {
    pages0_2.len() >= 3 * PAGE_SIZE && page(pages0_2, PAGE_STATIC_LOCK)[2..] == STATIC_LOCK
}

/// The 7-byte UID from the first two pages (BCC0 dropped).
pub fn uid_from_pages(pages0_1: &[u8]) -> Result<[u8; 7]> {
    let p = pages0_1
        .get(..2 * PAGE_SIZE)
        .ok_or(Error::SizeMismatch {
            expected: 2 * PAGE_SIZE,
            got: pages0_1.len(),
        })?;
    Ok([p[0], p[1], p[2], p[4], p[5], p[6], p[7]])
}

/// Expand a 7-byte UID into the 9 bytes of pages 0-2 it occupies,
/// computing both check bytes.
pub fn uid_pages(uid: &[u8; 7]) -> [u8; 9] {
    let bcc0 = 0x88 ^ uid[0] ^ uid[1] ^ uid[2];
    let bcc1 = uid[3] ^ uid[4] ^ uid[5] ^ uid[6];
    [uid[0], uid[1], uid[2], bcc0, uid[3], uid[4], uid[5], uid[6], bcc1]
}

/// The tag password the console expects for a given UID.
pub fn password(uid: &[u8; 7]) -> [u8; 4] {
    [
        0xAA ^ uid[1] ^ uid[3],
        0x55 ^ uid[2] ^ uid[4],
        0xAA ^ uid[3] ^ uid[5],
        0x55 ^ uid[4] ^ uid[6],
    ]
}

/// Rebind a decrypted (internal layout) dump to another tag's UID.
///
/// `uid_bytes` is the first 9 bytes read from the target tag: UID0-2, BCC0,
/// UID3-6, BCC1. The dump must be packed again afterwards so both HMACs and
/// the keystream follow the new UID.
pub fn patch_uid(plain: &mut [u8; AMIIBO_SIZE], uid_bytes: &[u8]) -> Result<()> {
    let uid = uid_bytes.get(..9).ok_or(Error::SizeMismatch {
        expected: 9,
        got: uid_bytes.len(),
    })?;
    plain[UID_POS..UID_POS + 8].copy_from_slice(&uid[..8]);
    plain[0] = uid[8];
    Ok(())
}

/// Fill in the lock, configuration and password pages of a packed
/// (tag layout) dump so it can be written page-for-page to a blank NTAG215.
pub fn prepare_for_write(tag: &mut [u8; AMIIBO_SIZE]) -> Result<()> {
    let uid = uid_from_pages(&tag[..])?;
    page_mut(tag, PAGE_STATIC_LOCK)[2..].copy_from_slice(&STATIC_LOCK);
    page_mut(tag, PAGE_DYNAMIC_LOCK).copy_from_slice(&DYNAMIC_LOCK);
    page_mut(tag, PAGE_CFG0).copy_from_slice(&CFG0);
    page_mut(tag, PAGE_CFG1).copy_from_slice(&CFG1);
    page_mut(tag, PAGE_PWD).copy_from_slice(&password(&uid));
    page_mut(tag, PAGE_PACK).copy_from_slice(&PACK);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: [u8; 7] = [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];

    #[test]
    fn bcc_and_uid_roundtrip() {
        let pages = uid_pages(&UID);
        assert_eq!(pages[3], 0x88 ^ 0x04 ^ 0xA1 ^ 0xB2);
        assert_eq!(pages[8], 0xC3 ^ 0xD4 ^ 0xE5 ^ 0xF6);
        assert_eq!(uid_from_pages(&pages).unwrap(), UID);
        assert!(uid_from_pages(&pages[..7]).is_err());
    }

    #[test]
    fn password_from_uid() {
        assert_eq!(
            password(&UID),
            [
                0xAA ^ 0xA1 ^ 0xC3,
                0x55 ^ 0xB2 ^ 0xD4,
                0xAA ^ 0xC3 ^ 0xE5,
                0x55 ^ 0xD4 ^ 0xF6
            ]
        );
    }

    #[test]
    fn prepared_dump_validates() {
        let mut tag = [0u8; AMIIBO_SIZE];
        tag[..9].copy_from_slice(&uid_pages(&UID));
        tag[0x0C..0x10].copy_from_slice(&CAPABILITY);
        assert!(validate(&tag).is_err());

        prepare_for_write(&mut tag).unwrap();
        validate(&tag).unwrap();
        assert!(is_locked(&tag[..12]));
        assert_eq!(page(&tag, PAGE_PWD), password(&UID));
        assert_eq!(page(&tag, PAGE_PACK), PACK);
        assert_eq!(page(&tag, PAGE_DYNAMIC_LOCK), [0x01u8, 0x00, 0x0F, 0x00]);
    }

    #[test]
    fn factory_dynamic_lock_still_validates() {
        let mut tag = [0u8; AMIIBO_SIZE];
        tag[..9].copy_from_slice(&uid_pages(&UID));
        tag[0x0C..0x10].copy_from_slice(&CAPABILITY);
        prepare_for_write(&mut tag).unwrap();

        // Only the first three dynamic lock bytes are checked.
        page_mut(&mut tag, PAGE_DYNAMIC_LOCK)[3] = 0xBD;
        validate(&tag).unwrap();
    }

    #[test]
    fn validate_reports_first_mismatch() {
        let mut tag = [0u8; AMIIBO_SIZE];
        tag[..9].copy_from_slice(&uid_pages(&UID));
        tag[0x0C..0x10].copy_from_slice(&CAPABILITY);
        prepare_for_write(&mut tag).unwrap();

        tag[PAGE_CFG0 * PAGE_SIZE + 3] = 0xFF;
        assert!(matches!(validate(&tag), Err(Error::Parse("CFG0 signature mismatch"))));

        tag[0] = 0x05;
        assert!(matches!(validate(&tag), Err(Error::Parse("tag must start with 0x04"))));
        assert!(validate(&tag[..TAG_FILE_SIZE - 1]).is_err());
    }

    #[test]
    fn split_into_pages() {
        let tag: [u8; AMIIBO_SIZE] = std::array::from_fn(|i| i as u8);
        let pages = split_pages(&tag).unwrap();
        assert_eq!(pages.len(), AMIIBO_SIZE / PAGE_SIZE);
        assert_eq!(pages[1], [4, 5, 6, 7]);
        assert!(split_pages(&tag[..100]).is_err());
    }

    #[test]
    fn patch_uid_rewrites_uid_block_and_bcc1() {
        let mut plain = [0u8; AMIIBO_SIZE];
        let new = uid_pages(&UID);
        patch_uid(&mut plain, &new).unwrap();
        assert_eq!(plain[UID_POS..UID_POS + 8], new[..8]);
        assert_eq!(plain[0], new[8]);
        assert!(patch_uid(&mut plain, &new[..8]).is_err());
    }
}
