//! Amiibo NTAG215 dump - the 540-byte memory image of a figure.
//!
//! A dump exists in two byte orders:
//!
//! * **Tag layout** - page order as read from the NTAG215. The payload is
//!   AES-128-CTR encrypted. This is what `pack` produces and `unpack` consumes.
//! * **Internal layout** - the order the console works in. The payload is
//!   plaintext and the regions each HMAC covers are contiguous. This is what
//!   `unpack` produces and `pack` consumes.
//!
//! ## Layout mapping
//! ```text
//! internal  tag     len    content
//! [0x000]   0x008   0x008  BCC1, internal, static lock, capability container
//! [0x008]   0x080   0x020  data HMAC
//! [0x028]   0x010   0x024  0xA5, write counter, settings, nickname
//! [0x04C]   0x0A0   0x168  owner Mii, title ID, app ID, app data
//! [0x1B4]   0x034   0x020  tag HMAC
//! [0x1D4]   0x000   0x008  UID0-2, BCC0, UID3-6
//! [0x1DC]   0x054   0x02C  model info, keygen salt
//! [0x208]   0x208   0x014  dynamic lock, CFG0, CFG1, PWD, PACK
//! ```
//!
//! ## Internal layout detail
//! ```text
//! [0x028] 0xA5 marker          (1 byte)
//! [0x029] WriteCounter         (u16 BE)
//! [0x02C] Flags                (1 byte)   - encrypted from here
//! [0x02D] CountryCode          (1 byte)
//! [0x02E] AppDataCrcCounter    (u16 BE)
//! [0x030] SetupDate            (u16 BE, packed y/m/d)
//! [0x032] LastWriteDate        (u16 BE, packed y/m/d)
//! [0x034] Crc32                (u32 BE)
//! [0x038] Nickname             (0x14 bytes UTF-16BE)
//! [0x04C] OwnerMii             (0x60 bytes)
//! [0x0AC] TitleId              (u64 BE)
//! [0x0B4] AppWriteCounter      (u16 BE)
//! [0x0B6] AppId                (u32 BE)
//! [0x0DC] AppData              (0xD8 bytes)   - encrypted up to 0x1B4
//! [0x1DC] AmiiboId             (u64 BE)
//! [0x1E8] KeygenSalt           (0x20 bytes)
//! ```

use std::io::{Cursor, Seek, SeekFrom};

use crate::utils::{be_u16, be_u32, be_u64, bytesa, span, u8, utf16be_string};
use crate::{Error, Result};

/// Size of a full NTAG215 dump, including PWD/PACK.
pub const AMIIBO_SIZE: usize = 0x21C;

/// Smallest dump [`pad_dump`] will accept (user memory only, no config pages).
pub const AMIIBO_SIZE_MIN: usize = 0x208;

/// Internal offset of the data HMAC.
pub const HMAC_POS_DATA: usize = 0x008;
/// Internal offset of the tag HMAC.
pub const HMAC_POS_TAG: usize = 0x1B4;
/// Length of both HMAC fields.
pub const HMAC_SIZE: usize = 0x20;

/// Internal start of the region the data HMAC covers (runs to [`TAG_DATA_END`]).
pub const DATA_HMAC_START: usize = 0x029;
/// Internal start of the region the tag HMAC covers (UID, model info, salt).
pub const TAG_DATA_START: usize = 0x1D4;
/// Internal end (exclusive) of both HMAC-covered regions.
pub const TAG_DATA_END: usize = 0x208;

/// Internal start of the AES-CTR encrypted payload.
pub const PAYLOAD_START: usize = 0x02C;
/// Length of the AES-CTR encrypted payload.
pub const PAYLOAD_SIZE: usize = 0x188;

/// Internal offset of the write counter (first seed field).
pub const WRITE_COUNTER_POS: usize = 0x029;
/// Internal offset of the 8-byte UID block.
pub const UID_POS: usize = 0x1D4;
/// Internal offset of the 8-byte amiibo ID.
pub const AMIIBO_ID_POS: usize = 0x1DC;
/// Internal offset of the 32-byte keygen salt.
pub const KEYGEN_SALT_POS: usize = 0x1E8;

/// Offset of the trailing configuration pages; identical in both layouts.
pub const CONFIG_POS: usize = 0x208;
/// Length of the trailing configuration pages.
pub const CONFIG_SIZE: usize = 0x014;

/// `(internal offset, tag offset, length)` for every relocated region.
const LAYOUT: [(usize, usize, usize); 7] = [
    (0x000, 0x008, 0x008),
    (0x008, 0x080, 0x020),
    (0x028, 0x010, 0x024),
    (0x04C, 0x0A0, 0x168),
    (0x1B4, 0x034, 0x020),
    (0x1D4, 0x000, 0x008),
    (0x1DC, 0x054, 0x02C),
];

/// Convert a tag-layout dump to internal layout.
///
/// The configuration pages (0x208..0x21C) are carried over unchanged.
pub fn tag_to_internal(tag: &[u8; AMIIBO_SIZE]) -> [u8; AMIIBO_SIZE] {
    let mut out = [0u8; AMIIBO_SIZE];
    for (internal, on_tag, len) in LAYOUT {
        out[span(internal, len)].copy_from_slice(&tag[span(on_tag, len)]);
    }
    out[span(CONFIG_POS, CONFIG_SIZE)].copy_from_slice(&tag[span(CONFIG_POS, CONFIG_SIZE)]);
    out
}

/// Convert an internal-layout dump back to tag layout.
pub fn internal_to_tag(internal: &[u8; AMIIBO_SIZE]) -> [u8; AMIIBO_SIZE] {
    let mut out = [0u8; AMIIBO_SIZE];
    for (at, on_tag, len) in LAYOUT {
        out[span(on_tag, len)].copy_from_slice(&internal[span(at, len)]);
    }
    out[span(CONFIG_POS, CONFIG_SIZE)]
        .copy_from_slice(&internal[span(CONFIG_POS, CONFIG_SIZE)]);
    out
}

/// A dump buffer split into the fixed 540-byte image and whatever follows it.
///
/// Trailing bytes are never interpreted; [`TagDump::serialize_into`] writes
/// them back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDump<'a> {
    /// The fixed-size image.
    pub image: [u8; AMIIBO_SIZE],
    /// Bytes beyond [`AMIIBO_SIZE`] in the source buffer.
    pub trailing: &'a [u8],
}

impl<'a> TagDump<'a> {
    /// Split a buffer of at least [`AMIIBO_SIZE`] bytes.
    ///
    /// Returns [`Error::SizeMismatch`] for shorter buffers.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let (head, trailing) = buf
            .split_first_chunk::<AMIIBO_SIZE>()
            .ok_or(Error::SizeMismatch {
                expected: AMIIBO_SIZE,
                got: buf.len(),
            })?;
        Ok(Self {
            image: *head,
            trailing,
        })
    }

    /// Total length of the source buffer.
    pub fn len(&self) -> usize {
        AMIIBO_SIZE + self.trailing.len()
    }

    /// Always false; a dump holds at least [`AMIIBO_SIZE`] bytes.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Write trailing bytes first, then the image over the front.
    ///
    /// `out` must be exactly [`TagDump::len`] bytes.
    pub fn serialize_into(&self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.len() {
            return Err(Error::SizeMismatch {
                expected: self.len(),
                got: out.len(),
            });
        }
        out[AMIIBO_SIZE..].copy_from_slice(self.trailing);
        out[..AMIIBO_SIZE].copy_from_slice(&self.image);
        Ok(())
    }

    /// Allocate and fill a buffer of [`TagDump::len`] bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.image);
        out.extend_from_slice(self.trailing);
        out
    }
}

/// Zero-extend a short dump to [`AMIIBO_SIZE`].
///
/// Many dump tools save only the 520 bytes of user memory, or 532 bytes
/// without PWD/PACK. Anything shorter than [`AMIIBO_SIZE_MIN`] or longer than
/// [`AMIIBO_SIZE`] is rejected.
pub fn pad_dump(buf: &[u8]) -> Result<[u8; AMIIBO_SIZE]> {
    if buf.len() < AMIIBO_SIZE_MIN {
        return Err(Error::SizeMismatch {
            expected: AMIIBO_SIZE_MIN,
            got: buf.len(),
        });
    }
    if buf.len() > AMIIBO_SIZE {
        return Err(Error::Parse("dump larger than an NTAG215"));
    }
    let mut out = [0u8; AMIIBO_SIZE];
    out[..buf.len()].copy_from_slice(buf);
    Ok(out)
}

/// A calendar date packed into 16 bits as stored in the settings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmiiboDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl From<u16> for AmiiboDate {
    fn from(v: u16) -> Self {
        Self {
            year: 2000 + (v >> 9),
            month: ((v >> 5) & 0x0F) as u8,
            day: (v & 0x1F) as u8,
        }
    }
}

/// Figure identity decoded from the 8-byte amiibo ID.
///
/// ```text
/// [0] GameId + CharacterId (u16 BE, upper 10 bits game, lower 6 character)
/// [2] Variant              (1 byte)
/// [3] FigureType           (1 byte: 0 figure, 1 card, 2 yarn, 3 band)
/// [4] ModelNumber          (u16 BE)
/// [6] Series               (1 byte)
/// [7] Format               (always 0x02)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmiiboId {
    pub raw: u64,
}

impl AmiiboId {
    pub fn game_and_character(self) -> u16 {
        (self.raw >> 48) as u16
    }

    pub fn variant(self) -> u8 {
        (self.raw >> 40) as u8
    }

    pub fn figure_type(self) -> u8 {
        (self.raw >> 32) as u8
    }

    pub fn model_number(self) -> u16 {
        (self.raw >> 16) as u16
    }

    pub fn series(self) -> u8 {
        (self.raw >> 8) as u8
    }
}

impl std::fmt::Display for AmiiboId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.raw)
    }
}

/// Settings flag: owner and nickname have been registered.
pub const FLAG_USER_DATA: u8 = 0x10;
/// Settings flag: a game has claimed the application area.
pub const FLAG_APP_DATA: u8 = 0x20;

/// The application-meaningful fields of a decrypted (internal layout) dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiiboData {
    /// 7-byte NFC UID (BCC bytes stripped).
    pub uid: [u8; 7],
    pub write_counter: u16,
    pub flags: u8,
    pub country_code: u8,
    pub setup_date: AmiiboDate,
    pub last_write_date: AmiiboDate,
    pub nickname: String,
    pub title_id: u64,
    pub app_write_counter: u16,
    pub app_id: u32,
    pub app_data: Vec<u8>,
    pub amiibo_id: AmiiboId,
    pub keygen_salt: [u8; 32],
}

impl AmiiboData {
    /// Read the logical record from an internal-layout dump.
    ///
    /// Returns [`Error::Parse`] if byte 0x028 is not the 0xA5 marker every
    /// initialised amiibo carries.
    pub fn parse(plain: &[u8; AMIIBO_SIZE]) -> Result<Self> {
        let mut r = Cursor::new(&plain[..]);

        r.seek(SeekFrom::Start(0x028))?;
        if u8(&mut r)? != 0xA5 {
            return Err(Error::Parse("missing 0xA5 settings marker"));
        }
        let write_counter = be_u16(&mut r)?;
        let _version = u8(&mut r)?;
        let flags = u8(&mut r)?;
        let country_code = u8(&mut r)?;
        let _crc_counter = be_u16(&mut r)?;
        let setup_date = AmiiboDate::from(be_u16(&mut r)?);
        let last_write_date = AmiiboDate::from(be_u16(&mut r)?);
        let _crc32 = be_u32(&mut r)?;
        let nickname = utf16be_string(&bytesa::<0x14>(&mut r)?)?;

        r.seek(SeekFrom::Start(0x0AC))?;
        let title_id = be_u64(&mut r)?;
        let app_write_counter = be_u16(&mut r)?;
        let app_id = be_u32(&mut r)?;
        let app_data = plain[span(0x0DC, 0xD8)].to_vec();

        r.seek(SeekFrom::Start(UID_POS as u64))?;
        let uid_block = bytesa::<8>(&mut r)?;
        let uid = [
            uid_block[0],
            uid_block[1],
            uid_block[2],
            uid_block[4],
            uid_block[5],
            uid_block[6],
            uid_block[7],
        ];
        let amiibo_id = AmiiboId {
            raw: be_u64(&mut r)?,
        };

        r.seek(SeekFrom::Start(KEYGEN_SALT_POS as u64))?;
        let keygen_salt = bytesa::<0x20>(&mut r)?;

        Ok(Self {
            uid,
            write_counter,
            flags,
            country_code,
            setup_date,
            last_write_date,
            nickname,
            title_id,
            app_write_counter,
            app_id,
            app_data,
            amiibo_id,
            keygen_salt,
        })
    }

    /// Returns true if an owner and nickname are registered.
    pub fn has_user_data(&self) -> bool {
        self.flags & FLAG_USER_DATA != 0
    }

    /// Returns true if a game has initialised the application area.
    pub fn has_app_data(&self) -> bool {
        self.flags & FLAG_APP_DATA != 0
    }
}

/// Read the amiibo ID straight from a tag-layout dump.
///
/// The model info is never encrypted, so no keys are needed.
pub fn amiibo_id_from_tag(tag: &[u8]) -> Result<AmiiboId> {
    let bytes = tag.get(span(0x054, 8)).ok_or(Error::InvalidRange)?;
    Ok(AmiiboId {
        raw: be_u64(&mut Cursor::new(bytes))?,
    })
}
