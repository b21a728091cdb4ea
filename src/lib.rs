//! **amiikit** - amiibo NTAG215 dump encryption and decryption.
//!
//! # Modules
//! | Module | Contents |
//! |--------|----------|
//! | [`keys`]              | Master-key records, retail key file, shared key store |
//! | [`crypto`]            | Key derivation, AES-CTR payload cipher, tag/data HMACs |
//! | [`formats::amiibo`]   | Dump layout, trailing-byte passthrough, logical record |
//! | [`formats::ntag215`]  | NTAG215 page helpers for writing a dump to a blank tag |
//! | [`codec`]             | `pack` / `unpack` over caller-owned buffers |
//!
//! # Example
//! ```no_run
//! use std::fs::{self, File};
//!
//! use amiikit::KeySet;
//!
//! # fn main() -> amiikit::Result<()> {
//! let keys = KeySet::load_retail(File::open("key_retail.bin")?)?;
//! let dump = fs::read("figure.bin")?;
//! let plain = amiikit::codec::unpack_to_vec(&keys, &dump)?;
//! # let _ = plain;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod crypto;
pub mod error;
pub mod formats;
pub mod keys;
mod utils;

#[cfg(test)]
mod test_support;

pub use codec::{pack, unpack};
pub use error::{Error, Result};
pub use formats::amiibo::AMIIBO_SIZE;
pub use keys::{KeySet, KeyStore};
