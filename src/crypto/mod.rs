//! Cryptographic operations for amiibo dumps.
//!
//! All functions accept already-loaded key material; record parsing and
//! holding is handled by [`crate::keys`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`drbg`]   | HMAC-SHA256 counter DRBG |
//! | [`keygen`] | Tag seed extraction and per-tag key derivation |
//! | [`cipher`] | AES-128-CTR payload cipher, tag/data HMAC sign and verify |
//!
//! ## Key hierarchy (brief)
//!
//! ```text
//! key_retail.bin
//!   ├── unfixed key (80 bytes) ─┐
//!   │                           ├─ DRBG(tag seed) → aes_key, aes_iv, hmac_key
//!   │                           │     ├── AES-128-CTR over payload
//!   │                           │     └── data HMAC
//!   └── fixed key (80 bytes)  ──┘
//!                                 DRBG(tag seed) → hmac_key
//!                                       └── tag HMAC
//! ```

pub mod cipher;
pub mod drbg;
pub mod keygen;
