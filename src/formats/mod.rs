//! Byte layouts of an amiibo tag.
//!
//! Functions here only move and check bytes; the cryptography lives in
//! [`crate::crypto`] and is tied together by [`crate::codec`].
//!
//! | Module      | Contents |
//! |-------------|----------|
//! | [`amiibo`]  | 540-byte dump, on-tag and internal layouts, logical record |
//! | [`ntag215`] | Page checks, UID/BCC, password and write preparation |

pub mod amiibo;
pub mod ntag215;
