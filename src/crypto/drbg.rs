//! HMAC-SHA256 counter DRBG used for per-tag key expansion.
//!
//! Output block `i` is `HMAC-SHA256(key, be16(i) || seed)`; blocks are
//! concatenated and the last one truncated to the requested length. The
//! counter starts at zero for every generation, so output is a pure function
//! of `(key, seed, length)`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Error, Result};

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Bytes produced per DRBG step.
pub const DRBG_OUTPUT_SIZE: usize = 32;

/// Largest seed the DRBG accepts.
pub const DRBG_MAX_SEED_SIZE: usize = 480;

/// Deterministic byte generator keyed by a master-key HMAC key.
pub struct Drbg<'a> {
    mac: HmacSha256,
    seed: &'a [u8],
    iteration: u16,
}

impl<'a> Drbg<'a> {
    /// Start a generator over `seed`.
    pub fn new(hmac_key: &[u8], seed: &'a [u8]) -> Result<Self> {
        if seed.len() > DRBG_MAX_SEED_SIZE {
            return Err(Error::Parse("DRBG seed too large"));
        }
        let mac = HmacSha256::new_from_slice(hmac_key)
            .map_err(|_| Error::InvalidKey("unusable DRBG HMAC key"))?;
        Ok(Self {
            mac,
            seed,
            iteration: 0,
        })
    }

    /// Produce the next 32-byte block.
    pub fn step(&mut self) -> [u8; DRBG_OUTPUT_SIZE] {
        let mut mac = self.mac.clone();
        mac.update(&self.iteration.to_be_bytes());
        mac.update(self.seed);
        self.iteration = self.iteration.wrapping_add(1);

        let mut out = [0u8; DRBG_OUTPUT_SIZE];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    /// Fill `out` completely, truncating the final block.
    pub fn fill(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(DRBG_OUTPUT_SIZE) {
            let block = self.step();
            chunk.copy_from_slice(&block[..chunk.len()]);
        }
    }
}

/// One-shot helper: fill `out` from a fresh generator.
pub fn generate_bytes(hmac_key: &[u8], seed: &[u8], out: &mut [u8]) -> Result<()> {
    Drbg::new(hmac_key, seed)?.fill(out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_counter_prefixed_hmacs() {
        let key = [0x0Bu8; 16];
        let seed = b"seed material";
        let mut drbg = Drbg::new(&key, seed).unwrap();

        for i in 0u16..3 {
            let mut mac = HmacSha256::new_from_slice(&key).unwrap();
            mac.update(&i.to_be_bytes());
            mac.update(seed);
            assert_eq!(drbg.step().as_slice(), mac.finalize().into_bytes().as_slice());
        }
    }

    #[test]
    fn fill_truncates_last_block() {
        let key = [0x01u8; 16];
        let mut long = [0u8; 64];
        let mut short = [0u8; 48];
        generate_bytes(&key, b"x", &mut long).unwrap();
        generate_bytes(&key, b"x", &mut short).unwrap();
        assert_eq!(long[..48], short);
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let seed = [0u8; DRBG_MAX_SEED_SIZE + 1];
        assert!(Drbg::new(&[0u8; 16], &seed).is_err());
    }
}
