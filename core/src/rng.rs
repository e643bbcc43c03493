//! Referral code generation.
//!
//! RULE: codes come from a single seedable stream so that a seeded
//! engine (tests, replays) hands out the same codes in the same order.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Alphabet without the easily confused 0/O and 1/I.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;

pub struct CodeRng {
    inner: Pcg64Mcg,
}

impl CodeRng {
    pub fn seeded(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { inner: Pcg64Mcg::from_entropy() }
    }

    /// Draw one candidate referral code. Uniqueness is checked by the caller
    /// against the store.
    pub fn next_code(&mut self) -> String {
        (0..CODE_LEN)
            .map(|_| {
                let idx = (self.inner.next_u64() % CODE_ALPHABET.len() as u64) as usize;
                CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_codes() {
        let mut a = CodeRng::seeded(7);
        let mut b = CodeRng::seeded(7);
        for _ in 0..20 {
            assert_eq!(a.next_code(), b.next_code());
        }
    }

    #[test]
    fn codes_use_the_unambiguous_alphabet() {
        let mut rng = CodeRng::seeded(12345);
        for _ in 0..100 {
            let code = rng.next_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(
                code.bytes().all(|b| CODE_ALPHABET.contains(&b)),
                "unexpected character in {code}"
            );
        }
    }
}
