use rand::RngCore;
use solana_pubkey::{Pubkey, MAX_SEED_LEN};

use crate::error::{EngineError, EngineResult};

/// One seed of a program-derived address, as authored in a trace.
///
/// `Wallet` and `Account` are late-bound: they turn into the 32-byte public
/// key of, respectively, a named wallet or an already-resolved account at
/// derivation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedSpec {
    /// UTF-8 bytes of a literal string.
    Literal(Vec<u8>),
    /// A fresh 32-byte random seed, drawn once per derivation.
    Random,
    /// Public key of a wallet from the wallet store.
    Wallet(String),
    /// Public key of another account in the same instruction.
    Account(String),
}

impl SeedSpec {
    pub fn literal(text: &str) -> EngineResult<Self> {
        let bytes = text.as_bytes().to_vec();
        if bytes.len() > MAX_SEED_LEN {
            return Err(EngineError::SeedTooLong(bytes.len()));
        }
        Ok(SeedSpec::Literal(bytes))
    }
}

/// A fully materialized seed list, ready for derivation.
pub struct SeedBytes(pub Vec<Vec<u8>>);

impl SeedBytes {
    pub fn as_slices(&self) -> Vec<&[u8]> {
        self.0.iter().map(|s| s.as_slice()).collect()
    }
}

/// Derives the program-derived address for `seeds` under `program_id`.
///
/// The runtime walks bump 255 down to 0 and returns the first candidate
/// that falls off the ed25519 curve; the same seeds in the same order
/// always yield the same address. Returns the address and the bump that
/// produced it.
pub fn derive(program_id: &Pubkey, seeds: &SeedBytes) -> EngineResult<(Pubkey, u8)> {
    for seed in &seeds.0 {
        if seed.len() > MAX_SEED_LEN {
            return Err(EngineError::SeedTooLong(seed.len()));
        }
    }
    Pubkey::try_find_program_address(&seeds.as_slices(), program_id)
        .ok_or(EngineError::NoValidAddressFound)
}

/// Draws a fresh 32-byte random seed. The value is logged so a derived
/// address can be reproduced after the run; callers needing true
/// reproducibility should author literal seeds instead.
pub fn random_seed() -> Vec<u8> {
    let mut seed = [0u8; MAX_SEED_LEN];
    rand::thread_rng().fill_bytes(&mut seed);
    debug!("drew random seed {}", hex::encode(seed));
    seed.to_vec()
}
