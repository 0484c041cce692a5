//! Access code generation.
//!
//! Codes are short human-typable strings drawn from a 32-symbol alphabet
//! that excludes visually ambiguous characters (0/O, 1/I). Generation uses
//! a CSPRNG and is collision-checked against the live code space before a
//! code is handed out.

use crate::errors::MmError;
use ring::rand::{SecureRandom, SystemRandom};
use std::future::Future;

/// 32-symbol alphabet without 0/O and 1/I.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Bounded attempt count before generation fails with `ExhaustedCodeSpace`.
pub const MAX_CODE_ATTEMPTS: usize = 100;

/// Canonical form of an access code: trimmed and upper-cased.
///
/// Applied at every entry point so case variance never creates a
/// split-brain duplicate.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Generate a random code of `length` symbols.
///
/// 256 is an exact multiple of the 32-symbol alphabet, so reducing each
/// random byte modulo 32 stays uniform.
pub fn generate_code(length: usize) -> Result<String, MmError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "mm.codes", error = %e, "Failed to generate random bytes");
        MmError::Internal("RNG failure".to_string())
    })?;

    let mut code = String::with_capacity(length);
    for b in &bytes {
        let ch = CODE_ALPHABET
            .get((b % 32) as usize)
            .copied()
            .ok_or_else(|| MmError::Internal("Alphabet index out of range".to_string()))?;
        code.push(ch as char);
    }

    Ok(code)
}

/// Generate a code that is not currently live in any store.
///
/// `is_taken` is consulted for each candidate (the façade checks both the
/// session store and the device registry). Gives up after
/// [`MAX_CODE_ATTEMPTS`] candidates.
pub async fn generate_unique<F, Fut>(length: usize, mut is_taken: F) -> Result<String, MmError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, MmError>>,
{
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = generate_code(length)?;
        if !is_taken(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    tracing::error!(
        target: "mm.codes",
        attempts = MAX_CODE_ATTEMPTS,
        length = length,
        "Code space exhausted"
    );
    Err(MmError::ExhaustedCodeSpace(MAX_CODE_ATTEMPTS))
}
