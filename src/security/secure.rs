//! Secret comparison and random token helpers.
//!
//! Every component that compares session tokens, CSRF tokens, or signatures
//! goes through [`constant_time_eq`]; plain `==` on secret material is a bug.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking the position of the first mismatch.
///
/// Lengths are not treated as secret: inputs of different length compare unequal.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// String flavour of [`constant_time_eq`].
#[must_use]
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Generate `len` random bytes from the OS RNG, base64url-encoded without padding.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_inputs() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(constant_time_str_eq("", ""));
    }

    #[test]
    fn constant_time_eq_rejects_different_inputs() {
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
        assert!(!constant_time_str_eq("a", ""));
    }

    #[test]
    fn random_token_decodes_to_requested_length() -> Result<()> {
        let token = random_token(32)?;
        let decoded = Base64UrlUnpadded::decode_vec(&token)
            .map_err(|err| anyhow::anyhow!("decode failed: {err}"))?;
        assert_eq!(decoded.len(), 32);
        assert_ne!(token, random_token(32)?);
        Ok(())
    }
}
