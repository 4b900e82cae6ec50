//! Handover credentials: PIN issuance and verification, signature checks.
//!
//! PINs are stored only as argon2 PHC strings. Every failure maps to the
//! same `InvalidCredential` so a caller cannot tell which check failed.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand_core::{OsRng, RngCore as _};
use stockroom_core::Error as CoreError;

use crate::{Error, Result};

/// A uniformly random string of `len` decimal digits.
pub(crate) fn generate_pin(len: usize) -> String {
  // Largest multiple of 10 below 2^32, to keep digits uniform.
  const LIMIT: u32 = u32::MAX - u32::MAX % 10;
  (0..len)
    .map(|_| loop {
      let v = OsRng.next_u32();
      if v < LIMIT {
        break char::from(b'0' + (v % 10) as u8);
      }
    })
    .collect()
}

pub(crate) fn hash_pin(pin: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(pin.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

pub(crate) fn verify_pin(pin: &str, phc: &str) -> Result<()> {
  let parsed = PasswordHash::new(phc).map_err(|_| CoreError::InvalidCredential)?;
  Argon2::default()
    .verify_password(pin.as_bytes(), &parsed)
    .map_err(|_| CoreError::InvalidCredential)?;
  Ok(())
}

/// Longest base64 text that can decode to at most `max_bytes`.
fn max_encoded_len(max_bytes: usize) -> usize { max_bytes.div_ceil(3).saturating_mul(4) }

/// Accept a base64 signature whose decoded size is within `max_bytes`.
/// Returns the decoded size. Oversized text is rejected before decoding.
pub(crate) fn check_signature(data: Option<&str>, max_bytes: usize) -> Result<usize> {
  let data = data
    .map(str::trim)
    .filter(|d| !d.is_empty())
    .ok_or(CoreError::InvalidCredential)?;
  // Accept data URLs as produced by canvas capture.
  let payload = data.split_once("base64,").map_or(data, |(_, p)| p);
  if payload.len() > max_encoded_len(max_bytes) {
    return Err(CoreError::InvalidCredential.into());
  }
  let bytes = B64.decode(payload).map_err(|_| CoreError::InvalidCredential)?;
  if bytes.is_empty() || bytes.len() > max_bytes {
    return Err(CoreError::InvalidCredential.into());
  }
  Ok(bytes.len())
}
