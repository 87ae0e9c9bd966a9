//! crypto/hkdf — RFC 5869 extract-then-expand key derivation.
//!
//! Two call sites in the codec:
//! - per-database cipher/MAC keys from the master key stored in page 1
//!   (salt absent, info = the 16-byte file header);
//! - ephemeral page-1 keys and IV from the caller's secret (salt = the
//!   page-1 IV, info = the fixed format tag).
//!
//! `salt = None` uses a zero block of the hash's output length, per the RFC.
//! Output lands in a `Zeroizing` buffer so the caller's drop wipes it.

use hkdf::Hkdf;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::HashKind;
use crate::error::{Error, Result};

/// Derive `len` bytes from `ikm` under the selected hash.
///
/// Fails only when `len > 255 * output_len(hash)` — unreachable from the
/// codec, which never asks for more than `2K + 16 <= 80` bytes.
pub fn derive(
    hash: HashKind,
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut okm = Zeroizing::new(vec![0u8; len]);
    let expanded = match hash {
        HashKind::Sha1 => Hkdf::<Sha1>::new(salt, ikm).expand(info, &mut okm),
        HashKind::Sha256 => Hkdf::<Sha256>::new(salt, ikm).expand(info, &mut okm),
    };
    expanded.map_err(|_| Error::Codec("key derivation output too long"))?;
    Ok(okm)
}
