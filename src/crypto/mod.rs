//! crypto — primitive selection and dispatch for the page codec.
//!
//! The key descriptor picks primitives at run time, so the concrete
//! RustCrypto types sit behind two small sealed enums:
//! - `PageStream` — AES-128/192/256 in CTR or OFB, one variant per combination;
//! - `PageMac`    — HMAC-SHA1 or HMAC-SHA256, resettable between pages.
//!
//! Also here: CSPRNG fills (`OsRng`) and the constant-time tag comparison.
//! Key material handed to these constructors is owned by the caller and
//! wiped there; the cipher/MAC objects themselves live for the codec
//! instance.

use aes::{Aes128, Aes192, Aes256};
use cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::consts::AES_BLOCK_SIZE;
use crate::error::{Error, Result};

pub mod hkdf;

// ---------- Selectors ----------

/// Hash used for HKDF and the page HMAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
}

impl HashKind {
    /// Native digest width in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }
}

/// Stream chaining mode for the block cipher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Ctr,
    Ofb,
}

// ---------- Stream cipher dispatch ----------

type CtrAes128 = ctr::Ctr128BE<Aes128>;
type CtrAes192 = ctr::Ctr128BE<Aes192>;
type CtrAes256 = ctr::Ctr128BE<Aes256>;
type OfbAes128 = ofb::Ofb<Aes128>;
type OfbAes192 = ofb::Ofb<Aes192>;
type OfbAes256 = ofb::Ofb<Aes256>;

/// One page's worth of keystream: an AES stream cipher seeded with the
/// page IV. Constructed per page (the IV changes on every encode).
pub enum PageStream {
    Ctr128(CtrAes128),
    Ctr192(CtrAes192),
    Ctr256(CtrAes256),
    Ofb128(OfbAes128),
    Ofb192(OfbAes192),
    Ofb256(OfbAes256),
}

impl PageStream {
    /// Build a stream over `key` seeded with the 16-byte `iv`.
    ///
    /// Panics when `key` is not 16/24/32 bytes long — a key of any other
    /// width reaching cipher construction is an invariant violation, not a
    /// recoverable error.
    pub fn new(mode: StreamMode, key: &[u8], iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        match (mode, key.len()) {
            (StreamMode::Ctr, 16) => {
                PageStream::Ctr128(CtrAes128::new_from_slices(key, iv).expect("aes-128-ctr init"))
            }
            (StreamMode::Ctr, 24) => {
                PageStream::Ctr192(CtrAes192::new_from_slices(key, iv).expect("aes-192-ctr init"))
            }
            (StreamMode::Ctr, 32) => {
                PageStream::Ctr256(CtrAes256::new_from_slices(key, iv).expect("aes-256-ctr init"))
            }
            (StreamMode::Ofb, 16) => {
                PageStream::Ofb128(OfbAes128::new_from_slices(key, iv).expect("aes-128-ofb init"))
            }
            (StreamMode::Ofb, 24) => {
                PageStream::Ofb192(OfbAes192::new_from_slices(key, iv).expect("aes-192-ofb init"))
            }
            (StreamMode::Ofb, 32) => {
                PageStream::Ofb256(OfbAes256::new_from_slices(key, iv).expect("aes-256-ofb init"))
            }
            (_, n) => panic!("cipher key must be 16, 24 or 32 bytes, got {}", n),
        }
    }

    /// XOR the keystream over `src` into `dst` (encode path: plaintext page
    /// region into the codec buffer). Lengths must match.
    pub fn xor_into(&mut self, src: &[u8], dst: &mut [u8]) {
        macro_rules! b2b {
            ($s:expr) => {
                $s.apply_keystream_b2b(src, dst).expect("stream region length mismatch")
            };
        }
        match self {
            PageStream::Ctr128(s) => b2b!(s),
            PageStream::Ctr192(s) => b2b!(s),
            PageStream::Ctr256(s) => b2b!(s),
            PageStream::Ofb128(s) => b2b!(s),
            PageStream::Ofb192(s) => b2b!(s),
            PageStream::Ofb256(s) => b2b!(s),
        }
    }

    /// XOR the keystream over `buf` in place (decode path).
    pub fn xor_in_place(&mut self, buf: &mut [u8]) {
        match self {
            PageStream::Ctr128(s) => s.apply_keystream(buf),
            PageStream::Ctr192(s) => s.apply_keystream(buf),
            PageStream::Ctr256(s) => s.apply_keystream(buf),
            PageStream::Ofb128(s) => s.apply_keystream(buf),
            PageStream::Ofb192(s) => s.apply_keystream(buf),
            PageStream::Ofb256(s) => s.apply_keystream(buf),
        }
    }
}

// ---------- HMAC dispatch ----------

/// Keyed page MAC. The per-database instance is created once and reset
/// between pages; page-1 uses a one-shot instance with ephemeral keys.
pub enum PageMac {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
}

impl PageMac {
    pub fn new(hash: HashKind, key: &[u8]) -> Self {
        match hash {
            HashKind::Sha1 => {
                PageMac::Sha1(Hmac::<Sha1>::new_from_slice(key).expect("hmac accepts any key length"))
            }
            HashKind::Sha256 => {
                PageMac::Sha256(Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length"))
            }
        }
    }

    /// Native digest width of this MAC.
    pub fn output_len(&self) -> usize {
        match self {
            PageMac::Sha1(_) => 20,
            PageMac::Sha256(_) => 32,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            PageMac::Sha1(m) => m.update(data),
            PageMac::Sha256(m) => m.update(data),
        }
    }

    /// Write the full-width digest into `out` and reset the MAC to its keyed
    /// initial state. `out` must be exactly `output_len()` bytes; truncation
    /// to the tag length is the caller's slicing.
    pub fn finalize_reset_into(&mut self, out: &mut [u8]) {
        match self {
            PageMac::Sha1(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()),
            PageMac::Sha256(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()),
        }
    }
}

// ---------- CSPRNG ----------

/// Fill `buf` from the platform CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|_| Error::Prng)
}

// ---------- Constant-time comparison ----------

/// Constant-time equality for authentication tags. Never short-circuits on
/// byte values; a length mismatch is not secret.
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}
