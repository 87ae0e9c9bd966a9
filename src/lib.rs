#![allow(non_snake_case)]

//! PageVeil — transparent, authenticated page-level encryption for
//! SQLite-compatible pagers.
//!
//! Every fixed-size page is encrypted (AES-128/192/256 in CTR or OFB mode)
//! and tagged (truncated HMAC, SHA-1 or SHA-256) before it reaches the disk
//! layer, and verified and decrypted in place on the way back. The page size
//! and geometry of the storage engine are preserved; the codec only uses a
//! fixed reserved tail of each page (master-key slot + IV + tag).
//!
//! Keys are supplied as an opaque descriptor `scheme:options:secret`, e.g.
//! `aes:256,sha256:correct horse battery staple`. The scheme selects a codec
//! constructor from the process-wide registry; the options configure key
//! size, stream mode and hash; the secret feeds HKDF.
//!
//! The host pager talks to the codec through the callback surface in `ffi`
//! (feature `ffi`, enabled by default): init/exec/resize/get_key/free.

// Leaves
pub mod consts;
pub mod error;
pub mod key;
pub mod metrics;

// Cryptographic primitives (hash/mode dispatch, HKDF)
pub mod crypto; // src/crypto/{mod,hkdf}.rs

// Codec trait, scheme registry, AES-HMAC cryptosystem
pub mod codec; // src/codec/{mod,aes_hmac}.rs

// C ABI callback shim for the host pager
#[cfg(feature = "ffi")]
pub mod ffi;

// Convenience re-exports
pub use codec::{create_codec, register_codec, Codec, CodecCtor, DbInfo};
pub use error::{Error, Result};
