//! codec — the page-codec contract and the process-wide scheme registry.
//!
//! The host pager serializes all calls on one codec instance; different
//! connections get different instances and may run in parallel. Encode
//! returns a borrow of the codec's reusable buffer, valid only until the
//! next encode on the same instance — that is the contract the pager relies
//! on to avoid a copy per page.
//!
//! The registry maps a scheme prefix (the bytes before the first `:` of a
//! key descriptor) to a constructor. Registration is additive and expected
//! to happen before connections open; lookup takes the same mutex, which is
//! uncontended in practice.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use log::debug;

use crate::error::{Error, Result};
use crate::key::scheme_of;

pub mod aes_hmac;

pub use aes_hmac::AesHmac;

/// Per-page encode/decode surface the host pager drives.
///
/// All methods are called from a single thread per instance. `op` is the
/// host's operation bitmask (see `consts::OP_*`); the AES-HMAC scheme does
/// not branch on it, but other schemes may.
pub trait Codec: Send + std::fmt::Debug {
    /// Bytes to reserve at the tail of every page.
    fn reserve(&self) -> usize;

    /// Called on attach and after every page-size change. Panics when
    /// `reserve` disagrees with `Self::reserve()` — the pager negotiated it
    /// once and must not drift.
    fn resize(&mut self, page_size: usize, reserve: usize);

    /// Encrypt-and-tag `page` into the codec's reusable buffer and return
    /// it. The buffer is owned by the codec and overwritten by the next
    /// encode. On the very first encode of a fresh database (page 1), the
    /// master key is minted into the input page's key slot.
    fn encode(&mut self, page: &mut [u8], pgno: u32, op: u32) -> Result<&[u8]>;

    /// Verify and decrypt `page` in place. A failed verification leaves the
    /// page bytes untouched.
    fn decode(&mut self, page: &mut [u8], pgno: u32, op: u32) -> Result<()>;

    /// The key descriptor the codec was constructed with.
    fn key(&self) -> &[u8];

    /// True when the codec can change the database key by rewriting only
    /// page 1. The AES-HMAC scheme declines.
    fn fast_rekey(&mut self) -> bool {
        false
    }

    /// Wipe key material and clear state. Idempotent; also run on drop.
    fn free(&mut self);
}

/// Read-only attach context handed to codec constructors.
#[derive(Debug, Clone, Copy)]
pub struct DbInfo<'a> {
    /// Full path of the database file.
    pub path: &'a str,
    /// Logical database name ("main", "temp", or an attach alias).
    pub name: &'a str,
    /// Page size at attach time.
    pub page_size: usize,
    /// Reserve currently configured in the file.
    pub reserve: usize,
}

/// Scheme constructor: consumes the key descriptor, returns a live codec.
pub type CodecCtor = fn(&DbInfo<'_>, Vec<u8>) -> Result<Box<dyn Codec>>;

struct CodecRegistry {
    map: HashMap<Vec<u8>, CodecCtor>,
}

impl CodecRegistry {
    fn with_builtin() -> Self {
        let mut map: HashMap<Vec<u8>, CodecCtor> = HashMap::new();
        map.insert(b"aes".to_vec(), AesHmac::new_codec);
        Self { map }
    }
}

static REGISTRY: OnceLock<Mutex<CodecRegistry>> = OnceLock::new();

fn registry_lock() -> &'static Mutex<CodecRegistry> {
    REGISTRY.get_or_init(|| Mutex::new(CodecRegistry::with_builtin()))
}

/// Register a scheme constructor. Additive: re-registering a prefix
/// replaces the previous constructor. Expected to run at process init,
/// before any connection attaches.
pub fn register_codec(scheme: &[u8], ctor: CodecCtor) {
    let mut reg = registry_lock().lock().unwrap();
    reg.map.insert(scheme.to_vec(), ctor);
}

/// Resolve the key descriptor's scheme prefix and construct the codec.
///
/// A descriptor with no `:` or an unregistered scheme fails attachment with
/// the generic key error.
pub fn create_codec(info: &DbInfo<'_>, key: Vec<u8>) -> Result<Box<dyn Codec>> {
    let ctor = {
        let reg = registry_lock().lock().unwrap();
        let scheme = scheme_of(&key).ok_or(Error::Key)?;
        reg.map.get(scheme).copied().ok_or(Error::Key)?
    };
    let codec = ctor(info, key)?;
    debug!(
        "codec attached: db={} name={} page_size={} reserve={}",
        info.path,
        info.name,
        info.page_size,
        codec.reserve()
    );
    crate::metrics::record_codec_created();
    Ok(codec)
}
