//! codec/aes_hmac — the AES-HMAC page cryptosystem.
//!
//! Encrypt-then-MAC over fixed-size pages. Tail layout of every page
//! (reserve = K + 16 + T):
//!
//!   [0, P-R)          plaintext in / ciphertext on disk
//!   [P-R, P-16-T)     master-key slot (K bytes; populated on page 1 only)
//!   [P-16-T, P-T)     per-page random IV (HKDF salt on page 1)
//!   [P-T, P)          HMAC tag, truncated to T bytes
//!
//! The authenticated region is everything but the tag; the encrypted region
//! is everything but the IV and tag, so the master-key slot of page 1 rides
//! inside the ciphertext.
//!
//! Page 1 is special twice over. Its bytes [16, 24) hold storage-engine
//! header fields that must stay cleartext on disk and be restored after
//! decryption. And it carries the master key: minted by the CSPRNG on the
//! first encode of a fresh database, recovered from the decrypted slot on
//! the first decode of an existing one. The per-database cipher/MAC keys
//! come from HKDF over that master key — which means page 1 itself cannot
//! be encrypted under them (decrypting it would need the key it contains).
//! Page 1 instead uses one-shot keys and IV derived from the caller's
//! secret with the page IV as salt; all other pages use the per-database
//! keys.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::consts::{
    AES_BLOCK_SIZE, CLEAR_HDR_END, CLEAR_HDR_START, DEFAULT_KEY_LEN, FILE_HDR_LEN, KDF_INFO,
    TAG_LEN,
};
use crate::crypto::{fill_random, hkdf, tags_equal, HashKind, PageMac, PageStream, StreamMode};
use crate::error::{Error, Result};
use crate::key::{parse_key, split_options};
use crate::metrics;

use super::{Codec, DbInfo};

/// Per-database key material, derived exactly once per codec instance from
/// the master key stored in page 1.
struct DbKeys {
    cipher_key: Zeroizing<Vec<u8>>,
    mac: PageMac,
}

/// AES + truncated-HMAC page codec (scheme prefix `aes`).
///
/// Options in the key descriptor: `192`/`256` select the AES key size
/// (default 128), `ofb` selects OFB over the default CTR, `sha256` selects
/// SHA-256 over the default SHA-1.
pub struct AesHmac {
    /// Full key descriptor; wiped in place on free.
    key: Zeroizing<Vec<u8>>,
    /// Offset of the master secret inside `key`.
    secret_off: usize,

    k_len: usize,
    t_len: usize,
    hash: HashKind,
    mode: StreamMode,

    /// Negotiated page size; 0 until the first resize.
    page_size: usize,
    /// Reusable encode/verify buffer. Allocated length is
    /// `page_size - t_len + output_len(hash)` so the MAC can always write a
    /// full-width digest into the tag slot; the page view is `[..page_size]`.
    buf: Vec<u8>,

    db_keys: Option<DbKeys>,
}

impl std::fmt::Debug for AesHmac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesHmac")
            .field("k_len", &self.k_len)
            .field("t_len", &self.t_len)
            .field("hash", &self.hash)
            .field("mode", &self.mode)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl AesHmac {
    /// Parse options and build a codec. The descriptor is owned from here
    /// on and wiped even on the error paths.
    pub fn new(_info: &DbInfo<'_>, key: Vec<u8>) -> Result<AesHmac> {
        let key = Zeroizing::new(key);

        let mut k_len = DEFAULT_KEY_LEN;
        let mut hash = HashKind::Sha1;
        let mut mode = StreamMode::Ctr;
        let secret_off;
        {
            let parsed = parse_key(&key)?;
            for tok in split_options(parsed.options) {
                match tok {
                    b"192" => k_len = 24,
                    b"256" => k_len = 32,
                    b"ofb" => mode = StreamMode::Ofb,
                    b"sha256" => hash = HashKind::Sha256,
                    _ => {
                        return Err(Error::Misuse(format!(
                            "invalid codec option: {}",
                            String::from_utf8_lossy(tok)
                        )))
                    }
                }
            }
            secret_off = key.len() - parsed.secret.len();
        }

        Ok(AesHmac {
            key,
            secret_off,
            k_len,
            t_len: TAG_LEN,
            hash,
            mode,
            page_size: 0,
            buf: Vec::new(),
            db_keys: None,
        })
    }

    /// Registry entry point.
    pub fn new_codec(info: &DbInfo<'_>, key: Vec<u8>) -> Result<Box<dyn Codec>> {
        Ok(Box::new(AesHmac::new(info, key)?))
    }

    // ---------- Layout ----------

    /// Authenticated prefix: everything but the tag.
    fn auth_len(&self) -> usize {
        self.page_size - self.t_len
    }

    /// Encrypted prefix: everything but the IV and tag.
    fn text_len(&self) -> usize {
        self.page_size - self.t_len - AES_BLOCK_SIZE
    }

    /// Offset of the master-key slot.
    fn key_slot_off(&self) -> usize {
        self.text_len() - self.k_len
    }

    // ---------- Keying ----------

    /// Derive the per-database cipher/MAC keys from the master key in
    /// `page`'s key slot. On `new_key`, mint the master key into the slot
    /// first. Page 1 only; runs once per codec instance.
    fn bootstrap(&mut self, page: &mut [u8], pgno: u32, new_key: bool) -> Result<()> {
        if pgno != 1 {
            return Err(Error::Codec("codec not initialized: page 1 comes first"));
        }

        let slot = self.key_slot_off()..self.key_slot_off() + self.k_len;
        if new_key {
            fill_random(&mut page[slot.clone()])
                .map_err(|_| Error::Codec("master key generation failed"))?;
        }

        // Bind the derived keys to the on-disk file identity via its header.
        let dk = hkdf::derive(
            self.hash,
            &page[slot],
            None,
            &page[..FILE_HDR_LEN],
            2 * self.k_len,
        )?;
        let mac = PageMac::new(self.hash, &dk[self.k_len..]);
        self.db_keys = Some(DbKeys {
            cipher_key: Zeroizing::new(dk[..self.k_len].to_vec()),
            mac,
        });

        debug!(
            "codec bootstrap complete ({} database)",
            if new_key { "new" } else { "existing" }
        );
        Ok(())
    }

    /// One-shot stream and MAC for page 1, derived from the caller's secret
    /// with the page IV as salt.
    fn page1_keys(&self, iv: &[u8; AES_BLOCK_SIZE]) -> Result<(PageStream, PageMac)> {
        let kl = self.k_len;
        let dk = hkdf::derive(
            self.hash,
            &self.key[self.secret_off..],
            Some(iv),
            KDF_INFO,
            2 * kl + AES_BLOCK_SIZE,
        )?;
        let stream_iv: [u8; AES_BLOCK_SIZE] =
            dk[2 * kl..].try_into().expect("derived iv width");
        let stream = PageStream::new(self.mode, &dk[..kl], &stream_iv);
        let mac = PageMac::new(self.hash, &dk[kl..2 * kl]);
        Ok((stream, mac))
    }

    // ---------- Wipe ----------

    fn wipe(&mut self) {
        self.key.zeroize();
        self.secret_off = 0;
        self.db_keys = None; // cipher key is Zeroizing, wiped on drop
        self.buf.zeroize();
        self.page_size = 0;
    }
}

/// MAC prefix: the page number, big-endian.
fn mac_pgno(mac: &mut PageMac, pgno: u32) {
    let mut be = [0u8; 4];
    BigEndian::write_u32(&mut be, pgno);
    mac.update(&be);
}

impl Codec for AesHmac {
    fn reserve(&self) -> usize {
        self.k_len + AES_BLOCK_SIZE + self.t_len
    }

    fn resize(&mut self, page_size: usize, reserve: usize) {
        assert!(
            reserve == self.reserve(),
            "codec reserve value mismatch: pager negotiated {}, codec needs {}",
            reserve,
            self.reserve()
        );
        self.page_size = page_size;
        self.buf = vec![0u8; page_size - self.t_len + self.hash.output_len()];
    }

    fn encode(&mut self, page: &mut [u8], pgno: u32, _op: u32) -> Result<&[u8]> {
        assert!(self.page_size != 0, "codec used before resize");
        assert!(
            page.len() == self.page_size,
            "page length {} does not match the negotiated page size {}",
            page.len(),
            self.page_size
        );
        assert!(pgno >= 1, "page numbers start at 1");

        let text_len = self.text_len();
        let auth_len = self.auth_len();
        let h_out = self.hash.output_len();

        // Fresh IV for this write; doubles as the HKDF salt on page 1.
        fill_random(&mut self.buf[text_len..text_len + AES_BLOCK_SIZE])?;

        // First write of a fresh database mints the master key on page 1.
        if self.db_keys.is_none() {
            self.bootstrap(page, pgno, true)?;
        }

        let iv: [u8; AES_BLOCK_SIZE] = self.buf[text_len..text_len + AES_BLOCK_SIZE]
            .try_into()
            .expect("iv slot width");

        if pgno == 1 {
            let (mut stream, mut mac) = self.page1_keys(&iv)?;
            stream.xor_into(&page[..text_len], &mut self.buf[..text_len]);
            // The storage engine reads these header fields straight off the
            // disk image; they must survive encryption bit-identical.
            self.buf[CLEAR_HDR_START..CLEAR_HDR_END]
                .copy_from_slice(&page[CLEAR_HDR_START..CLEAR_HDR_END]);
            let (authed, tag_area) = self.buf.split_at_mut(auth_len);
            mac_pgno(&mut mac, pgno);
            mac.update(authed);
            mac.finalize_reset_into(&mut tag_area[..h_out]);
        } else {
            let Self {
                db_keys, buf, mode, ..
            } = self;
            let keys = db_keys.as_mut().expect("bootstrapped above");
            let mut stream = PageStream::new(*mode, &keys.cipher_key, &iv);
            stream.xor_into(&page[..text_len], &mut buf[..text_len]);
            let (authed, tag_area) = buf.split_at_mut(auth_len);
            mac_pgno(&mut keys.mac, pgno);
            keys.mac.update(authed);
            keys.mac.finalize_reset_into(&mut tag_area[..h_out]);
        }

        metrics::record_page_encoded();
        Ok(&self.buf[..self.page_size])
    }

    fn decode(&mut self, page: &mut [u8], pgno: u32, _op: u32) -> Result<()> {
        assert!(self.page_size != 0, "codec used before resize");
        assert!(
            page.len() == self.page_size,
            "page length {} does not match the negotiated page size {}",
            page.len(),
            self.page_size
        );
        assert!(pgno >= 1, "page numbers start at 1");

        let text_len = self.text_len();
        let auth_len = self.auth_len();
        let h_out = self.hash.output_len();
        let t_len = self.t_len;

        let iv: [u8; AES_BLOCK_SIZE] = page[text_len..text_len + AES_BLOCK_SIZE]
            .try_into()
            .expect("iv slot width");

        if pgno == 1 {
            let (mut stream, mut mac) = self.page1_keys(&iv)?;

            // Verify before touching a single page byte.
            mac_pgno(&mut mac, pgno);
            mac.update(&page[..auth_len]);
            mac.finalize_reset_into(&mut self.buf[auth_len..auth_len + h_out]);
            if !tags_equal(&self.buf[auth_len..auth_len + t_len], &page[auth_len..]) {
                metrics::record_tag_failure();
                warn!("page {} tag verification failed", pgno);
                return Err(Error::Codec("page tag mismatch"));
            }

            // Header bytes [16, 24) were stored cleartext; stash them,
            // decrypt in place, put them back.
            let mut hdr = [0u8; CLEAR_HDR_END - CLEAR_HDR_START];
            hdr.copy_from_slice(&page[CLEAR_HDR_START..CLEAR_HDR_END]);
            stream.xor_in_place(&mut page[..text_len]);
            page[CLEAR_HDR_START..CLEAR_HDR_END].copy_from_slice(&hdr);

            // First decode of an existing database: the master key is now
            // sitting decrypted in its slot. The only moment it is read.
            if self.db_keys.is_none() {
                self.bootstrap(page, pgno, false)?;
            }
        } else {
            let Self {
                db_keys, buf, mode, ..
            } = self;
            let keys = db_keys
                .as_mut()
                .ok_or(Error::Codec("codec not initialized: page 1 comes first"))?;

            mac_pgno(&mut keys.mac, pgno);
            keys.mac.update(&page[..auth_len]);
            keys.mac.finalize_reset_into(&mut buf[auth_len..auth_len + h_out]);
            if !tags_equal(&buf[auth_len..auth_len + t_len], &page[auth_len..]) {
                metrics::record_tag_failure();
                warn!("page {} tag verification failed", pgno);
                return Err(Error::Codec("page tag mismatch"));
            }

            let mut stream = PageStream::new(*mode, &keys.cipher_key, &iv);
            stream.xor_in_place(&mut page[..text_len]);
        }

        metrics::record_page_decoded();
        Ok(())
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn fast_rekey(&mut self) -> bool {
        // Rekeying would mean re-encrypting every page.
        false
    }

    fn free(&mut self) {
        self.wipe();
    }
}

impl Drop for AesHmac {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DbInfo<'static> {
        DbInfo {
            path: "t.db",
            name: "main",
            page_size: 4096,
            reserve: 0,
        }
    }

    #[test]
    fn reserve_follows_key_size() {
        let c = AesHmac::new(&info(), b"aes::k".to_vec()).unwrap();
        assert_eq!(c.reserve(), 16 + 16 + 16);
        let c = AesHmac::new(&info(), b"aes:192:k".to_vec()).unwrap();
        assert_eq!(c.reserve(), 24 + 16 + 16);
        let c = AesHmac::new(&info(), b"aes:256,ofb,sha256:k".to_vec()).unwrap();
        assert_eq!(c.reserve(), 32 + 16 + 16);
    }

    #[test]
    fn buffer_has_room_for_a_full_digest() {
        let mut c = AesHmac::new(&info(), b"aes:sha256:k".to_vec()).unwrap();
        let r = c.reserve();
        c.resize(4096, r);
        // page view + (digest width - tag width) of slack
        assert_eq!(c.buf.len(), 4096 - 16 + 32);
    }

    #[test]
    #[should_panic(expected = "reserve value mismatch")]
    fn resize_with_foreign_reserve_panics() {
        let mut c = AesHmac::new(&info(), b"aes::k".to_vec()).unwrap();
        c.resize(4096, 20);
    }

    #[test]
    #[should_panic(expected = "before resize")]
    fn encode_before_resize_panics() {
        let mut c = AesHmac::new(&info(), b"aes::k".to_vec()).unwrap();
        let mut page = vec![0u8; 4096];
        let _ = c.encode(&mut page, 1, 6);
    }

    #[test]
    fn encode_of_later_page_first_is_an_error() {
        let mut c = AesHmac::new(&info(), b"aes::k".to_vec()).unwrap();
        let r = c.reserve();
        c.resize(4096, r);
        let mut page = vec![0u8; 4096];
        let err = c.encode(&mut page, 2, 6).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn decode_of_later_page_first_is_an_error() {
        let mut c = AesHmac::new(&info(), b"aes::k".to_vec()).unwrap();
        let r = c.reserve();
        c.resize(4096, r);
        let mut page = vec![0u8; 4096];
        let err = c.decode(&mut page, 3, 3).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
