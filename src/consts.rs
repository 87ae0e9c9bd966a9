//! Shared constants: page layout, host op bits, attach limits.

// -------- Page layout --------

/// AES block width; also the width of the per-page IV slot.
pub const AES_BLOCK_SIZE: usize = 16;

/// Default cipher/HMAC key length in bytes (AES-128). Overridden by the
/// `192` / `256` key-descriptor options.
pub const DEFAULT_KEY_LEN: usize = 16;

/// Length the HMAC tag is truncated to in the page trailer.
pub const TAG_LEN: usize = 16;

/// Fixed HKDF info tag for the page-1 derivation. Part of the on-disk
/// format; changing it breaks every existing database.
pub const KDF_INFO: &[u8; 9] = b"go-sqlite";

// Bytes [16, 24) of page 1 hold storage-engine header fields (page size,
// reserve, version counters) that must stay cleartext on disk.
pub const CLEAR_HDR_START: usize = 16;
pub const CLEAR_HDR_END: usize = 24;

/// Width of the file-header prefix that binds the per-database keys to the
/// on-disk file identity (HKDF info for the master-key derivation).
pub const FILE_HDR_LEN: usize = 16;

// -------- Host op bits --------
//
// The host passes an op bitmask to every exec call:
//   1 = rollback-journal page (clear for WAL)
//   2 = disk I/O (always set)
//   4 = encode direction (set on encode, clear on decode)
// Observed values: 3 on decode; 6 on encode for main db / WAL; 7 on encode
// for the rollback journal.

pub const OP_JOURNAL: u32 = 1;
pub const OP_DISK: u32 = 2;
pub const OP_ENCODE: u32 = 4;

// -------- Attach limits --------

/// The host cannot reserve more than 255 bytes per page.
pub const MAX_RESERVE: usize = 255;

/// Each page must keep at least this many usable bytes for the storage
/// engine (at 512-byte pages this caps the reserve at 32).
pub const MIN_USABLE: usize = 480;

/// Valid pager page sizes (powers of two).
pub const MIN_PAGE_SIZE: usize = 512;
pub const MAX_PAGE_SIZE: usize = 65536;
