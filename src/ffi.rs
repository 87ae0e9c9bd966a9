//! C ABI callback surface for the host pager.
//!
//! Scope (stable, minimal ABI):
//! - init: attach request -> registry lookup -> live codec + reserve
//! - exec: encode (returns codec-owned buffer) / decode (in place)
//! - resize / get_key / rekey / free
//! - last-error query per thread
//!
//! Conventions:
//! - A handle is an opaque pointer from `Box::into_raw`; the host never
//!   looks inside. Every live handle is also tracked in a process-wide set,
//!   so a stray or repeated free is ignored instead of corrupting the heap,
//!   and the host's pointer is the only reference the codec module needs to
//!   honor.
//! - Errors: init returns a nonzero status, exec returns NULL (the host
//!   reads that as an allocation/codec failure). The message is stashed per
//!   thread; fetch with pv_last_error_dup(), free with pv_free_string().
//! - exec takes no locks and performs no allocation.
//!
//! The op argument of exec is a bitmask: 1 = rollback-journal page,
//! 2 = disk I/O, 4 = encode. The encode test is `(op & 4) != 0`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uchar, c_void};
use std::ptr;
use std::slice;
use std::sync::{Mutex, OnceLock};

use crate::codec::{create_codec, Codec, DbInfo};
use crate::consts::{MAX_PAGE_SIZE, MAX_RESERVE, MIN_PAGE_SIZE, MIN_USABLE, OP_ENCODE};
use crate::error::{Error, Result};
use crate::metrics;

pub const PV_OK: c_int = 0;
pub const PV_ERROR: c_int = 1;

// -------- last_error (TLS) --------

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(e: &Error) {
    let s = e.to_string();
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() =
            Some(CString::new(s).unwrap_or_else(|_| CString::new("codec error").unwrap()));
    });
}

/// Returns a newly allocated copy of the current thread's last error string
/// (or NULL). Free with pv_free_string().
#[no_mangle]
pub extern "C" fn pv_last_error_dup() -> *mut c_char {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(s) => s.clone().into_raw(),
        None => ptr::null_mut(),
    })
}

/// Free a string returned by pv_last_error_dup().
#[no_mangle]
pub extern "C" fn pv_free_string(p: *mut c_char) {
    if !p.is_null() {
        unsafe {
            let _ = CString::from_raw(p);
        }
    }
}

// -------- liveness set --------

static LIVE_CODECS: OnceLock<Mutex<HashSet<usize>>> = OnceLock::new();

fn live_set() -> &'static Mutex<HashSet<usize>> {
    LIVE_CODECS.get_or_init(|| Mutex::new(HashSet::new()))
}

// -------- handle --------

/// Opaque wrapper around the codec. Tracks the current page size so page
/// pointers from the host can be reinterpreted as byte regions.
pub struct CodecHandle {
    codec: Box<dyn Codec>,
    page_size: usize,
}

// -------- helpers --------

fn cstr_or_empty<'a>(p: *const c_char) -> Result<&'a str> {
    if p.is_null() {
        return Ok("");
    }
    unsafe { CStr::from_ptr(p) }
        .to_str()
        .map_err(|_| Error::Misuse("database path is not valid utf-8".into()))
}

// -------- init / free --------

/// Attach callback. Resolves the key descriptor against the codec registry.
///
/// Returns PV_OK with `*pp_codec == NULL` when no key is supplied (codec
/// disabled for this database). On success, publishes the handle and the
/// codec's reserve; on failure, returns PV_ERROR with the message in the
/// thread-local error slot.
#[no_mangle]
pub extern "C" fn pv_codec_init(
    _db: *mut c_void,
    z_path: *const c_char,
    z_name: *const c_char,
    page_size: c_int,
    reserve: c_int,
    p_key: *const c_uchar,
    n_key: c_int,
    pp_codec: *mut *mut CodecHandle,
    p_new_reserve: *mut c_int,
) -> c_int {
    if pp_codec.is_null() || p_new_reserve.is_null() {
        return PV_ERROR;
    }
    unsafe {
        *pp_codec = ptr::null_mut();
        *p_new_reserve = reserve;
    }
    // No key: the connection runs unencrypted.
    if p_key.is_null() || n_key <= 0 {
        return PV_OK;
    }

    let res = (|| -> Result<()> {
        if page_size < MIN_PAGE_SIZE as c_int || page_size > MAX_PAGE_SIZE as c_int {
            return Err(Error::Misuse(format!("invalid page size {}", page_size)));
        }
        let ps = page_size as usize;
        let path = cstr_or_empty(z_path)?;
        let name = cstr_or_empty(z_name)?;
        let key = unsafe { slice::from_raw_parts(p_key, n_key as usize) }.to_vec();

        let info = DbInfo {
            path,
            name,
            page_size: ps,
            reserve: reserve.max(0) as usize,
        };
        let mut codec = create_codec(&info, key)?;

        let need = codec.reserve();
        if need > MAX_RESERVE || ps < need + MIN_USABLE {
            codec.free();
            return Err(Error::Misuse(format!(
                "codec reserve {} leaves fewer than {} usable bytes per page",
                need, MIN_USABLE
            )));
        }

        let handle = Box::into_raw(Box::new(CodecHandle {
            codec,
            page_size: ps,
        }));
        live_set().lock().unwrap().insert(handle as usize);
        unsafe {
            *pp_codec = handle;
            *p_new_reserve = need as c_int;
        }
        Ok(())
    })();

    match res {
        Ok(()) => PV_OK,
        Err(e) => {
            set_last_error(&e);
            PV_ERROR
        }
    }
}

/// Release a codec handle. Unknown or already-freed pointers are ignored;
/// the handle pointer is invalid after return.
#[no_mangle]
pub extern "C" fn pv_codec_free(p_codec: *mut CodecHandle) {
    if p_codec.is_null() {
        return;
    }
    if !live_set().lock().unwrap().remove(&(p_codec as usize)) {
        return;
    }
    let mut handle = unsafe { Box::from_raw(p_codec) };
    handle.codec.free();
    metrics::record_codec_freed();
}

// -------- exec / resize / get_key / rekey --------

/// Page I/O callback. Encode iff `(op & 4) != 0`.
///
/// Encode returns a pointer into the codec's reusable buffer, valid until
/// the next encode on the same handle; the host must not modify it. Decode
/// mutates the page in place and returns the original pointer. NULL means
/// failure either way.
#[no_mangle]
pub extern "C" fn pv_codec_exec(
    p_codec: *mut CodecHandle,
    p_data: *mut c_uchar,
    pgno: u32,
    op: c_int,
) -> *mut c_uchar {
    if p_codec.is_null() || p_data.is_null() {
        return ptr::null_mut();
    }
    let handle = unsafe { &mut *p_codec };
    let page = unsafe { slice::from_raw_parts_mut(p_data, handle.page_size) };

    if (op as u32) & OP_ENCODE != 0 {
        match handle.codec.encode(page, pgno, op as u32) {
            Ok(out) => out.as_ptr() as *mut c_uchar,
            Err(e) => {
                set_last_error(&e);
                ptr::null_mut()
            }
        }
    } else {
        match handle.codec.decode(page, pgno, op as u32) {
            Ok(()) => p_data,
            Err(e) => {
                set_last_error(&e);
                ptr::null_mut()
            }
        }
    }
}

/// Page-size / reserve change callback. Called once on attach and after
/// every page-size change.
#[no_mangle]
pub extern "C" fn pv_codec_resize(p_codec: *mut CodecHandle, page_size: c_int, reserve: c_int) {
    if p_codec.is_null() {
        return;
    }
    let handle = unsafe { &mut *p_codec };
    handle.page_size = page_size as usize;
    handle.codec.resize(page_size as usize, reserve as usize);
}

/// Return the stored key descriptor. The pointer borrows the codec's own
/// storage and stays valid until pv_codec_free().
#[no_mangle]
pub extern "C" fn pv_codec_get_key(
    p_codec: *mut CodecHandle,
    pp_key: *mut *const c_uchar,
    pn_key: *mut c_int,
) {
    if pp_key.is_null() || pn_key.is_null() {
        return;
    }
    unsafe {
        *pp_key = ptr::null();
        *pn_key = 0;
    }
    if p_codec.is_null() {
        return;
    }
    let handle = unsafe { &*p_codec };
    let key = handle.codec.key();
    if !key.is_empty() {
        unsafe {
            *pp_key = key.as_ptr();
            *pn_key = key.len() as c_int;
        }
    }
}

/// Rekey request. Succeeds only when the codec can rewrite the key via
/// page 1 alone; the AES-HMAC scheme cannot, so the database keeps its
/// original key and stays readable.
#[no_mangle]
pub extern "C" fn pv_codec_rekey(
    p_codec: *mut CodecHandle,
    _p_key: *const c_uchar,
    _n_key: c_int,
) -> c_int {
    if !p_codec.is_null() {
        let handle = unsafe { &mut *p_codec };
        if handle.codec.fast_rekey() {
            return PV_OK;
        }
    }
    set_last_error(&Error::Misuse("rekey is not implemented".into()));
    PV_ERROR
}
