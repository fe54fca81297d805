//! System crypt(3) through libcrypt
//!
//! Shadow hashes are checked with whatever the host's libcrypt supports
//! (yescrypt, gost-yescrypt, sha512-crypt, bcrypt, ...), so a hash written by
//! `passwd` is always one `veil` can verify.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Scratch space for `crypt_r`, in 8-byte words.
///
/// Covers both libxcrypt's `struct crypt_data` (32 KiB) and the larger
/// legacy glibc layout.
const CRYPT_DATA_WORDS: usize = (1 << 18) / 8;

#[link(name = "crypt")]
extern "C" {
    fn crypt_r(phrase: *const c_char, setting: *const c_char, data: *mut c_void) -> *mut c_char;
}

#[cfg(test)]
#[link(name = "crypt")]
extern "C" {
    fn crypt_gensalt_rn(
        prefix: *const c_char,
        count: std::os::raw::c_ulong,
        rbytes: *const c_char,
        nrbytes: std::os::raw::c_int,
        output: *mut c_char,
        output_size: std::os::raw::c_int,
    ) -> *mut c_char;
}

/// Hash `phrase` with the method and salt encoded in `setting`.
///
/// `None` when libcrypt does not understand `setting` or `phrase` holds a NUL.
pub fn crypt(phrase: &[u8], setting: &str) -> Option<Zeroizing<String>> {
    if phrase.contains(&0) {
        return None;
    }
    let mut input = Zeroizing::new(Vec::with_capacity(phrase.len() + 1));
    input.extend_from_slice(phrase);
    input.push(0);
    let setting = CString::new(setting).ok()?;
    let mut data = Zeroizing::new(vec![0u64; CRYPT_DATA_WORDS]);

    // SAFETY: both strings are NUL-terminated and `data` is a zeroed buffer at
    // least as large as `struct crypt_data`. The result points into `data`
    // and is copied out before `data` is dropped.
    let hash = unsafe {
        let out = crypt_r(
            input.as_ptr().cast(),
            setting.as_ptr(),
            data.as_mut_ptr().cast(),
        );
        if out.is_null() {
            return None;
        }
        Zeroizing::new(CStr::from_ptr(out).to_string_lossy().into_owned())
    };

    // libxcrypt reports failure with a "*0" / "*1" token instead of NULL.
    if hash.is_empty() || hash.starts_with('*') {
        return None;
    }
    Some(hash)
}

/// Whether libcrypt can check passwords against `hash`
pub fn supports(hash: &str) -> bool {
    crypt(b"", hash).is_some()
}

/// Check `candidate` against a stored crypt(3) hash
pub fn verify(candidate: &[u8], hash: &str) -> bool {
    match crypt(candidate, hash) {
        Some(computed) => computed.as_bytes().ct_eq(hash.as_bytes()).into(),
        None => false,
    }
}

/// Fresh setting string for the method named by `prefix`, e.g. `"$y$"`
#[cfg(test)]
pub(crate) fn gensalt(prefix: &str) -> Option<String> {
    let prefix = CString::new(prefix).ok()?;
    let mut output = [0 as c_char; 128];

    // SAFETY: a null `rbytes` asks libxcrypt for OS randomness; `output` is
    // large enough for every supported method and is NUL-terminated on success.
    unsafe {
        let out = crypt_gensalt_rn(
            prefix.as_ptr(),
            0,
            std::ptr::null(),
            0,
            output.as_mut_ptr(),
            output.len() as std::os::raw::c_int,
        );
        if out.is_null() {
            return None;
        }
        Some(CStr::from_ptr(out).to_string_lossy().into_owned())
    }
}
