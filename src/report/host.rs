// src/report/host.rs

//! Identity of the machine, user and process a run happens in.

use std::env;

/// Who and where: stamped on every run record and failure mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub user: String,
    pub pid: u32,
}

impl HostInfo {
    pub fn detect() -> Self {
        Self {
            hostname: current_hostname(),
            user: current_user(),
            pid: std::process::id(),
        }
    }
}

pub fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Name of the invoking user.
///
/// Resolved from the password database by uid, so it stays correct under
/// cron where `$USER` may be unset. Falls back to the usual environment
/// variables.
pub fn current_user() -> String {
    passwd_user()
        .or_else(|| env::var("USER").ok())
        .or_else(|| env::var("USERNAME").ok())
        .or_else(|| env::var("LOGNAME").ok())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn passwd_user() -> Option<String> {
    use std::ffi::CStr;

    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: `passwd` is plain old data; an all-zero value is valid and is
    // only read after getpwuid_r reports success.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: every pointer refers to a live local, and `buf.len()` is the
    // real size of `buf`.
    let rc = unsafe {
        libc::getpwuid_r(
            libc::getuid(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
        return None;
    }

    // SAFETY: on success `pw_name` points into `buf` as a NUL-terminated
    // string, and `buf` outlives this borrow.
    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn passwd_user() -> Option<String> {
    None
}
