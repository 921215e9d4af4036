//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Trawl.
//
// Trawl is free software: you can  redistribute it and/or  modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Trawl is distributed  in the hope that  it will  be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Trawl. If not, see <http://www.gnu.org/licenses/>.

//! Registry of partially-written files that must not outlive the process.
//!
//! Deliverers register their temporary files here before writing and
//! unregister them once the file has been atomically moved into place. If
//! the process is killed mid-delivery, `purge` (called from the SIGTERM
//! handler) unlinks whatever is still registered.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::error;

lazy_static! {
    static ref TRACKED: Mutex<Vec<CString>> = Mutex::new(Vec::new());
}

/// Register `path` for removal on abnormal termination.
pub fn track(path: &Path) {
    if let Ok(c) = CString::new(path.as_os_str().as_bytes()) {
        TRACKED.lock().unwrap().push(c);
    }
}

/// Unregister `path` after it has safely reached its final location.
pub fn untrack(path: &Path) {
    if let Ok(c) = CString::new(path.as_os_str().as_bytes()) {
        TRACKED.lock().unwrap().retain(|p| *p != c);
    }
}

/// Forget all registrations without removing anything.
///
/// Called in a freshly-forked child: any partial state registered so far
/// belongs to the parent.
pub fn flush() {
    if let Ok(mut tracked) = TRACKED.try_lock() {
        tracked.clear();
    }
}

/// Unlink every registered partial file.
///
/// This runs from the SIGTERM handler, so it must stay async-signal-safe:
/// `try_lock` rather than `lock`, and raw `unlink` rather than anything
/// that allocates. If the lock is held we lose the purge, which matches
/// the best-effort contract.
pub fn purge() {
    if let Ok(tracked) = TRACKED.try_lock() {
        for path in tracked.iter() {
            unsafe {
                nix::libc::unlink(path.as_ptr());
            }
        }
    }
}

/// Verify that nothing is left registered on a normal exit path.
pub fn check() {
    let tracked = TRACKED.lock().unwrap();
    if !tracked.is_empty() {
        error!(
            "{} partial file(s) still tracked at exit",
            tracked.len()
        );
    }
}
