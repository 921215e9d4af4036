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

use log::{error, warn};

use crate::support::error::Error;

/// Permanently drop the process's privileges to `uid`.
///
/// If the current process is not running as root, does nothing: there is
/// nothing to drop.
///
/// If running as root, the process switches its GID, supplementary groups
/// and UID to those of `uid` and verifies the drop took. After a successful
/// return the process cannot regain root.
pub fn drop_to(log_prefix: &str, uid: nix::unistd::Uid) -> Result<(), Error> {
    // Nothing to do if we aren't root
    if nix::unistd::ROOT != nix::unistd::getuid() {
        return Ok(());
    }

    let (has_user_groups, gid) = match nix::unistd::User::from_uid(uid)? {
        Some(user) => {
            match nix::unistd::initgroups(
                &std::ffi::CString::new(user.name.to_owned())
                    .expect("Got UNIX user name with NUL?"),
                user.gid,
            ) {
                Ok(()) => (true, user.gid),
                Err(e) => {
                    warn!(
                        "{} Failed to init groups for user: {}",
                        log_prefix, e
                    );
                    (false, user.gid)
                },
            }
        },
        None => {
            warn!(
                "{} No passwd entry for UID {}, assuming GID {}",
                log_prefix,
                uid,
                uid.as_raw()
            );
            (false, nix::unistd::Gid::from_raw(uid.as_raw()))
        },
    };

    if let Err(e) = if has_user_groups {
        Ok(())
    } else {
        nix::unistd::setgroups(&[gid])
    }
    .and_then(|()| nix::unistd::setgid(gid))
    .and_then(|()| nix::unistd::setuid(uid))
    {
        error!(
            "{} Failed to drop privileges to {}:{}: {}",
            log_prefix, uid, gid, e
        );
        return Err(e.into());
    }

    if nix::unistd::ROOT == nix::unistd::getuid() {
        error!(
            "{} Trawl is still root! You must either \
             (a) run Trawl as a non-root user; or \
             (b) set [settings].child_user to a non-root user.",
            log_prefix
        );
        return Err(nix::Error::EPERM.into());
    }

    Ok(())
}

/// Guard which restores the process's effective UID/GID when dropped.
pub struct RestoreUidGid;

impl Drop for RestoreUidGid {
    fn drop(&mut self) {
        let _ = nix::unistd::seteuid(nix::unistd::getuid());
        let _ = nix::unistd::setegid(nix::unistd::getgid());
    }
}

/// Temporarily assume the effective UID/GID of `uid` for the duration of a
/// single delivery.
///
/// If not running as root, this is a no-op: the delivery proceeds with the
/// invoker's own privileges. The returned guard restores the original
/// effective IDs when it goes out of scope.
pub fn assume_user(
    log_prefix: &str,
    uid: nix::unistd::Uid,
) -> Result<RestoreUidGid, Error> {
    let guard = RestoreUidGid;

    if nix::unistd::ROOT != nix::unistd::getuid() {
        return Ok(guard);
    }

    let gid = match nix::unistd::User::from_uid(uid)? {
        Some(user) => user.gid,
        None => nix::unistd::Gid::from_raw(uid.as_raw()),
    };

    if let Err(e) = nix::unistd::setegid(gid)
        .and_then(|()| nix::unistd::seteuid(uid))
    {
        error!(
            "{} Failed to assume privileges of UID {}: {}",
            log_prefix, uid, e
        );
        return Err(e.into());
    }

    Ok(guard)
}
