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

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use super::{Deliver, DeliverCtx, DeliverMode};
use crate::model::Action;
use crate::support::cleanup;
use crate::support::error::Error;
use crate::support::template;

static DELIVERY_SEQ: AtomicU32 = AtomicU32::new(0);

/// Deliver into a maildir.
///
/// The path is a template interpolated at delivery time. The file is
/// written to `tmp/` under a unique name and renamed into `new/`, the
/// rename being the commit point; the `tmp/` file is registered with the
/// cleanup registry for the duration of the write. Runs in the parent as
/// the selected user.
pub struct DeliverMaildir {
    path: String,
}

impl DeliverMaildir {
    pub fn new(path: String) -> Self {
        DeliverMaildir { path }
    }

    fn unique_name() -> String {
        // The traditional time.pid.host scheme, plus a sequence number for
        // deliveries within one second.
        let seq = DELIVERY_SEQ.fetch_add(1, Ordering::Relaxed);
        let host = nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned());
        format!(
            "{}.{}_{}.{}",
            chrono::Utc::now().timestamp(),
            nix::unistd::getpid(),
            seq,
            host
        )
    }
}

impl Deliver for DeliverMaildir {
    fn mode(&self) -> DeliverMode {
        DeliverMode::AsUser
    }

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        action: &Action,
    ) -> Result<(), Error> {
        let path = template::replace(
            &self.path,
            &dctx.mail.tags,
            &dctx.mail.caps,
        );
        if path.is_empty() {
            return Err(Error::DeliveryFailed(action.name.clone()));
        }

        let root = PathBuf::from(path);
        for sub in &["tmp", "new", "cur"] {
            fs::create_dir_all(root.join(sub))?;
        }

        let name = Self::unique_name();
        let tmp = root.join("tmp").join(&name);
        let new = root.join("new").join(&name);

        debug!(
            "{}: delivering to maildir {}",
            dctx.account.name,
            root.display()
        );

        cleanup::track(&tmp);
        let result = fs::File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(dctx.mail.bytes())?;
                f.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &new));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            cleanup::untrack(&tmp);
            return Err(e.into());
        }
        cleanup::untrack(&tmp);

        Ok(())
    }
}
