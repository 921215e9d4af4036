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

use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, warn};

use super::{Deliver, DeliverCtx, DeliverMode};
use crate::model::Action;
use crate::support::error::Error;
use crate::support::template;

/// Pipe the mail into a shell command.
///
/// The command is a template; tags and captures are interpolated at
/// delivery time. Runs in-child, with whatever privileges the child has
/// left.
pub struct DeliverPipe {
    command: String,
}

impl DeliverPipe {
    pub fn new(command: String) -> Self {
        DeliverPipe { command }
    }
}

impl Deliver for DeliverPipe {
    fn mode(&self) -> DeliverMode {
        DeliverMode::InChild
    }

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        action: &Action,
    ) -> Result<(), Error> {
        let command = template::replace(
            &self.command,
            &dctx.mail.tags,
            &dctx.mail.caps,
        );
        if command.is_empty() {
            warn!(
                "{}: empty command for action {}",
                dctx.account.name, action.name
            );
            return Err(Error::DeliveryFailed(action.name.clone()));
        }

        debug!("{}: piping to: {}", dctx.account.name, command);

        let mut process = Command::new("/bin/sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .spawn()?;

        // The pipe may close early (e.g. `head`); that is the command's
        // prerogative, not a failure, as long as its exit status is clean.
        let write_result = process
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(dctx.mail.bytes());

        let status = process.wait()?;
        if !status.success() {
            warn!(
                "{}: command failed ({}): {}",
                dctx.account.name, status, command
            );
            return Err(Error::DeliveryFailed(action.name.clone()));
        }
        if let Err(e) = write_result {
            if std::io::ErrorKind::BrokenPipe != e.kind() {
                return Err(e.into());
            }
        }

        Ok(())
    }
}
