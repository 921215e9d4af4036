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

pub mod maildir;
pub mod stdin;

use crate::mail::Mail;
use crate::model::{Account, Decision};
use crate::support::error::Error;

/// The outcome of one `fetch` call.
#[derive(Debug)]
pub enum Fetched {
    /// One message was retrieved.
    Mail(Mail),
    /// The next message exceeds the size limit. Its size is reported for
    /// logging; the backend remembers it as the current message so that
    /// `done` can still discard it when `del_big` is in effect.
    Oversize(u64),
    /// End of account, with no error.
    Complete,
}

/// A source of mail for one account.
///
/// Backends implement whatever subset of the capability set makes sense;
/// the child probes `can_*`/`has_*` before relying on an operation. The
/// default implementations answer "not supported": `start`, `done`,
/// `purge` and `finish` succeed as no-ops, while `poll` and `fetch` must
/// not be called unless the corresponding probe returns true.
pub trait FetchBackend {
    fn can_poll(&self) -> bool {
        false
    }

    fn can_fetch(&self) -> bool {
        false
    }

    fn has_done(&self) -> bool {
        false
    }

    fn has_purge(&self) -> bool {
        false
    }

    /// Runs once, before any `fetch` or `poll`. If this fails, nothing
    /// else is called except `finish`.
    fn start(&mut self, _account: &Account) -> Result<(), Error> {
        Ok(())
    }

    /// Count the messages waiting without fetching them.
    fn poll(&mut self, _account: &Account) -> Result<u32, Error> {
        panic!("poll called on a backend without poll support")
    }

    /// Produce the next message.
    fn fetch(&mut self, _account: &Account) -> Result<Fetched, Error> {
        panic!("fetch called on a backend without fetch support")
    }

    /// Acknowledge the decision for the current message.
    fn done(
        &mut self,
        _account: &Account,
        _decision: Decision,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Reset transient server state; called every `purge_after` processed
    /// mails.
    fn purge(&mut self, _account: &Account) -> Result<(), Error> {
        Ok(())
    }

    /// Runs once on every exit path, success or failure. Must be
    /// idempotent: a signal-driven teardown may race a normal one.
    fn finish(&mut self, _account: &Account) -> Result<(), Error> {
        Ok(())
    }
}
