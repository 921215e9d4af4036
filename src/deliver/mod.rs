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

pub mod add_header;
pub mod decide;
pub mod maildir;
pub mod pipe;

use crate::mail::Mail;
use crate::model::{Account, Action};
use crate::support::error::Error;

/// Where and how a deliverer runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliverMode {
    /// Runs directly in the child, with the child's (dropped) privileges.
    InChild,
    /// Runs in the parent as a selected user; the mail must come back
    /// byte-identical.
    AsUser,
    /// Runs in the parent and rewrites the mail; the new bytes are
    /// returned to the child.
    WriteBack,
}

/// The state a deliverer operates on.
pub struct DeliverCtx<'a> {
    pub account: &'a Account,
    pub mail: &'a mut Mail,
}

/// A delivery backend.
///
/// `deliver` returning `Err` is a delivery failure; for a parent-side
/// action the parent reports it to the child via the error flag rather
/// than by breaking the protocol.
pub trait Deliver: Send + Sync {
    fn mode(&self) -> DeliverMode;

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        action: &Action,
    ) -> Result<(), Error>;
}
