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

//! Decision-only "deliverers".
//!
//! `drop` and `keep` actions do not move the mail anywhere; they just set
//! its decision. They run in-child and cannot fail.

use log::debug;

use super::{Deliver, DeliverCtx, DeliverMode};
use crate::model::{Action, Decision};
use crate::support::error::Error;

pub struct DeliverDrop;

impl Deliver for DeliverDrop {
    fn mode(&self) -> DeliverMode {
        DeliverMode::InChild
    }

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        _action: &Action,
    ) -> Result<(), Error> {
        debug!("{}: marking mail for deletion", dctx.account.name);
        dctx.mail.decision = Decision::Drop;
        Ok(())
    }
}

pub struct DeliverKeep;

impl Deliver for DeliverKeep {
    fn mode(&self) -> DeliverMode {
        DeliverMode::InChild
    }

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        _action: &Action,
    ) -> Result<(), Error> {
        debug!("{}: marking mail to keep", dctx.account.name);
        dctx.mail.decision = Decision::Keep;
        Ok(())
    }
}
