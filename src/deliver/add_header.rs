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

use log::debug;

use super::{Deliver, DeliverCtx, DeliverMode};
use crate::model::Action;
use crate::support::error::Error;
use crate::support::template;

/// Prepend a header to the mail.
///
/// This is a write-back delivery: it runs in the parent and the modified
/// mail is shipped back to the child, which re-trims and re-wraps it so
/// that subsequent rules see the new content.
pub struct DeliverAddHeader {
    header: String,
    value: String,
}

impl DeliverAddHeader {
    pub fn new(header: String, value: String) -> Self {
        DeliverAddHeader { header, value }
    }
}

impl Deliver for DeliverAddHeader {
    fn mode(&self) -> DeliverMode {
        DeliverMode::WriteBack
    }

    fn deliver(
        &self,
        dctx: &mut DeliverCtx,
        action: &Action,
    ) -> Result<(), Error> {
        let header = template::replace(
            &self.header,
            &dctx.mail.tags,
            &dctx.mail.caps,
        );
        if header.is_empty() {
            return Err(Error::DeliveryFailed(action.name.clone()));
        }
        let value = template::replace(
            &self.value,
            &dctx.mail.tags,
            &dctx.mail.caps,
        );

        debug!(
            "{}: adding header: {}: {}",
            dctx.account.name, header, value
        );
        dctx.mail.insert_header(&format!("{}: {}", header, value))?;
        dctx.mail.recompute_body();
        Ok(())
    }
}
