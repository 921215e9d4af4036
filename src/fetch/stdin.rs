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

use std::io::Read;

use super::{FetchBackend, Fetched};
use crate::mail::Mail;
use crate::model::Account;
use crate::support::error::Error;

/// Fetch a single message from standard input.
///
/// This is the procmail-style mode of operation: some other MDA pipes one
/// message in and Trawl files it. Polling makes no sense here and is not
/// offered, and there is no `done`: stdin cannot be acknowledged.
pub struct StdinFetch {
    max_size: u64,
    consumed: bool,
}

impl StdinFetch {
    pub fn new(max_size: u64) -> Self {
        StdinFetch {
            max_size,
            consumed: false,
        }
    }
}

impl FetchBackend for StdinFetch {
    fn can_fetch(&self) -> bool {
        true
    }

    fn fetch(&mut self, _account: &Account) -> Result<Fetched, Error> {
        if self.consumed {
            return Ok(Fetched::Complete);
        }
        self.consumed = true;

        let mut data = Vec::new();
        std::io::stdin().lock().read_to_end(&mut data)?;

        if self.max_size > 0 && data.len() as u64 > self.max_size {
            return Ok(Fetched::Oversize(data.len() as u64));
        }

        Ok(Fetched::Mail(Mail::new(data)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capabilities_are_minimal() {
        let backend = StdinFetch::new(0);
        assert!(backend.can_fetch());
        assert!(!backend.can_poll());
        assert!(!backend.has_done());
        assert!(!backend.has_purge());
    }
}
