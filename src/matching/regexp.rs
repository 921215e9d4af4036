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

use regex::Regex;

use super::MatchPredicate;
use crate::mail::Mail;
use crate::model::Account;
use crate::support::error::Error;

/// What part of the mail a regex predicate runs against.
#[derive(Clone, Debug)]
pub enum RegexpSource {
    /// The value of the first header with this (lowercased) name.
    ///
    /// A mail without the header simply does not match.
    Header(String),
    /// The message body, or the whole message if the body offset is not
    /// yet known.
    Body,
}

/// Regex match predicate.
///
/// On a successful match the capture groups are stored in the mail's
/// capture cache, where later interpolations (`%0`..`%9`) can see them.
pub struct RegexpMatch {
    source: RegexpSource,
    re: Regex,
}

impl RegexpMatch {
    pub fn new(source: RegexpSource, re: Regex) -> Self {
        RegexpMatch { source, re }
    }
}

impl MatchPredicate for RegexpMatch {
    fn matches(
        &self,
        _account: &Account,
        mail: &mut Mail,
    ) -> Result<bool, Error> {
        let subject = match self.source {
            RegexpSource::Header(ref name) => {
                match mail.find_header_string(name, true) {
                    Some(value) => value,
                    None => return Ok(false),
                }
            },
            RegexpSource::Body => {
                let start = mail.body.unwrap_or(0);
                String::from_utf8_lossy(&mail.bytes()[start..])
                    .into_owned()
            },
        };

        match self.re.captures(&subject) {
            Some(caps) => {
                mail.caps.store(&caps);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        match self.source {
            RegexpSource::Header(ref name) => {
                format!("header \"{}\" =~ /{}/", name, self.re.as_str())
            },
            RegexpSource::Body => format!("body =~ /{}/", self.re.as_str()),
        }
    }
}
