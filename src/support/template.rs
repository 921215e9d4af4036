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

//! Interpolation of tag and regex-capture references in templates.
//!
//! Action names, tag keys and tag values in the configuration may reference
//! the current mail's tags with `%[name]` and the capture groups of the most
//! recent successful regex match with `%0` through `%9`. `%%` produces a
//! literal percent sign. Any reference that does not resolve interpolates to
//! the empty string; whether an empty result is an error is up to the caller
//! (an empty tag key skips the tag, an empty action name matches nothing).

use crate::mail::tags::TagMap;

/// The capture groups of the most recent successful regex match against a
/// mail.
///
/// One cache lives on each mail and is shared by all expression items and
/// all subsequent interpolations against that mail, which is what makes
/// evaluating every expression item (rather than short-circuiting) an
/// observable behavior.
#[derive(Debug, Default)]
pub struct CaptureCache {
    caps: Vec<Option<String>>,
}

impl CaptureCache {
    /// Replace the cached captures with those of `caps`.
    pub fn store(&mut self, caps: &regex::Captures) {
        self.caps.clear();
        self.caps.extend(
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_owned()))
                .take(10),
        );
    }

    pub fn get(&self, n: usize) -> Option<&str> {
        self.caps.get(n).and_then(|c| c.as_deref())
    }
}

/// Interpolate `template` against `tags` and `caps`.
pub fn replace(template: &str, tags: &TagMap, caps: &CaptureCache) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
        if '%' != ch {
            out.push(ch);
            continue;
        }

        match chars.next() {
            Some('%') => out.push('%'),
            Some('[') => {
                let mut name = String::new();
                let mut closed = false;
                for ch in &mut chars {
                    if ']' == ch {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                // An unterminated reference interpolates to nothing, like
                // any other unresolvable reference.
                if closed {
                    if let Some(value) = tags.get(&name) {
                        out.push_str(value);
                    }
                }
            },
            Some(d @ '0'..='9') => {
                if let Some(cap) = caps.get(d as usize - '0' as usize) {
                    out.push_str(cap);
                }
            },
            // Unknown escape or trailing '%': drop it.
            _ => (),
        }
    }

    out
}
