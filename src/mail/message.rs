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

//! The in-memory representation of one message as it moves through the
//! child's processing loop.

use crate::mail::tags::TagMap;
use crate::model::Decision;
use crate::privsep::MailDesc;
use crate::support::error::Error;
use crate::support::template::CaptureCache;

/// RFC 5322's limit on the length of a physical header line, excluding the
/// terminating newline.
pub const MAX_HEADER_LINE: usize = 998;

/// One message: raw bytes plus the per-mail state the rule program operates
/// on.
///
/// The byte buffer is authoritative: `size()` is always its exact length.
/// `body` is the offset at which the body begins, or `None` until it has
/// been established (freshly fetched mail has not been scanned yet; the
/// offset is recomputed when a write-back delivery replaces the bytes).
pub struct Mail {
    data: Vec<u8>,
    pub body: Option<usize>,
    pub decision: Decision,
    pub tags: TagMap,
    pub caps: CaptureCache,
    pub(super) wrapped: Vec<usize>,
}

impl Mail {
    pub fn new(data: Vec<u8>) -> Self {
        Mail {
            data,
            body: None,
            decision: Decision::Drop,
            tags: TagMap::new(),
            caps: CaptureCache::default(),
            wrapped: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(super) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The body offset as it appears on the wire, with `None` encoded as
    /// -1.
    pub fn body_offset(&self) -> i64 {
        self.body.map(|b| b as i64).unwrap_or(-1)
    }

    pub fn to_desc(&self) -> MailDesc {
        MailDesc {
            size: self.size() as u64,
            body: self.body_offset(),
        }
    }

    /// Replace this mail's bytes with those returned from a write-back
    /// delivery.
    ///
    /// The tag map, decision and capture cache are unaffected; the wrap map
    /// is cleared and must be rebuilt by the caller once the buffer has
    /// settled (after `trim_from`).
    pub fn replace_from_wire(&mut self, desc: &MailDesc, data: Vec<u8>) {
        debug_assert_eq!(desc.size as usize, data.len());
        self.data = data;
        self.body = if desc.body >= 0 && desc.body as usize <= self.size() {
            Some(desc.body as usize)
        } else {
            None
        };
        self.wrapped.clear();
    }

    /// Strip a leading mbox-style `From ` envelope line, if present.
    pub fn trim_from(&mut self) {
        if !self.data.starts_with(b"From ") {
            return;
        }

        let line_end = match self.data.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            // A lone truncated envelope line is the whole message.
            None => self.data.len(),
        };

        self.data.drain(..line_end);
        if let Some(body) = self.body {
            self.body = Some(body.saturating_sub(line_end));
        }
        // Wrap offsets would all shift; nothing has built them yet on the
        // paths that trim, but keep the invariant anyway.
        self.wrapped.clear();
    }

    /// Establish the body offset by scanning for the first blank line.
    pub fn recompute_body(&mut self) {
        self.body = None;
        let mut pos = 0;
        while let Some(nl) =
            self.data[pos..].iter().position(|&b| b == b'\n')
        {
            let nl = pos + nl;
            let rest = &self.data[nl + 1..];
            if rest.starts_with(b"\n") {
                self.body = Some(nl + 2);
                return;
            } else if rest.starts_with(b"\r\n") {
                self.body = Some(nl + 3);
                return;
            }
            pos = nl + 1;
        }
    }

    /// Find the first header named `name` (case-insensitive) and return its
    /// raw value.
    ///
    /// With `trim`, leading whitespace is removed from the value. The
    /// search covers the header section only: it stops at the first blank
    /// line (or the known body offset, whichever comes first).
    pub fn find_header(&self, name: &str, trim: bool) -> Option<&[u8]> {
        let end = self.body.unwrap_or_else(|| self.data.len());
        let mut pos = 0;

        while pos < end {
            let line_end = self.data[pos..end]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| pos + p)
                .unwrap_or(end);
            let line = &self.data[pos..line_end];

            if line.is_empty() || line == b"\r" {
                break;
            }

            if line.len() > name.len()
                && line[name.len()] == b':'
                && line[..name.len()].eq_ignore_ascii_case(name.as_bytes())
            {
                let mut value = &line[name.len() + 1..];
                if trim {
                    while value
                        .first()
                        .map_or(false, |&b| b == b' ' || b == b'\t')
                    {
                        value = &value[1..];
                    }
                }
                if value.last() == Some(&b'\r') {
                    value = &value[..value.len() - 1];
                }
                return Some(value);
            }

            pos = line_end + 1;
        }

        None
    }

    /// Like `find_header`, but lossily decoded to a string.
    pub fn find_header_string(
        &self,
        name: &str,
        trim: bool,
    ) -> Option<String> {
        self.find_header(name, trim)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Prepend a header to the message.
    ///
    /// `text` is the full header including the name, possibly spanning
    /// several physical lines (folded continuations), without a trailing
    /// newline. Fails without modifying the mail if any physical line
    /// exceeds the RFC 5322 limit.
    pub fn insert_header(&mut self, text: &str) -> Result<(), Error> {
        if text.split('\n').any(|line| line.len() > MAX_HEADER_LINE) {
            return Err(Error::HeaderLineTooLong);
        }

        let mut inserted = Vec::with_capacity(text.len() + 1);
        inserted.extend_from_slice(text.as_bytes());
        inserted.push(b'\n');

        let shift = inserted.len();
        self.data.splice(..0, inserted);
        if let Some(body) = self.body {
            self.body = Some(body + shift);
        }
        for off in &mut self.wrapped {
            *off += shift;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Mail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mail")
            .field("size", &self.size())
            .field("body", &self.body)
            .field("decision", &self.decision)
            .field("tags", &self.tags)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMPLE: &[u8] = b"From: a@x\n\
          Subject: hi\n\
          \n\
          body\n";

    #[test]
    fn trim_from_strips_envelope() {
        let mut mail = Mail::new(
            b"From a@x Mon Jan  1 00:00:00 2026\nSubject: hi\n\nbody\n"
                .to_vec(),
        );
        mail.trim_from();
        assert!(mail.bytes().starts_with(b"Subject: hi\n"));

        // A "From:" header is not an envelope line.
        let mut mail = Mail::new(SIMPLE.to_vec());
        let before = mail.size();
        mail.trim_from();
        assert_eq!(before, mail.size());
    }

    #[test]
    fn trim_from_can_empty_the_mail() {
        let mut mail = Mail::new(b"From only-an-envelope\n".to_vec());
        mail.trim_from();
        assert_eq!(0, mail.size());

        let mut mail = Mail::new(b"From truncated-no-newline".to_vec());
        mail.trim_from();
        assert_eq!(0, mail.size());
    }

    #[test]
    fn recompute_body_finds_blank_line() {
        let mut mail = Mail::new(SIMPLE.to_vec());
        mail.recompute_body();
        assert_eq!(Some(23), mail.body);
        assert_eq!(b"body\n", &mail.bytes()[mail.body.unwrap()..]);

        let mut mail = Mail::new(b"Subject: hi\r\n\r\nbody\r\n".to_vec());
        mail.recompute_body();
        assert_eq!(b"body\r\n", &mail.bytes()[mail.body.unwrap()..]);

        let mut mail = Mail::new(b"Subject: no body\n".to_vec());
        mail.recompute_body();
        assert_eq!(None, mail.body);
    }

    #[test]
    fn find_header_is_case_insensitive() {
        let mail = Mail::new(SIMPLE.to_vec());
        assert_eq!(
            Some("hi".to_owned()),
            mail.find_header_string("SUBJECT", true)
        );
        assert_eq!(
            Some(" hi".to_owned()),
            mail.find_header_string("subject", false)
        );
        assert_eq!(None, mail.find_header_string("x-nope", true));
    }

    #[test]
    fn find_header_stops_at_body() {
        let mut mail = Mail::new(
            b"Subject: real\n\nX-Fake: in body\n".to_vec(),
        );
        mail.recompute_body();
        assert_eq!(None, mail.find_header("x-fake", true));
        assert!(mail.find_header("subject", true).is_some());
    }

    #[test]
    fn find_header_strips_cr() {
        let mail = Mail::new(b"Subject: hi\r\n\r\nbody\r\n".to_vec());
        assert_eq!(
            Some("hi".to_owned()),
            mail.find_header_string("subject", true)
        );
    }

    #[test]
    fn insert_header_prepends_and_shifts_body() {
        let mut mail = Mail::new(SIMPLE.to_vec());
        mail.recompute_body();
        let body_before = mail.body.unwrap();

        mail.insert_header("X-Trawl: yes").unwrap();
        assert!(mail.bytes().starts_with(b"X-Trawl: yes\nFrom: a@x\n"));
        assert_eq!(
            body_before + "X-Trawl: yes\n".len(),
            mail.body.unwrap()
        );
        assert_eq!(
            b"body\n",
            &mail.bytes()[mail.body.unwrap()..]
        );
    }

    #[test]
    fn insert_header_refuses_overlong_line() {
        let mut mail = Mail::new(SIMPLE.to_vec());
        let long = format!("X-Long: {}", "x".repeat(MAX_HEADER_LINE));
        assert_matches!(
            Err(Error::HeaderLineTooLong),
            mail.insert_header(&long)
        );
        assert_eq!(SIMPLE, mail.bytes());

        // Folded continuations are measured per physical line.
        let folded = format!(
            "X-Folded: {}\n\t{}",
            "x".repeat(900),
            "y".repeat(900)
        );
        mail.insert_header(&folded).unwrap();
    }

    #[test]
    fn wire_round_trip() {
        let mut mail = Mail::new(SIMPLE.to_vec());
        mail.recompute_body();
        let desc = mail.to_desc();
        assert_eq!(mail.size() as u64, desc.size);
        assert_eq!(mail.body.unwrap() as i64, desc.body);

        let mut other = Mail::new(Vec::new());
        assert_eq!(-1, other.to_desc().body);
        other.replace_from_wire(&desc, SIMPLE.to_vec());
        assert_eq!(mail.size(), other.size());
        assert_eq!(mail.body, other.body);
    }
}
