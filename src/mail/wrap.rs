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

//! The wrapped-line map.
//!
//! Transports fold long lines by breaking them with a newline followed by
//! whitespace. Match predicates want to see the logical line, so before
//! expression evaluation each fold point is overwritten with a space (the
//! "unwrapped view") and afterwards restored to a newline (the "wrapped
//! view" — the only view that may ever be delivered or transmitted).

use super::message::Mail;

impl Mail {
    /// Scan the message and record every fold point, replacing any previous
    /// map. Returns the number of folds found.
    ///
    /// A fold point is a newline whose following byte is a space or tab.
    pub fn fill_wrapped(&mut self) -> usize {
        self.wrapped.clear();

        let mut folds = Vec::new();
        let data = self.bytes();
        for (off, window) in data.windows(2).enumerate() {
            if b'\n' == window[0]
                && (b' ' == window[1] || b'\t' == window[1])
            {
                folds.push(off);
            }
        }
        self.wrapped = folds;

        self.wrapped.len()
    }

    /// Rewrite every recorded fold point to `c`.
    ///
    /// `b' '` switches to the unwrapped view, `b'\n'` back to the wrapped
    /// view.
    pub fn set_wrapped(&mut self, c: u8) {
        // The offsets were recorded against the current buffer; they cannot
        // be out of range unless the buffer was replaced without rebuilding
        // the map, which replace_from_wire prevents by clearing it.
        for i in 0..self.wrapped.len() {
            let off = self.wrapped[i];
            self.bytes_set(off, c);
        }
    }

    pub(super) fn bytes_set(&mut self, off: usize, value: u8) {
        self.raw_mut()[off] = value;
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::super::message::Mail;

    const FOLDED: &[u8] = b"Subject: a very\n\tlong subject\n\
          To: x@y\n\
          \n\
          first line\n wrapped tail\nlast\n";

    #[test]
    fn fill_finds_folds_in_headers_and_body() {
        let mut mail = Mail::new(FOLDED.to_vec());
        assert_eq!(2, mail.fill_wrapped());
    }

    #[test]
    fn unwrap_and_rewrap_round_trips() {
        let mut mail = Mail::new(FOLDED.to_vec());
        mail.fill_wrapped();

        mail.set_wrapped(b' ');
        assert!(mail
            .bytes()
            .starts_with(b"Subject: a very \tlong subject\n"));
        assert!(!mail.bytes().windows(2).any(|w| b"\n " == w));

        mail.set_wrapped(b'\n');
        assert_eq!(FOLDED, mail.bytes());
    }

    #[test]
    fn no_folds_is_a_no_op() {
        let mut mail = Mail::new(b"Subject: hi\n\nbody\n".to_vec());
        assert_eq!(0, mail.fill_wrapped());
        mail.set_wrapped(b' ');
        assert_eq!(b"Subject: hi\n\nbody\n", mail.bytes());
    }

    proptest! {
        #[test]
        fn rewrap_always_restores_original(
            content in "[a-z \t\n]{0,200}",
        ) {
            let mut mail = Mail::new(content.as_bytes().to_vec());
            mail.fill_wrapped();
            mail.set_wrapped(b' ');
            mail.set_wrapped(b'\n');
            prop_assert_eq!(content.as_bytes(), mail.bytes());
        }
    }
}
