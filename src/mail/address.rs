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

//! Minimal scanning of address-list header values.
//!
//! This is deliberately not a full RFC 5322 parser. It exists to pull the
//! local parts out of `To:`/`Cc:`-style headers so that `find_uid` can map
//! them to system users; for that, handling display names, quoting and
//! angle brackets is enough.

/// Split an address-list header value and return the local part of each
/// address found, in order.
///
/// Commas inside double quotes do not split; a `<...>` group takes
/// precedence over anything outside it.
pub fn local_parts(value: &str) -> Vec<String> {
    split_list(value)
        .iter()
        .filter_map(|item| bare_address(item))
        .filter_map(|addr| {
            addr.split('@').next().map(str::to_owned).filter(|l| {
                !l.is_empty()
            })
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            },
            ',' if !in_quotes => {
                items.push(std::mem::take(&mut current));
            },
            _ => current.push(ch),
        }
    }
    items.push(current);

    items.retain(|i| !i.trim().is_empty());
    items
}

fn bare_address(item: &str) -> Option<String> {
    let trimmed = item.trim();

    if let Some(start) = trimmed.rfind('<') {
        if let Some(end) = trimmed.rfind('>') {
            if end > start {
                return Some(trimmed[start + 1..end].trim().to_owned());
            }
        }
        return None;
    }

    if trimmed.contains('@') {
        Some(trimmed.to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::local_parts;

    #[test]
    fn bare_and_bracketed_addresses() {
        assert_eq!(vec!["alice"], local_parts("alice@example.org"));
        assert_eq!(
            vec!["bob"],
            local_parts("Bob Example <bob@example.org>")
        );
        assert_eq!(vec!["carol"], local_parts("<carol@example.org>"));
    }

    #[test]
    fn lists_split_on_unquoted_commas() {
        assert_eq!(
            vec!["a", "b", "c"],
            local_parts("a@x, Bee <b@y>, \"C, Sea\" <c@z>")
        );
    }

    #[test]
    fn junk_is_skipped() {
        assert!(local_parts("").is_empty());
        assert!(local_parts("undisclosed-recipients:;").is_empty());
        assert_eq!(
            vec!["real"],
            local_parts("not-an-address, real@example.org")
        );
    }
}
