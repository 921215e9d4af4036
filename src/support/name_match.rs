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

/// Determine whether `name` matches the shell-style pattern `pattern`.
///
/// `*` matches any run of characters (including none), `?` matches exactly
/// one character, and everything else is compared case-insensitively. This is
/// the matching used for the account lists on rules, where patterns are short
/// and globbing against the file system is explicitly not wanted.
pub fn name_match(pattern: &str, name: &str) -> bool {
    fn matches(pat: &[char], name: &[char]) -> bool {
        match (pat.split_first(), name.split_first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(('*', rest)), _) => {
                // Greedy is unnecessary; try every split point.
                (0..=name.len()).any(|n| matches(rest, &name[n..]))
            },
            (Some((_, _)), None) => false,
            (Some(('?', prest)), Some((_, nrest))) => matches(prest, nrest),
            (Some((p, prest)), Some((n, nrest))) => {
                p.eq_ignore_ascii_case(n) && matches(prest, nrest)
            },
        }
    }

    let pat = pattern.to_lowercase().chars().collect::<Vec<_>>();
    let name = name.to_lowercase().chars().collect::<Vec<_>>();
    matches(&pat, &name)
}
