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

//! The per-mail tag map.
//!
//! Tags are name/value string pairs attached to a mail for use in
//! interpolation. Keys are unique and iteration follows insertion order.
//! Across the privsep channel the map travels as an opaque CBOR blob; the
//! parent may rewrite it wholesale, after which the child re-establishes
//! the derived tags with [`update_tags`].

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMap {
    entries: Vec<(String, String)>,
}

impl TagMap {
    pub fn new() -> Self {
        TagMap::default()
    }

    /// Add `key -> value`, replacing the value (but keeping the position)
    /// of an existing key.
    pub fn add(&mut self, key: &str, value: &str) {
        if let Some(entry) =
            self.entries.iter_mut().find(|(k, _)| k == key)
        {
            entry.1 = value.to_owned();
        } else {
            self.entries.push((key.to_owned(), value.to_owned()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the opaque blob format used on the privsep channel.
    pub fn to_blob(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Deserialize a blob received from the peer.
    ///
    /// A blob that does not decode is a protocol violation, not a malformed
    /// mail.
    pub fn from_blob(blob: &[u8]) -> Result<Self, Error> {
        serde_cbor::from_slice(blob).map_err(|_| Error::BadTagBlob)
    }
}

/// Re-establish the tags the child derives itself.
///
/// Called after the tag map has been swapped for the parent's reply blob,
/// so that later interpolations still see the standing context tags even
/// if the parent rewrote them.
pub fn update_tags(tags: &mut TagMap, account: &str, host: &str) {
    tags.add("account", account);
    tags.add("hostname", host);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insertion_order_is_stable() {
        let mut tags = TagMap::new();
        tags.add("b", "2");
        tags.add("a", "1");
        tags.add("c", "3");

        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(vec!["b", "a", "c"], keys);
    }

    #[test]
    fn add_existing_key_replaces_in_place() {
        let mut tags = TagMap::new();
        tags.add("a", "1");
        tags.add("b", "2");
        tags.add("a", "one");

        assert_eq!(2, tags.len());
        assert_eq!(Some("one"), tags.get("a"));
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(vec!["a", "b"], keys);
    }

    #[test]
    fn blob_round_trip() {
        let mut tags = TagMap::new();
        tags.add("account", "work");
        tags.add("message_id", "<x@y>");

        let blob = tags.to_blob().unwrap();
        let back = TagMap::from_blob(&blob).unwrap();
        assert_eq!(tags, back);
    }

    #[test]
    fn bad_blob_is_a_protocol_error() {
        assert_matches!(
            Err(crate::support::error::Error::BadTagBlob),
            TagMap::from_blob(b"\xff\xff not cbor")
        );
    }

    #[test]
    fn update_tags_restores_derived() {
        let mut tags = TagMap::from_blob(
            &{
                let mut t = TagMap::new();
                t.add("parent_added", "yes");
                t
            }
            .to_blob()
            .unwrap(),
        )
        .unwrap();

        update_tags(&mut tags, "work", "mx.example.org");
        assert_eq!(Some("yes"), tags.get("parent_added"));
        assert_eq!(Some("work"), tags.get("account"));
        assert_eq!(Some("mx.example.org"), tags.get("hostname"));
    }
}
