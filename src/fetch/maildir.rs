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

use std::fs;
use std::path::PathBuf;

use log::debug;

use super::{FetchBackend, Fetched};
use crate::mail::Mail;
use crate::model::{Account, Decision};
use crate::support::error::Error;

/// Fetch from a local maildir.
///
/// `start` snapshots the contents of `new/`; `fetch` walks the snapshot;
/// `done` either unlinks the message (DROP) or moves it to `cur/` with the
/// seen flag (KEEP). Messages larger than `max_size` are reported as
/// oversized without being read.
pub struct MaildirFetch {
    root: PathBuf,
    max_size: u64,
    entries: Vec<PathBuf>,
    next: usize,
    current: Option<PathBuf>,
}

impl MaildirFetch {
    /// `max_size == 0` means unlimited.
    pub fn new(root: PathBuf, max_size: u64) -> Self {
        MaildirFetch {
            root,
            max_size,
            entries: Vec::new(),
            next: 0,
            current: None,
        }
    }
}

impl FetchBackend for MaildirFetch {
    fn can_poll(&self) -> bool {
        true
    }

    fn can_fetch(&self) -> bool {
        true
    }

    fn has_done(&self) -> bool {
        true
    }

    fn start(&mut self, account: &Account) -> Result<(), Error> {
        let new = self.root.join("new");
        for entry in fs::read_dir(&new)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                self.entries.push(entry.path());
            }
        }
        // Deterministic processing order regardless of readdir order.
        self.entries.sort();

        debug!(
            "{}: maildir {} has {} new messages",
            account.name,
            self.root.display(),
            self.entries.len()
        );
        Ok(())
    }

    fn poll(&mut self, _account: &Account) -> Result<u32, Error> {
        Ok(self.entries.len() as u32)
    }

    fn fetch(&mut self, _account: &Account) -> Result<Fetched, Error> {
        let path = match self.entries.get(self.next) {
            Some(path) => path.clone(),
            None => return Ok(Fetched::Complete),
        };
        self.next += 1;
        self.current = Some(path.clone());

        let size = fs::metadata(&path)?.len();
        if self.max_size > 0 && size > self.max_size {
            return Ok(Fetched::Oversize(size));
        }

        Ok(Fetched::Mail(Mail::new(fs::read(&path)?)))
    }

    fn done(
        &mut self,
        account: &Account,
        decision: Decision,
    ) -> Result<(), Error> {
        let path = match self.current.take() {
            Some(path) => path,
            None => return Ok(()),
        };

        match decision {
            Decision::Drop => {
                debug!(
                    "{}: unlinking {}",
                    account.name,
                    path.display()
                );
                fs::remove_file(&path)?;
            },
            Decision::Keep => {
                let name = path
                    .file_name()
                    .expect("maildir entry without a file name")
                    .to_string_lossy()
                    .into_owned();
                let kept =
                    self.root.join("cur").join(format!("{}:2,S", name));
                debug!(
                    "{}: keeping {} as {}",
                    account.name,
                    path.display(),
                    kept.display()
                );
                fs::create_dir_all(self.root.join("cur"))?;
                fs::rename(&path, &kept)?;
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn account() -> Account {
        Account {
            name: "test".to_owned(),
            keep: false,
            find_uid: false,
            users: None,
        }
    }

    fn maildir_with(
        messages: &[(&str, &str)],
    ) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        for sub in &["tmp", "new", "cur"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        for (name, content) in messages {
            fs::write(root.join("new").join(name), content).unwrap();
        }
        (dir, root)
    }

    #[test]
    fn fetches_in_name_order_then_completes() {
        let (_dir, root) = maildir_with(&[
            ("2.msg", "Subject: two\n\nb\n"),
            ("1.msg", "Subject: one\n\na\n"),
        ]);
        let mut backend = MaildirFetch::new(root, 0);
        let account = account();

        backend.start(&account).unwrap();
        assert_eq!(2, backend.poll(&account).unwrap());

        match backend.fetch(&account).unwrap() {
            Fetched::Mail(m) => {
                assert!(m.bytes().starts_with(b"Subject: one\n"))
            },
            other => panic!("unexpected: {:?}", other),
        }
        backend.done(&account, Decision::Keep).unwrap();

        match backend.fetch(&account).unwrap() {
            Fetched::Mail(m) => {
                assert!(m.bytes().starts_with(b"Subject: two\n"))
            },
            other => panic!("unexpected: {:?}", other),
        }
        backend.done(&account, Decision::Drop).unwrap();

        assert_matches!(
            Ok(Fetched::Complete),
            backend.fetch(&account)
        );
    }

    #[test]
    fn done_moves_or_unlinks() {
        let (_dir, root) =
            maildir_with(&[("a.msg", "Subject: a\n\nx\n")]);
        let mut backend = MaildirFetch::new(root.clone(), 0);
        let account = account();

        backend.start(&account).unwrap();
        backend.fetch(&account).unwrap();
        backend.done(&account, Decision::Keep).unwrap();

        assert!(!root.join("new/a.msg").exists());
        assert!(root.join("cur/a.msg:2,S").exists());
    }

    #[test]
    fn oversize_is_reported_and_can_be_dropped() {
        let (_dir, root) =
            maildir_with(&[("big.msg", "Subject: big\n\nbody body\n")]);
        let mut backend = MaildirFetch::new(root.clone(), 10);
        let account = account();

        backend.start(&account).unwrap();
        match backend.fetch(&account).unwrap() {
            Fetched::Oversize(size) => assert!(size > 10),
            other => panic!("unexpected: {:?}", other),
        }

        // del_big path: the oversized message is still the current one
        backend.done(&account, Decision::Drop).unwrap();
        assert!(!root.join("new/big.msg").exists());
    }
}
