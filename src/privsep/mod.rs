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

//! The parent/child privilege-separation channel.
//!
//! One full-duplex channel per child, over a socket pair inherited across
//! the fork. Reads block forever: while the child waits for a reply it has
//! nothing else to do, and the parent is trusted to answer.
//!
//! Each frame is a fixed CBOR-encoded [`Msg`] record preceded by its
//! little-endian u32 length, followed by two length-prefixed payload
//! segments: the tag blob and the mail bytes. A zero length means the
//! segment is absent; whether absence is legal depends on the message kind
//! and is the caller's contract.
//!
//! The C lineage of this protocol identified accounts and actions by
//! pointers into the (identical, pre-fork) configuration of both
//! processes. Pointers do not survive serialization, so the wire carries
//! the names instead and each end resolves them against its own tables;
//! the trust model is unchanged.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::support::error::Error;

#[derive(
    Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq,
)]
#[repr(u8)]
pub enum MsgKind {
    /// Child asks the parent to perform one delivery.
    Action = 0,
    /// Parent's reply to `Action`.
    Done = 1,
    /// Shutdown handshake, both directions.
    Exit = 2,
}

/// The mail-descriptor portion of a message: enough for the receiver to
/// validate or reconstruct the mail that rides in the payload.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
)]
pub struct MailDesc {
    pub size: u64,
    /// Body offset; -1 when not established.
    pub body: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Msg {
    pub kind: MsgKind,
    pub account: String,
    pub action: String,
    pub uid: u32,
    pub error: bool,
    pub mail: MailDesc,
}

impl Msg {
    pub fn action(
        account: &str,
        action: &str,
        uid: u32,
        mail: MailDesc,
    ) -> Self {
        Msg {
            kind: MsgKind::Action,
            account: account.to_owned(),
            action: action.to_owned(),
            uid,
            error: false,
            mail,
        }
    }

    pub fn done(error: bool, mail: MailDesc) -> Self {
        Msg {
            kind: MsgKind::Done,
            account: String::new(),
            action: String::new(),
            uid: 0,
            error,
            mail,
        }
    }

    pub fn exit() -> Self {
        Msg {
            kind: MsgKind::Exit,
            account: String::new(),
            action: String::new(),
            uid: 0,
            error: false,
            mail: MailDesc::default(),
        }
    }
}

/// One end of the privsep channel.
pub struct Channel {
    stream: UnixStream,
}

impl Channel {
    pub fn new(stream: UnixStream) -> Result<Self, Error> {
        // Infinite timeout by contract.
        stream.set_read_timeout(None).map_err(Error::Channel)?;
        stream.set_write_timeout(None).map_err(Error::Channel)?;
        Ok(Channel { stream })
    }

    /// Create a connected pair, one end for each side of a fork.
    pub fn pair() -> Result<(Self, Self), Error> {
        let (a, b) = UnixStream::pair().map_err(Error::Channel)?;
        Ok((Channel::new(a)?, Channel::new(b)?))
    }

    pub fn send(
        &mut self,
        msg: &Msg,
        tags: Option<&[u8]>,
        mail: Option<&[u8]>,
    ) -> Result<(), Error> {
        let record = serde_cbor::to_vec(msg).map_err(|e| {
            Error::Channel(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        self.write_segment(&record)?;
        self.write_segment(tags.unwrap_or(&[]))?;
        self.write_segment(mail.unwrap_or(&[]))?;
        self.stream.flush().map_err(Error::Channel)
    }

    pub fn recv(
        &mut self,
    ) -> Result<(Msg, Option<Vec<u8>>, Option<Vec<u8>>), Error> {
        let record = self.read_segment()?;
        let msg: Msg = serde_cbor::from_slice(&record).map_err(|e| {
            Error::Channel(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        let tags = self.read_segment()?;
        let mail = self.read_segment()?;

        Ok((
            msg,
            if tags.is_empty() { None } else { Some(tags) },
            if mail.is_empty() { None } else { Some(mail) },
        ))
    }

    fn write_segment(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream
            .write_u32::<LittleEndian>(data.len() as u32)
            .and_then(|()| self.stream.write_all(data))
            .map_err(Error::Channel)
    }

    fn read_segment(&mut self) -> Result<Vec<u8>, Error> {
        let len = self
            .stream
            .read_u32::<LittleEndian>()
            .map_err(Error::Channel)? as usize;
        let mut data = vec![0u8; len];
        self.stream.read_exact(&mut data).map_err(Error::Channel)?;
        Ok(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_with_payloads() {
        let (mut a, mut b) = Channel::pair().unwrap();

        let msg = Msg::action(
            "work",
            "inbox",
            1000,
            MailDesc { size: 5, body: 3 },
        );
        a.send(&msg, Some(b"tag-blob"), Some(b"bytes")).unwrap();

        let (got, tags, mail) = b.recv().unwrap();
        assert_eq!(MsgKind::Action, got.kind);
        assert_eq!("work", got.account);
        assert_eq!("inbox", got.action);
        assert_eq!(1000, got.uid);
        assert_eq!(MailDesc { size: 5, body: 3 }, got.mail);
        assert_eq!(Some(b"tag-blob".to_vec()), tags);
        assert_eq!(Some(b"bytes".to_vec()), mail);
    }

    #[test]
    fn absent_payloads_are_none() {
        let (mut a, mut b) = Channel::pair().unwrap();

        a.send(&Msg::exit(), None, None).unwrap();
        let (got, tags, mail) = b.recv().unwrap();
        assert_eq!(MsgKind::Exit, got.kind);
        assert_eq!(None, tags);
        assert_eq!(None, mail);
    }

    #[test]
    fn both_directions_work() {
        let (mut a, mut b) = Channel::pair().unwrap();

        a.send(&Msg::exit(), None, None).unwrap();
        b.recv().unwrap();
        b.send(&Msg::exit(), None, None).unwrap();
        let (got, _, _) = a.recv().unwrap();
        assert_eq!(MsgKind::Exit, got.kind);
    }

    #[test]
    fn closed_peer_is_a_channel_error() {
        let (mut a, b) = Channel::pair().unwrap();
        drop(b);

        assert_matches!(Err(Error::Channel(_)), a.recv());
    }
}
