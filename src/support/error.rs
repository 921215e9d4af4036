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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No such account: {0}")]
    UnknownAccount(String),
    #[error("No actions matching: {0}")]
    UnknownAction(String),
    #[error("No such user: {0}")]
    UnknownUser(String),
    #[error("Bad configuration: {0}")]
    BadConfig(String),
    #[error("Header line would exceed 998 bytes")]
    HeaderLineTooLong,
    #[error("Delivery failed for action: {0}")]
    DeliveryFailed(String),
    #[error("Unexpected privsep message")]
    UnexpectedMessage,
    #[error("Malformed tag blob in privsep reply")]
    BadTagBlob,
    #[error("Corrupted mail echo in privsep reply")]
    CorruptedMail,
    #[error("Privsep channel error: {0}")]
    Channel(io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Whether this error indicates that the privsep protocol itself has
    /// broken down.
    ///
    /// Such errors terminate the child abnormally, without attempting the
    /// EXIT handshake, since the parent can no longer be trusted to answer.
    pub fn is_protocol_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedMessage
                | Error::BadTagBlob
                | Error::CorruptedMail
                | Error::Channel(_)
        )
    }
}
