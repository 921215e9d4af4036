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

//! The privileged side of the privsep pair.
//!
//! The parent keeps whatever privileges the process started with and
//! performs exactly one kind of work on the child's behalf: deliveries
//! that must run as another user. Everything else — fetching, parsing,
//! rule evaluation — happens in the unprivileged child. The parent trusts
//! the child's frames to the extent of resolving the names they carry
//! against its own configuration tables; anything that does not resolve
//! is a protocol breakdown, not a recoverable request.

use log::{debug, warn};

use crate::deliver::{DeliverCtx, DeliverMode};
use crate::mail::tags::TagMap;
use crate::mail::Mail;
use crate::model::{Account, Config};
use crate::privsep::{Channel, Msg, MsgKind};
use crate::support::error::Error;
use crate::support::unix_privileges;

/// Service the child's requests until it sends EXIT.
pub fn run(
    channel: &mut Channel,
    config: &Config,
    account: &Account,
) -> Result<(), Error> {
    loop {
        let (msg, tags, mail_bytes) = channel.recv()?;

        match msg.kind {
            MsgKind::Exit => {
                debug!("{}: child is done", account.name);
                channel.send(&Msg::exit(), None, None)?;
                return Ok(());
            },
            MsgKind::Action => {
                handle_action(
                    channel, config, account, msg, tags, mail_bytes,
                )?;
            },
            MsgKind::Done => return Err(Error::UnexpectedMessage),
        }
    }
}

fn handle_action(
    channel: &mut Channel,
    config: &Config,
    account: &Account,
    msg: Msg,
    tags: Option<Vec<u8>>,
    mail_bytes: Option<Vec<u8>>,
) -> Result<(), Error> {
    if msg.account != account.name {
        return Err(Error::UnknownAccount(msg.account));
    }
    // The child resolved patterns before sending; this is an exact name.
    let action = config
        .actions
        .iter()
        .find(|a| a.name == msg.action)
        .ok_or_else(|| Error::UnknownAction(msg.action.clone()))?;

    let tags = tags.ok_or(Error::BadTagBlob)?;
    let mail_bytes = mail_bytes.ok_or(Error::CorruptedMail)?;
    if mail_bytes.len() as u64 != msg.mail.size {
        return Err(Error::CorruptedMail);
    }

    let mut mail = Mail::new(Vec::new());
    mail.replace_from_wire(&msg.mail, mail_bytes);
    mail.tags = TagMap::from_blob(&tags)?;

    debug!(
        "{}: delivering with action {} as uid {}",
        account.name, action.name, msg.uid
    );

    let failed = {
        let result = unix_privileges::assume_user(
            &account.name,
            nix::unistd::Uid::from_raw(msg.uid),
        )
        .and_then(|_restore_uid_gid| {
            let mut dctx = DeliverCtx {
                account,
                mail: &mut mail,
            };
            action.deliver.deliver(&mut dctx, action)
        });

        match result {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    "{}: delivery error for action {}: {}",
                    account.name, action.name, e
                );
                true
            },
        }
    };

    let blob = mail.tags.to_blob()?;
    let mail_payload = if DeliverMode::WriteBack == action.deliver.mode()
    {
        Some(mail.bytes())
    } else {
        None
    };
    channel.send(
        &Msg::done(failed, mail.to_desc()),
        Some(&blob),
        mail_payload,
    )
}
