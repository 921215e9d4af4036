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

//! The per-account child process: fetches each message, runs the rule
//! program over it, and coordinates privileged deliveries with the parent.

pub mod actions;
pub mod rules;

use std::time::Instant;

use log::{debug, info, warn};

use self::rules::MatchCtx;
use crate::fetch::{FetchBackend, Fetched};
use crate::mail::Mail;
use crate::model::{Account, Config, Decision, ImplicitDecision};
use crate::privsep::{Channel, Msg, MsgKind};
use crate::support::cleanup;
use crate::support::error::Error;
use crate::support::unix_privileges;

/// The operation the parent asked this child to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildOp {
    Fetch,
    Poll,
}

/// Run the child for one account.
///
/// `Ok(true)` means some phase failed and the process should exit 1 after
/// the normal cleanup check. `Err` means the privsep protocol (or setup so
/// fundamental that nothing can be reported) broke down: the EXIT
/// handshake is not attempted and the caller must exit immediately.
pub fn run(
    channel: &mut Channel,
    op: ChildOp,
    account: &Account,
    backend: &mut dyn FetchBackend,
    config: &Config,
) -> Result<bool, Error> {
    install_signal_handlers()?;
    debug!(
        "{}: started, pid {}",
        account.name,
        nix::unistd::getpid()
    );

    if !nix::unistd::geteuid().is_root() {
        debug!(
            "{}: not root. not dropping privileges",
            account.name
        );
    } else if let Some(uid) = config.child_user {
        debug!("{}: changing to uid {}", account.name, uid);
        unix_privileges::drop_to(&account.name, uid)?;
    } else {
        warn!(
            "{}: running as root with no child_user configured",
            account.name
        );
    }

    let mut error = false;
    let supported = match op {
        ChildOp::Poll => backend.can_poll(),
        ChildOp::Fetch => backend.can_fetch(),
    };

    if !supported {
        info!(
            "{}: {} not supported",
            account.name,
            match op {
                ChildOp::Poll => "polling",
                ChildOp::Fetch => "fetching",
            }
        );
        error = true;
    } else {
        let started = Instant::now();

        // Start fetch
        if let Err(e) = backend.start(account) {
            debug!("{}: start error. aborting: {}", account.name, e);
            error = true;
        } else {
            debug!("{}: started processing", account.name);
            error = match op {
                ChildOp::Poll => poll_account(account, backend),
                ChildOp::Fetch => fetch_account(
                    channel, account, backend, config, started,
                )?,
            };
            debug!("{}: finished processing. exiting", account.name);
        }
    }

    // Finish fetch; its failure upgrades success to failure, never the
    // other way around.
    if let Err(e) = backend.finish(account) {
        warn!("{}: finish error: {}", account.name, e);
        error = true;
    }

    debug!("{}: sending exit message to parent", account.name);
    channel.send(&Msg::exit(), None, None)?;
    debug!(
        "{}: waiting for exit message from parent",
        account.name
    );
    let (reply, _, _) = channel.recv()?;
    if MsgKind::Exit != reply.kind {
        return Err(Error::UnexpectedMessage);
    }

    Ok(error)
}

fn poll_account(account: &Account, backend: &mut dyn FetchBackend) -> bool {
    debug!("{}: polling", account.name);

    match backend.poll(account) {
        Err(e) => {
            warn!("{}: polling error. aborted: {}", account.name, e);
            true
        },
        Ok(n) => {
            info!("{}: {} messages found", account.name, n);
            false
        },
    }
}

fn fetch_account(
    channel: &mut Channel,
    account: &Account,
    backend: &mut dyn FetchBackend,
    config: &Config,
    started: Instant,
) -> Result<bool, Error> {
    debug!("{}: fetching", account.name);

    let mut cause: Option<&'static str> = None;
    let mut purge_count = 0u32;
    let mut dropped = 0u32;
    let mut kept = 0u32;

    loop {
        // Fetch a message. `mail` stays `None` when an oversized message
        // is being accepted straight into the done-block.
        let mut mail: Option<Mail> = None;
        match backend.fetch(account) {
            Err(e) => {
                debug!("{}: fetch error: {}", account.name, e);
                cause = Some("fetching");
                break;
            },
            Ok(Fetched::Complete) => break,
            Ok(Fetched::Oversize(size)) => {
                warn!(
                    "{}: message too big: {} bytes",
                    account.name, size
                );
                if !config.del_big {
                    cause = Some("fetching");
                    break;
                }
            },
            Ok(Fetched::Mail(mut m)) => {
                m.trim_from();
                if 0 == m.size() {
                    warn!(
                        "{}: got empty message. ignored",
                        account.name
                    );
                    continue;
                }

                // Handle match/delivery
                match fetch_got(channel, account, &mut m, config, &mut cause)
                {
                    Ok(()) => (),
                    Err(e) if e.is_protocol_fatal() => return Err(e),
                    Err(e) => {
                        debug!("{}: {}", account.name, e);
                        if cause.is_none() {
                            cause = Some("matching");
                        }
                        break;
                    },
                }
                mail = Some(m);
            },
        }

        // Finished with the message
        let decision = mail
            .as_ref()
            .map(|m| m.decision)
            .unwrap_or(Decision::Drop);
        if backend.has_done() {
            match decision {
                Decision::Drop => {
                    debug!("{}: deleting message", account.name);
                    cause = Some("deleting");
                    dropped += 1;
                },
                Decision::Keep => {
                    debug!("{}: keeping message", account.name);
                    cause = Some("keeping");
                    kept += 1;
                },
            }
            if backend.done(account, decision).is_err() {
                break;
            }
            cause = None;
        }

        if config.purge_after > 0 && backend.has_purge() {
            purge_count += 1;
            if purge_count >= config.purge_after {
                debug!(
                    "{}: {} mails, purging",
                    account.name, purge_count
                );
                if backend.purge(account).is_err() {
                    cause = Some("purging");
                    break;
                }
                purge_count = 0;
            }
        }
    }

    if let Some(cause) = cause {
        warn!("{}: {} error. aborted", account.name, cause);
    }

    let elapsed = started.elapsed().as_secs_f64();
    let n = dropped + kept;
    if n > 0 {
        info!(
            "{}: {} messages processed ({} kept) in {:.3} seconds \
             (average {:.3})",
            account.name,
            n,
            kept,
            elapsed,
            elapsed / f64::from(n)
        );
    } else {
        info!(
            "{}: {} messages processed in {:.3} seconds",
            account.name, n, elapsed
        );
    }

    Ok(cause.is_some())
}

/// Per-mail orchestration: tag, stamp, wrap, evaluate, decide.
fn fetch_got(
    channel: &mut Channel,
    account: &Account,
    mail: &mut Mail,
    config: &Config,
    cause: &mut Option<&'static str>,
) -> Result<(), Error> {
    debug!(
        "{}: got message: size {}, body {}",
        account.name,
        mail.size(),
        mail.body_offset()
    );

    match mail.find_header_string("message-id", true) {
        Some(id) if !id.is_empty() => {
            debug!("{}: message-id is: {}", account.name, id);
            mail.tags.add("message_id", &id);
        },
        _ => debug!("{}: message-id not found", account.name),
    }

    // Insert received header.
    //
    // No header line must exceed 998 bytes. Limiting the user-supplied
    // parts to 450 bytes each leaves plenty of room for the rest.
    if !config.no_received {
        let host: String = config.host.chars().take(450).collect();
        let name: String = account.name.chars().take(450).collect();
        let line = format!(
            "Received: by {} (trawl {}, account \"{}\");\n\t{}",
            host,
            env!("CARGO_PKG_VERSION"),
            name,
            chrono::Local::now().to_rfc2822()
        );
        if mail.insert_header(&line).is_err() {
            debug!(
                "{}: failed to add received header",
                account.name
            );
        }
    }

    // Fill wrapped line list
    let lines = mail.fill_wrapped();
    debug!("{}: found {} wrapped lines", account.name, lines);

    // Handle rule evaluation and actions
    let mut mctx = MatchCtx {
        account,
        mail: &mut *mail,
        channel: &mut *channel,
        config,
        matched: false,
        stopped: false,
    };
    rules::do_rules(&mut mctx, &config.rules, cause)?;
    let stopped = mctx.stopped;

    if !stopped {
        // Reached end of ruleset. Find implicit decision
        match config.implicit {
            ImplicitDecision::None => {
                warn!(
                    "{}: reached end of ruleset. no unmatched-mail \
                     option; keeping mail",
                    account.name
                );
                mail.decision = Decision::Keep;
            },
            ImplicitDecision::Keep => {
                debug!(
                    "{}: reached end of ruleset. keeping mail",
                    account.name
                );
                mail.decision = Decision::Keep;
            },
            ImplicitDecision::Drop => {
                debug!(
                    "{}: reached end of ruleset. dropping mail",
                    account.name
                );
                mail.decision = Decision::Drop;
            },
        }
    }

    if config.keep_all || account.keep {
        mail.decision = Decision::Keep;
    }

    Ok(())
}

fn install_signal_handlers() -> Result<(), Error> {
    use nix::sys::signal::{
        sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal,
    };

    // Interrupts belong to the foreground parent
    let ignore = SigAction::new(
        SigHandler::SigIgn,
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let terminate = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGINT, &ignore)?;
        sigaction(Signal::SIGTERM, &terminate)?;
    }

    Ok(())
}

extern "C" fn on_sigterm(_signal: nix::libc::c_int) {
    cleanup::purge();
    unsafe {
        nix::libc::_exit(1);
    }
}
