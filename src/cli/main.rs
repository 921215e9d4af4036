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

use std::path::PathBuf;
use std::process;

use log::{error, warn};
use structopt::StructOpt;

use crate::child::{self, ChildOp};
use crate::parent;
use crate::privsep::Channel;
use crate::support::cleanup;
use crate::support::error::Error;
use crate::support::name_match::name_match;
use crate::support::system_config::{AccountSetup, ConfigFile};

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Fetch mail for the configured accounts and run it through the
    /// rules.
    Fetch(CommonOptions),
    /// Count the mail waiting for the configured accounts without
    /// fetching anything.
    Poll(CommonOptions),
}

#[derive(StructOpt)]
struct CommonOptions {
    /// The configuration file [default: /etc/trawl.toml]
    #[structopt(short = "c", long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Only process accounts matching these patterns (`*` and `?`
    /// allowed). With no patterns, all accounts are processed.
    accounts: Vec<String>,
}

pub fn main() {
    let command = Command::from_args();
    crate::init_simple_log();

    let (op, options) = match command {
        Command::Fetch(options) => (ChildOp::Fetch, options),
        Command::Poll(options) => (ChildOp::Poll, options),
    };

    match run(op, options) {
        Ok(status) => process::exit(status),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        },
    }
}

fn run(op: ChildOp, options: CommonOptions) -> Result<i32, Error> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("/etc/trawl.toml"));
    let setup = ConfigFile::load(&path)?.build()?;

    let mut selected: Vec<AccountSetup> = setup
        .accounts
        .into_iter()
        .filter(|a| {
            options.accounts.is_empty()
                || options
                    .accounts
                    .iter()
                    .any(|pat| name_match(pat, &a.account.name))
        })
        .collect();
    if selected.is_empty() {
        warn!("no accounts selected");
        return Ok(1);
    }

    let mut status = 0;
    for account_setup in &mut selected {
        if 0 != run_account(op, account_setup, &setup.config)? {
            status = 1;
        }
    }

    Ok(status)
}

/// Fork a child for one account and service its privsep requests until it
/// exits.
fn run_account(
    op: ChildOp,
    setup: &mut AccountSetup,
    config: &crate::model::Config,
) -> Result<i32, Error> {
    let (mut parent_end, mut child_end) = Channel::pair()?;

    match unsafe { nix::unistd::fork() }? {
        nix::unistd::ForkResult::Child => {
            drop(parent_end);
            // Partial state registered so far belongs to the parent
            cleanup::flush();

            let code = match child::run(
                &mut child_end,
                op,
                &setup.account,
                setup.backend.as_mut(),
                config,
            ) {
                Ok(false) => {
                    cleanup::check();
                    0
                },
                Ok(true) => {
                    cleanup::check();
                    1
                },
                // Protocol-fatal: no cleanup check, no handshake
                Err(e) => {
                    error!("{}: child: {}", setup.account.name, e);
                    1
                },
            };
            process::exit(code);
        },

        nix::unistd::ForkResult::Parent { child } => {
            drop(child_end);

            let parent_failed =
                match parent::run(&mut parent_end, config, &setup.account)
                {
                    Ok(()) => false,
                    Err(e) => {
                        error!(
                            "{}: parent: {}",
                            setup.account.name, e
                        );
                        true
                    },
                };
            drop(parent_end);

            let child_failed =
                match nix::sys::wait::waitpid(child, None)? {
                    nix::sys::wait::WaitStatus::Exited(_, code) => {
                        0 != code
                    },
                    _ => true,
                };

            Ok(if parent_failed || child_failed { 1 } else { 0 })
        },
    }
}
