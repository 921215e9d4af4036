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

//! The on-disk configuration and its compilation into the runtime model.
//!
//! The file is TOML, typically `/etc/trawl.toml`. `[[accounts]]`,
//! `[[actions]]` and `[[rules]]` are arrays of tables so that declaration
//! order — which is semantically meaningful for all three — survives
//! parsing. `build` resolves user names, compiles regexes and binds the
//! fetch backends and deliverers, after which nothing about the
//! configuration changes for the lifetime of the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::deliver::add_header::DeliverAddHeader;
use crate::deliver::decide::{DeliverDrop, DeliverKeep};
use crate::deliver::maildir::DeliverMaildir;
use crate::deliver::pipe::DeliverPipe;
use crate::deliver::Deliver;
use crate::fetch::maildir::MaildirFetch;
use crate::fetch::stdin::StdinFetch;
use crate::fetch::FetchBackend;
use crate::matching::regexp::{RegexpMatch, RegexpSource};
use crate::matching::{Expr, ExprItem, ExprOp};
use crate::model::{
    Account, Action, Config, ImplicitDecision, Rule, RuleKind,
};
use crate::support::error::Error;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsConfig {
    /// Force every decision to keep; no mail is ever deleted.
    #[serde(default)]
    pub keep_all: bool,
    /// Accept (and delete) messages over `max_size` instead of aborting.
    #[serde(default)]
    pub del_big: bool,
    /// Do not prepend a `Received:` header to fetched mail.
    #[serde(default)]
    pub no_received: bool,
    /// Purge transient backend state every this many mails; 0 disables.
    #[serde(default)]
    pub purge_after: u32,
    /// Largest acceptable message in bytes; 0 means unlimited.
    #[serde(default)]
    pub max_size: u64,
    /// What to do with mail no rule decided about: "keep" or "drop".
    ///
    /// If unset, such mail is kept and a warning is logged.
    #[serde(default)]
    pub unmatched: Option<String>,
    /// The user deliveries run as when no rule, action or account names
    /// one. Defaults to the invoking user.
    #[serde(default)]
    pub default_user: Option<String>,
    /// The unprivileged user the child drops to when Trawl is started as
    /// root. Must be set in that case.
    #[serde(default)]
    pub child_user: Option<String>,
    /// The host name used in `Received:` headers and the `hostname` tag.
    /// Defaults to the system host name.
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(flatten)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub keep: bool,
    #[serde(default)]
    pub find_uid: bool,
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

/// The fetch-backend binding of an account, keyed by the `fetch` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "fetch", rename_all = "lowercase")]
pub enum FetchConfig {
    Maildir { path: PathBuf },
    Stdin {},
}

#[derive(Debug, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(flatten)]
    pub deliver: DeliverConfig,
    #[serde(default)]
    pub find_uid: bool,
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

/// The deliverer binding of an action, keyed by the `deliver` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "deliver", rename_all = "kebab-case")]
pub enum DeliverConfig {
    Maildir {
        path: String,
    },
    Pipe {
        command: String,
    },
    AddHeader {
        header: String,
        #[serde(default)]
        value: String,
    },
    Drop {},
    Keep {},
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Match unconditionally. Mutually exclusive with `expr`.
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub expr: Vec<ExprItemConfig>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<String>>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub find_uid: bool,
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ExprItemConfig {
    /// Match against this header's value.
    #[serde(default)]
    pub header: Option<String>,
    /// Match against the body instead of a header.
    #[serde(default)]
    pub body: bool,
    pub re: String,
    /// Case-insensitive matching.
    #[serde(default)]
    pub ci: bool,
    #[serde(default)]
    pub op: OpConfig,
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpConfig {
    None,
    And,
    Or,
}

impl Default for OpConfig {
    fn default() -> Self {
        OpConfig::None
    }
}

/// One account ready to run: the descriptor plus its backend.
pub struct AccountSetup {
    pub account: Account,
    pub backend: Box<dyn FetchBackend>,
}

/// Everything `build` produces.
pub struct Setup {
    pub config: Config,
    pub accounts: Vec<AccountSetup>,
}

#[cfg(test)]
impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Compile the file into the runtime model.
    pub fn build(self) -> Result<Setup, Error> {
        let implicit = match self.settings.unmatched.as_deref() {
            None => ImplicitDecision::None,
            Some("keep") => ImplicitDecision::Keep,
            Some("drop") => ImplicitDecision::Drop,
            Some(other) => {
                return Err(Error::BadConfig(format!(
                    "unmatched must be \"keep\" or \"drop\", not \"{}\"",
                    other
                )))
            },
        };

        let default_user = match self.settings.default_user.as_deref() {
            Some(name) => resolve_user(name)?,
            None => nix::unistd::getuid(),
        };
        let child_user = self
            .settings
            .child_user
            .as_deref()
            .map(resolve_user)
            .transpose()?;

        let host = match self.settings.host {
            Some(host) => host,
            None => nix::unistd::gethostname()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_owned()),
        };

        let actions = self
            .actions
            .into_iter()
            .map(build_action)
            .collect::<Result<Vec<_>, Error>>()?;

        let mut next_idx = 1;
        let rules = self
            .rules
            .into_iter()
            .map(|r| build_rule(r, &mut next_idx))
            .collect::<Result<Vec<_>, Error>>()?;

        let max_size = self.settings.max_size;
        let accounts = self
            .accounts
            .into_iter()
            .map(|a| build_account(a, max_size))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Setup {
            config: Config {
                keep_all: self.settings.keep_all,
                del_big: self.settings.del_big,
                no_received: self.settings.no_received,
                purge_after: self.settings.purge_after,
                implicit,
                default_user,
                child_user,
                host,
                actions,
                rules,
            },
            accounts,
        })
    }
}

fn resolve_user(name: &str) -> Result<nix::unistd::Uid, Error> {
    if let Ok(raw) = name.parse::<nix::libc::uid_t>() {
        return Ok(nix::unistd::Uid::from_raw(raw));
    }

    match nix::unistd::User::from_name(name)? {
        Some(user) => Ok(user.uid),
        None => Err(Error::UnknownUser(name.to_owned())),
    }
}

fn resolve_users(
    users: Option<Vec<String>>,
) -> Result<Option<Vec<nix::unistd::Uid>>, Error> {
    users
        .map(|users| {
            users.iter().map(|u| resolve_user(u)).collect()
        })
        .transpose()
}

fn build_account(
    account: AccountConfig,
    max_size: u64,
) -> Result<AccountSetup, Error> {
    let backend: Box<dyn FetchBackend> = match account.fetch {
        FetchConfig::Maildir { path } => {
            Box::new(MaildirFetch::new(path, max_size))
        },
        FetchConfig::Stdin {} => Box::new(StdinFetch::new(max_size)),
    };

    Ok(AccountSetup {
        account: Account {
            name: account.name,
            keep: account.keep,
            find_uid: account.find_uid,
            users: resolve_users(account.users)?,
        },
        backend,
    })
}

fn build_action(action: ActionConfig) -> Result<Arc<Action>, Error> {
    let deliver: Arc<dyn Deliver> = match action.deliver {
        DeliverConfig::Maildir { path } => {
            Arc::new(DeliverMaildir::new(path))
        },
        DeliverConfig::Pipe { command } => {
            Arc::new(DeliverPipe::new(command))
        },
        DeliverConfig::AddHeader { header, value } => {
            Arc::new(DeliverAddHeader::new(header, value))
        },
        DeliverConfig::Drop {} => Arc::new(DeliverDrop),
        DeliverConfig::Keep {} => Arc::new(DeliverKeep),
    };

    Ok(Arc::new(Action {
        name: action.name,
        deliver,
        find_uid: action.find_uid,
        users: resolve_users(action.users)?,
    }))
}

fn build_rule(rule: RuleConfig, next_idx: &mut u32) -> Result<Rule, Error> {
    let idx = *next_idx;
    *next_idx += 1;

    let kind = match (rule.all, rule.expr.is_empty()) {
        (true, true) => RuleKind::All,
        (false, false) => {
            RuleKind::Expression(build_expr(rule.expr, idx)?)
        },
        (true, false) => {
            return Err(Error::BadConfig(format!(
                "rule {} is both \"all\" and an expression",
                idx
            )))
        },
        (false, true) => {
            return Err(Error::BadConfig(format!(
                "rule {} is neither \"all\" nor an expression",
                idx
            )))
        },
    };

    let rules = rule
        .rules
        .into_iter()
        .map(|r| build_rule(r, next_idx))
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Rule {
        idx,
        accounts: rule.accounts,
        kind,
        key: rule.key,
        value: rule.value,
        actions: rule.actions,
        rules,
        stop: rule.stop,
        find_uid: rule.find_uid,
        users: resolve_users(rule.users)?,
    })
}

fn build_expr(items: Vec<ExprItemConfig>, idx: u32) -> Result<Expr, Error> {
    items
        .into_iter()
        .map(|item| {
            let source = match (item.header, item.body) {
                (Some(header), false) => {
                    RegexpSource::Header(header.to_lowercase())
                },
                (None, true) => RegexpSource::Body,
                _ => {
                    return Err(Error::BadConfig(format!(
                        "rule {}: expression items match either a \
                         header or the body",
                        idx
                    )))
                },
            };

            let re = regex::RegexBuilder::new(&item.re)
                .case_insensitive(item.ci)
                .build()?;

            Ok(ExprItem {
                predicate: Box::new(RegexpMatch::new(source, re)),
                inverted: item.inverted,
                op: match item.op {
                    OpConfig::None => ExprOp::None,
                    OpConfig::And => ExprOp::And,
                    OpConfig::Or => ExprOp::Or,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const EXAMPLE: &str = r#"
        [settings]
        del_big = true
        purge_after = 20
        max_size = 10485760
        unmatched = "drop"

        [[accounts]]
        name = "work"
        fetch = "maildir"
        path = "/var/spool/trawl/work"
        keep = true

        [[accounts]]
        name = "pipe-in"
        fetch = "stdin"

        [[actions]]
        name = "inbox"
        deliver = "maildir"
        path = "/home/mail/Maildir"

        [[actions]]
        name = "archive"
        deliver = "pipe"
        command = "gzip >> /home/mail/archive.gz"

        [[actions]]
        name = "stamp"
        deliver = "add-header"
        header = "X-Filtered"
        value = "%[account]"

        [[rules]]
        stop = true
        actions = ["stamp", "inbox"]
        [[rules.expr]]
        header = "subject"
        re = "urgent"
        ci = true
        [[rules.expr]]
        header = "from"
        re = "noise"
        op = "and"
        inverted = true

        [[rules]]
        all = true
        actions = ["archive"]
        [[rules.rules]]
        all = true
        key = "archived"
        value = "1"
        stop = true
    "#;

    #[test]
    fn example_config_builds() {
        let file: ConfigFile = toml::from_str(EXAMPLE).unwrap();
        let setup = file.build().unwrap();

        assert!(setup.config.del_big);
        assert_eq!(20, setup.config.purge_after);
        assert_eq!(ImplicitDecision::Drop, setup.config.implicit);

        assert_eq!(2, setup.accounts.len());
        assert_eq!("work", setup.accounts[0].account.name);
        assert!(setup.accounts[0].account.keep);
        assert!(setup.accounts[0].backend.can_poll());
        assert!(!setup.accounts[1].backend.can_poll());

        assert_eq!(3, setup.config.actions.len());
        assert_eq!(
            vec!["inbox", "archive", "stamp"],
            setup
                .config
                .actions
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
        );

        assert_eq!(2, setup.config.rules.len());
        assert_eq!(1, setup.config.rules[0].idx);
        assert!(setup.config.rules[0].stop);
        match setup.config.rules[0].kind {
            RuleKind::Expression(ref expr) => {
                assert_eq!(2, expr.len());
                assert_eq!(ExprOp::None, expr[0].op);
                assert_eq!(ExprOp::And, expr[1].op);
                assert!(expr[1].inverted);
            },
            RuleKind::All => panic!("expected an expression rule"),
        }

        // Nested rules get depth-first indices
        assert_eq!(2, setup.config.rules[1].idx);
        assert_eq!(3, setup.config.rules[1].rules[0].idx);
    }

    #[test]
    fn default_settings() {
        let file: ConfigFile = toml::from_str("").unwrap();
        let setup = file.build().unwrap();

        assert!(!setup.config.keep_all);
        assert!(!setup.config.del_big);
        assert_eq!(0, setup.config.purge_after);
        assert_eq!(ImplicitDecision::None, setup.config.implicit);
        assert_eq!(nix::unistd::getuid(), setup.config.default_user);
    }

    #[test]
    fn bad_unmatched_value_is_rejected() {
        let file: ConfigFile = toml::from_str(
            "[settings]\nunmatched = \"maybe\"\n",
        )
        .unwrap();
        assert_matches!(Err(Error::BadConfig(_)), file.build());
    }

    #[test]
    fn rule_must_be_all_or_expression() {
        let file: ConfigFile =
            toml::from_str("[[rules]]\nstop = true\n").unwrap();
        assert_matches!(Err(Error::BadConfig(_)), file.build());

        let file: ConfigFile = toml::from_str(
            "[[rules]]\nall = true\n[[rules.expr]]\nre = \"x\"\nbody = true\n",
        )
        .unwrap();
        assert_matches!(Err(Error::BadConfig(_)), file.build());
    }

    #[test]
    fn bad_regex_is_rejected() {
        let file: ConfigFile = toml::from_str(
            "[[rules]]\n[[rules.expr]]\nheader = \"subject\"\nre = \"(\"\n",
        )
        .unwrap();
        assert_matches!(Err(Error::Regex(_)), file.build());
    }

    #[test]
    fn numeric_users_resolve_without_passwd() {
        let file: ConfigFile = toml::from_str(
            "[[accounts]]\nname = \"a\"\nfetch = \"stdin\"\n\
             users = [\"1234\"]\n",
        )
        .unwrap();
        let setup = file.build().unwrap();
        assert_eq!(
            Some(vec![nix::unistd::Uid::from_raw(1234)]),
            setup.accounts[0].account.users
        );
    }
}
