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

//! The runtime data model: what the configuration builds into and what the
//! child and parent processes operate on.
//!
//! Everything here is immutable once the configuration has been built,
//! before the per-account fork. Per-mail mutable state lives on the mail
//! itself and in the match context.

use std::sync::Arc;

use crate::deliver::Deliver;
use crate::matching::Expr;
use crate::support::name_match::name_match;

/// What to do with a mail once processing finishes.
///
/// Every mail starts at `Drop`; rules and the implicit decision may change
/// it. A mail leaving the evaluator always carries one of these two values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Drop,
    Keep,
}

/// The configured decision for mail that reaches the end of the ruleset.
///
/// `None` is only valid here; it means "keep, but warn that no explicit
/// choice was configured".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImplicitDecision {
    None,
    Keep,
    Drop,
}

/// An account to fetch mail for.
///
/// The fetch backend bound to the account is carried alongside (see
/// `system_config::AccountSetup`) rather than inside, so that the backend
/// can be borrowed mutably across the fetch loop while the descriptor stays
/// shared.
#[derive(Debug)]
pub struct Account {
    pub name: String,
    /// Keep fetched mail on the server/source regardless of decisions.
    pub keep: bool,
    /// Derive delivery users from the mail's address headers.
    pub find_uid: bool,
    /// Explicit delivery users.
    pub users: Option<Vec<nix::unistd::Uid>>,
}

/// How a rule decides whether it matches.
pub enum RuleKind {
    /// Match unconditionally.
    All,
    /// Match if the expression evaluates true.
    Expression(Expr),
}

/// One node of the rule tree.
pub struct Rule {
    /// 1-based position in declaration order, for diagnostics.
    pub idx: u32,
    /// Account-name patterns this rule applies to; empty matches any.
    pub accounts: Vec<String>,
    pub kind: RuleKind,
    /// Tag key template; if it interpolates non-empty, `key -> value` is
    /// added to the mail's tags.
    pub key: Option<String>,
    pub value: Option<String>,
    /// Action-name templates to dispatch on match. `None` means the rule
    /// only tags or recurses.
    pub actions: Option<Vec<String>>,
    /// Nested sub-rules, evaluated depth-first on match.
    pub rules: Vec<Rule>,
    /// Terminate the enclosing rule walk after this rule.
    pub stop: bool,
    pub find_uid: bool,
    pub users: Option<Vec<nix::unistd::Uid>>,
}

/// A named delivery.
pub struct Action {
    pub name: String,
    pub deliver: Arc<dyn Deliver>,
    pub find_uid: bool,
    pub users: Option<Vec<nix::unistd::Uid>>,
}

/// The read-only run configuration, established before any fork.
pub struct Config {
    /// Force every decision to `Keep`.
    pub keep_all: bool,
    /// Accept (and drop) oversized messages instead of aborting.
    pub del_big: bool,
    /// Suppress the `Received:` header.
    pub no_received: bool,
    /// Call the backend's purge after this many processed mails; 0 disables.
    pub purge_after: u32,
    /// The decision for mail that falls off the end of the ruleset.
    pub implicit: ImplicitDecision,
    /// The uid deliveries run as when nothing else selects one.
    pub default_user: nix::unistd::Uid,
    /// The unprivileged uid the child drops to when started as root.
    pub child_user: Option<nix::unistd::Uid>,
    /// The host name reported in `Received:` headers and the `hostname` tag.
    pub host: String,
    /// All named actions, in declaration order.
    pub actions: Vec<Arc<Action>>,
    /// The outermost rule list.
    pub rules: Vec<Rule>,
}

impl Config {
    /// Resolve an interpolated action name to the actions it selects.
    ///
    /// The name is a pattern in the same `*`/`?` syntax as rule account
    /// gates; all matching actions are returned in declaration order. An
    /// empty result is the caller's error to report.
    pub fn match_actions(&self, name: &str) -> Vec<Arc<Action>> {
        if name.is_empty() {
            return Vec::new();
        }

        self.actions
            .iter()
            .filter(|a| name_match(name, &a.name))
            .map(Arc::clone)
            .collect()
    }
}
