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

//! The rule evaluator: walks the rule tree for one mail and hands matched
//! rules to the action dispatcher.

use log::debug;

use super::actions;
use crate::mail::Mail;
use crate::matching::{Expr, ExprOp};
use crate::model::{Account, Config, Rule, RuleKind};
use crate::privsep::Channel;
use crate::support::error::Error;
use crate::support::name_match::name_match;
use crate::support::template;

/// The per-mail evaluation state.
///
/// Stack-scoped to one mail; `matched` and `stopped` accumulate across the
/// whole (possibly nested) rule walk.
pub struct MatchCtx<'a> {
    pub account: &'a Account,
    pub mail: &'a mut Mail,
    pub channel: &'a mut Channel,
    pub config: &'a Config,
    pub matched: bool,
    pub stopped: bool,
}

/// Evaluate `rules` in order against the context's mail.
///
/// On error, `cause` names the phase that failed ("matching" or
/// "delivery") for the abort log line; protocol-fatal errors pass through
/// unlabelled since no such line will be written.
pub fn do_rules(
    ctx: &mut MatchCtx,
    rules: &[Rule],
    cause: &mut Option<&'static str>,
) -> Result<(), Error> {
    for rule in rules {
        // Check if the rule is for the current account
        if !rule.accounts.is_empty()
            && !rule
                .accounts
                .iter()
                .any(|pat| name_match(pat, &ctx.account.name))
        {
            continue;
        }

        match rule.kind {
            RuleKind::Expression(ref expr) => {
                // Predicates see the unwrapped view; nothing else may.
                ctx.mail.set_wrapped(b' ');
                let result = do_expr(expr, ctx);
                ctx.mail.set_wrapped(b'\n');

                match result {
                    Err(e) => {
                        *cause = Some("matching");
                        return Err(e);
                    },
                    Ok(false) => continue,
                    Ok(true) => (),
                }
            },
            RuleKind::All => (),
        }

        if rule.rules.is_empty() {
            debug!(
                "{}: matched message with rule {}",
                ctx.account.name, rule.idx
            );
        } else {
            debug!(
                "{}: matched message with rule {} (nested)",
                ctx.account.name, rule.idx
            );
        }

        // Tag mail if needed
        if let Some(ref key) = rule.key {
            let tkey =
                template::replace(key, &ctx.mail.tags, &ctx.mail.caps);
            let tvalue = rule
                .value
                .as_ref()
                .map(|v| {
                    template::replace(v, &ctx.mail.tags, &ctx.mail.caps)
                })
                .unwrap_or_default();

            if !tkey.is_empty() {
                debug!(
                    "{}: tagging message: {} ({})",
                    ctx.account.name, tkey, tvalue
                );
                ctx.mail.tags.add(&tkey, &tvalue);
            }
        }

        // Handle delivery
        if let Some(ref action_templates) = rule.actions {
            debug!("{}: delivering message", ctx.account.name);
            ctx.matched = true;
            if let Err(e) = actions::do_deliver(rule, ctx, action_templates)
            {
                if !e.is_protocol_fatal() {
                    *cause = Some("delivery");
                }
                return Err(e);
            }
        }

        // Deal with nested rules
        if !rule.rules.is_empty() {
            debug!("{}: entering nested rules", ctx.account.name);
            do_rules(ctx, &rule.rules, cause)?;
            debug!(
                "{}: exiting nested rules{}",
                ctx.account.name,
                if ctx.stopped { ", and stopping" } else { "" }
            );
            // If it didn't drop off the end of the nested rules, stop now
            if ctx.stopped {
                return Ok(());
            }
        }

        // If this rule is marked as stop, stop checking now
        if rule.stop {
            ctx.stopped = true;
            return Ok(());
        }
    }

    Ok(())
}

/// Evaluate one expression, strictly left to right.
///
/// Every item is evaluated even once the accumulator is determined,
/// because predicates have observable side effects (the capture cache).
pub fn do_expr(expr: &Expr, ctx: &mut MatchCtx) -> Result<bool, Error> {
    let mut acc = false;

    for item in expr {
        let mut cres = item.predicate.matches(ctx.account, ctx.mail)?;
        if item.inverted {
            cres = !cres;
        }

        acc = match item.op {
            ExprOp::None | ExprOp::Or => acc || cres,
            ExprOp::And => acc && cres,
        };

        debug!(
            "{}: tried {}{}, got {}",
            ctx.account.name,
            if item.inverted { "not " } else { "" },
            item.predicate.describe(),
            cres
        );
    }

    Ok(acc)
}
