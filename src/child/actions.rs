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

//! The action dispatcher: resolves a matched rule's action names and routes
//! each delivery either in-child or across the privsep channel.

use log::{debug, warn};

use super::rules::MatchCtx;
use crate::deliver::{DeliverCtx, DeliverMode};
use crate::mail::address;
use crate::mail::tags::{self, TagMap};
use crate::mail::Mail;
use crate::model::{Action, Rule};
use crate::privsep::{Msg, MsgKind};
use crate::support::error::Error;
use crate::support::template;

/// Dispatch every action named by `templates`, in order.
pub fn do_deliver(
    rule: &Rule,
    ctx: &mut MatchCtx,
    templates: &[String],
) -> Result<(), Error> {
    for template in templates {
        let name =
            template::replace(template, &ctx.mail.tags, &ctx.mail.caps);

        debug!(
            "{}: looking for actions matching: {}",
            ctx.account.name, name
        );
        let actions = ctx.config.match_actions(&name);
        if actions.is_empty() {
            warn!(
                "{}: no actions matching: {} (was {})",
                ctx.account.name, name, template
            );
            return Err(Error::UnknownAction(name));
        }

        debug!("{}: found {} actions", ctx.account.name, actions.len());
        for action in actions {
            debug!("{}: action {}", ctx.account.name, action.name);
            do_action(rule, ctx, &action)?;
        }
    }

    Ok(())
}

/// Perform a single resolved action.
pub fn do_action(
    rule: &Rule,
    ctx: &mut MatchCtx,
    action: &Action,
) -> Result<(), Error> {
    ctx.mail.tags.add("action", &action.name);

    // Just deliver now for in-child delivery
    if DeliverMode::InChild == action.deliver.mode() {
        let mut dctx = DeliverCtx {
            account: ctx.account,
            mail: &mut *ctx.mail,
        };
        return action.deliver.deliver(&mut dctx, action);
    }

    // Figure out the users to use. Rule first, then action, then account.
    let mut users = if rule.find_uid {
        find_users(ctx.mail)
    } else if let Some(ref users) = rule.users {
        users.clone()
    } else if action.find_uid {
        find_users(ctx.mail)
    } else if let Some(ref users) = action.users {
        users.clone()
    } else if ctx.account.find_uid {
        find_users(ctx.mail)
    } else if let Some(ref users) = ctx.account.users {
        users.clone()
    } else {
        Vec::new()
    };
    if users.is_empty() {
        users.push(ctx.config.default_user);
    }

    for uid in users {
        let msg = Msg::action(
            &ctx.account.name,
            &action.name,
            uid.as_raw(),
            ctx.mail.to_desc(),
        );
        let blob = ctx.mail.tags.to_blob()?;
        ctx.channel
            .send(&msg, Some(&blob), Some(ctx.mail.bytes()))?;

        let (reply, reply_tags, reply_mail) = ctx.channel.recv()?;
        if MsgKind::Done != reply.kind {
            return Err(Error::UnexpectedMessage);
        }

        // The reply blob replaces the tag map wholesale; the old map is
        // gone before the new one is decoded, never mixed.
        let reply_tags = reply_tags.ok_or(Error::BadTagBlob)?;
        ctx.mail.tags = TagMap::from_blob(&reply_tags)?;
        tags::update_tags(
            &mut ctx.mail.tags,
            &ctx.account.name,
            &ctx.config.host,
        );

        if reply.error {
            return Err(Error::DeliveryFailed(action.name.clone()));
        }

        if DeliverMode::WriteBack != action.deliver.mode() {
            // Check everything that should be is the same
            if reply.mail.size != ctx.mail.size() as u64
                || reply.mail.body != ctx.mail.body_offset()
            {
                return Err(Error::CorruptedMail);
            }
            continue;
        }

        let new_bytes = reply_mail.ok_or(Error::CorruptedMail)?;
        if new_bytes.len() as u64 != reply.mail.size {
            return Err(Error::CorruptedMail);
        }
        ctx.mail.replace_from_wire(&reply.mail, new_bytes);
        debug!(
            "{}: received modified mail: size {}, body {}",
            ctx.account.name,
            ctx.mail.size(),
            ctx.mail.body_offset()
        );

        // Trim from line and recreate the wrapped map
        ctx.mail.trim_from();
        let lines = ctx.mail.fill_wrapped();
        debug!(
            "{}: found {} wrapped lines",
            ctx.account.name, lines
        );
    }

    Ok(())
}

/// Derive delivery users from the mail's address headers.
///
/// Local parts that name a passwd user yield that user's uid; everything
/// else is ignored. Order follows the headers, duplicates are dropped. An
/// empty result falls back to the configured default user at the call
/// site.
pub fn find_users(mail: &Mail) -> Vec<nix::unistd::Uid> {
    let mut users = Vec::new();

    for header in &["to", "cc", "delivered-to"] {
        let value = match mail.find_header_string(header, true) {
            Some(value) => value,
            None => continue,
        };

        for local in address::local_parts(&value) {
            if let Ok(Some(user)) = nix::unistd::User::from_name(&local) {
                if !users.contains(&user.uid) {
                    users.push(user.uid);
                }
            }
        }
    }

    users
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::deliver::decide::DeliverKeep;
    use crate::deliver::Deliver;
    use crate::model::{
        Account, Config, Decision, ImplicitDecision, Rule, RuleKind,
    };
    use crate::privsep::{Channel, MailDesc};

    /// A parent-side deliverer as seen from the child: only its mode
    /// matters, the actual work is scripted on the peer thread.
    struct RemoteStub(DeliverMode);

    impl Deliver for RemoteStub {
        fn mode(&self) -> DeliverMode {
            self.0
        }

        fn deliver(
            &self,
            _dctx: &mut DeliverCtx,
            _action: &Action,
        ) -> Result<(), Error> {
            unreachable!("remote stubs never deliver in the child")
        }
    }

    fn account() -> Account {
        Account {
            name: "work".to_owned(),
            keep: false,
            find_uid: false,
            users: None,
        }
    }

    fn config_with(actions: Vec<Arc<Action>>) -> Config {
        Config {
            keep_all: false,
            del_big: false,
            no_received: true,
            purge_after: 0,
            implicit: ImplicitDecision::Drop,
            default_user: nix::unistd::Uid::from_raw(4242),
            child_user: None,
            host: "mx.example.org".to_owned(),
            actions,
            rules: Vec::new(),
        }
    }

    fn rule() -> Rule {
        Rule {
            idx: 1,
            accounts: Vec::new(),
            kind: RuleKind::All,
            key: None,
            value: None,
            actions: None,
            rules: Vec::new(),
            stop: false,
            find_uid: false,
            users: None,
        }
    }

    fn action(name: &str, deliver: Arc<dyn Deliver>) -> Arc<Action> {
        Arc::new(Action {
            name: name.to_owned(),
            deliver,
            find_uid: false,
            users: None,
        })
    }

    fn mail() -> Mail {
        let mut mail =
            Mail::new(b"Subject: x\n\nbody\n".to_vec());
        mail.recompute_body();
        mail
    }

    /// Run `f` on the child side of a channel while a scripted parent
    /// handles frames on the other side.
    fn with_parent<P, F, R>(parent: P, f: F) -> R
    where
        P: FnOnce(Channel) + Send + 'static,
        F: FnOnce(&mut Channel) -> R,
    {
        crate::init_test_log();
        let (mut child, parent_end) = Channel::pair().unwrap();
        let handle = thread::spawn(move || parent(parent_end));
        let result = f(&mut child);
        handle.join().unwrap();
        result
    }

    fn echo_done(mut channel: Channel, mutate_tags: bool) {
        let (msg, tags, _mail) = channel.recv().unwrap();
        assert_eq!(MsgKind::Action, msg.kind);

        let mut tags =
            TagMap::from_blob(&tags.expect("no tags on ACTION")).unwrap();
        if mutate_tags {
            tags.add("parent_saw", "1");
        }
        channel
            .send(
                &Msg::done(false, msg.mail),
                Some(&tags.to_blob().unwrap()),
                None,
            )
            .unwrap();
    }

    #[test]
    fn in_child_action_needs_no_parent() {
        let account = account();
        let action = action("keep", Arc::new(DeliverKeep));
        let config = config_with(vec![Arc::clone(&action)]);
        let (mut channel, _peer) = Channel::pair().unwrap();
        let mut m = mail();

        let mut ctx = MatchCtx {
            account: &account,
            mail: &mut m,
            channel: &mut channel,
            config: &config,
            matched: false,
            stopped: false,
        };

        do_action(&rule(), &mut ctx, &action).unwrap();
        assert_eq!(Decision::Keep, m.decision);
        assert_eq!(Some("keep"), m.tags.get("action"));
    }

    #[test]
    fn remote_action_swaps_tags_and_checks_echo() {
        let account = account();
        let action =
            action("spool", Arc::new(RemoteStub(DeliverMode::AsUser)));
        let config = config_with(vec![Arc::clone(&action)]);
        let mut m = mail();
        let size_before = m.size();

        with_parent(
            |channel| echo_done(channel, true),
            |channel| {
                let mut ctx = MatchCtx {
                    account: &account,
                    mail: &mut m,
                    channel,
                    config: &config,
                    matched: false,
                    stopped: false,
                };
                do_action(&rule(), &mut ctx, &action).unwrap();
            },
        );

        assert_eq!(size_before, m.size());
        // Parent's blob took over, derived tags re-added
        assert_eq!(Some("1"), m.tags.get("parent_saw"));
        assert_eq!(Some("work"), m.tags.get("account"));
        assert_eq!(Some("mx.example.org"), m.tags.get("hostname"));
    }

    #[test]
    fn remote_error_flag_fails_delivery() {
        let account = account();
        let action =
            action("spool", Arc::new(RemoteStub(DeliverMode::AsUser)));
        let config = config_with(vec![Arc::clone(&action)]);
        let mut m = mail();

        let result = with_parent(
            |mut channel| {
                let (msg, tags, _) = channel.recv().unwrap();
                channel
                    .send(
                        &Msg::done(true, msg.mail),
                        Some(&tags.unwrap()),
                        None,
                    )
                    .unwrap();
            },
            |channel| {
                let mut ctx = MatchCtx {
                    account: &account,
                    mail: &mut m,
                    channel,
                    config: &config,
                    matched: false,
                    stopped: false,
                };
                do_action(&rule(), &mut ctx, &action)
            },
        );

        assert_matches!(Err(Error::DeliveryFailed(_)), result);
    }

    #[test]
    fn corrupted_echo_is_protocol_fatal() {
        let account = account();
        let action =
            action("spool", Arc::new(RemoteStub(DeliverMode::AsUser)));
        let config = config_with(vec![Arc::clone(&action)]);
        let mut m = mail();

        let result = with_parent(
            |mut channel| {
                let (msg, tags, _) = channel.recv().unwrap();
                let bad = MailDesc {
                    size: msg.mail.size + 7,
                    body: msg.mail.body,
                };
                channel
                    .send(&Msg::done(false, bad), Some(&tags.unwrap()), None)
                    .unwrap();
            },
            |channel| {
                let mut ctx = MatchCtx {
                    account: &account,
                    mail: &mut m,
                    channel,
                    config: &config,
                    matched: false,
                    stopped: false,
                };
                do_action(&rule(), &mut ctx, &action)
            },
        );

        match result {
            Err(e) => assert!(e.is_protocol_fatal()),
            Ok(()) => panic!("corrupted echo accepted"),
        }
    }

    #[test]
    fn missing_reply_tags_is_protocol_fatal() {
        let account = account();
        let action =
            action("spool", Arc::new(RemoteStub(DeliverMode::AsUser)));
        let config = config_with(vec![Arc::clone(&action)]);
        let mut m = mail();

        let result = with_parent(
            |mut channel| {
                let (msg, _, _) = channel.recv().unwrap();
                channel
                    .send(&Msg::done(false, msg.mail), None, None)
                    .unwrap();
            },
            |channel| {
                let mut ctx = MatchCtx {
                    account: &account,
                    mail: &mut m,
                    channel,
                    config: &config,
                    matched: false,
                    stopped: false,
                };
                do_action(&rule(), &mut ctx, &action)
            },
        );

        assert_matches!(Err(Error::BadTagBlob), result);
    }

    #[test]
    fn write_back_replaces_mail_and_rebuilds_state() {
        let account = account();
        let action =
            action("stamp", Arc::new(RemoteStub(DeliverMode::WriteBack)));
        let config = config_with(vec![Arc::clone(&action)]);
        let mut m = mail();
        let size_before = m.size();
        let body_before = m.body.unwrap();

        let inserted = "X-Stamped: yes\n";
        with_parent(
            move |mut channel| {
                let (msg, tags, mail_bytes) = channel.recv().unwrap();
                let mut new_bytes = b"X-Stamped: yes\n".to_vec();
                new_bytes.extend_from_slice(&mail_bytes.unwrap());
                let desc = MailDesc {
                    size: new_bytes.len() as u64,
                    body: msg.mail.body + "X-Stamped: yes\n".len() as i64,
                };
                channel
                    .send(
                        &Msg::done(false, desc),
                        Some(&tags.unwrap()),
                        Some(&new_bytes),
                    )
                    .unwrap();
            },
            |channel| {
                let mut ctx = MatchCtx {
                    account: &account,
                    mail: &mut m,
                    channel,
                    config: &config,
                    matched: false,
                    stopped: false,
                };
                do_action(&rule(), &mut ctx, &action).unwrap();
            },
        );

        assert_eq!(size_before + inserted.len(), m.size());
        assert_eq!(body_before + inserted.len(), m.body.unwrap());
        assert!(m.bytes().starts_with(b"X-Stamped: yes\nSubject: x\n"));
        assert_eq!(b"body\n", &m.bytes()[m.body.unwrap()..]);
    }

    #[test]
    fn user_precedence_rule_beats_action_beats_account() {
        fn uids(raw: Option<Vec<u32>>) -> Option<Vec<nix::unistd::Uid>> {
            raw.map(|v| {
                v.into_iter().map(nix::unistd::Uid::from_raw).collect()
            })
        }

        fn run_case(
            rule_users: Option<Vec<u32>>,
            action_users: Option<Vec<u32>>,
            account_users: Option<Vec<u32>>,
            expected: Vec<u32>,
        ) {
            crate::init_test_log();

            let mut account = account();
            account.users = uids(account_users);
            let action = Arc::new(Action {
                name: "spool".to_owned(),
                deliver: Arc::new(RemoteStub(DeliverMode::AsUser)),
                find_uid: false,
                users: uids(action_users),
            });
            let mut r = rule();
            r.users = uids(rule_users);
            let config = config_with(vec![Arc::clone(&action)]);
            let n = expected.len();
            let mut m = mail();

            let (mut child, mut parent_end) = Channel::pair().unwrap();
            let handle = thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..n {
                    let (msg, tags, _) = parent_end.recv().unwrap();
                    seen.push(msg.uid);
                    parent_end
                        .send(
                            &Msg::done(false, msg.mail),
                            Some(&tags.unwrap()),
                            None,
                        )
                        .unwrap();
                }
                seen
            });

            let mut ctx = MatchCtx {
                account: &account,
                mail: &mut m,
                channel: &mut child,
                config: &config,
                matched: false,
                stopped: false,
            };
            do_action(&r, &mut ctx, &action).unwrap();
            assert_eq!(expected, handle.join().unwrap());
        }

        // Rule users win, and are used in list order
        run_case(
            Some(vec![1, 10]),
            Some(vec![2]),
            Some(vec![3]),
            vec![1, 10],
        );
        // Without rule users, action users win
        run_case(None, Some(vec![2]), Some(vec![3]), vec![2]);
        // Without action users, account users win
        run_case(None, None, Some(vec![3]), vec![3]);
        // With nothing configured, the default user is used
        run_case(None, None, None, vec![4242]);
    }

    #[test]
    fn unknown_action_name_aborts() {
        let account = account();
        let config = config_with(Vec::new());
        let (mut channel, _peer) = Channel::pair().unwrap();
        let mut m = mail();

        let mut ctx = MatchCtx {
            account: &account,
            mail: &mut m,
            channel: &mut channel,
            config: &config,
            matched: false,
            stopped: false,
        };

        assert_matches!(
            Err(Error::UnknownAction(_)),
            do_deliver(&rule(), &mut ctx, &["nowhere".to_owned()])
        );
    }

    #[test]
    fn find_users_resolves_current_user() {
        let me = nix::unistd::User::from_uid(nix::unistd::getuid())
            .unwrap()
            .unwrap();

        let mut m = Mail::new(
            format!(
                "To: Someone <{}@example.org>, nobody-here@x\n\nbody\n",
                me.name
            )
            .into_bytes(),
        );
        m.recompute_body();

        let users = find_users(&m);
        assert!(users.contains(&me.uid));
    }
}
