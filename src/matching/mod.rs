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

pub mod regexp;

use crate::mail::Mail;
use crate::model::Account;
use crate::support::error::Error;

/// A single boolean test against a mail.
///
/// Predicates see the mail in the unwrapped view. They may have observable
/// side effects (the regex predicate stores its capture groups on the mail),
/// which is why expression evaluation never skips an item.
pub trait MatchPredicate: Send + Sync {
    /// Evaluate the predicate.
    ///
    /// `Ok(bool)` is the match result; `Err` aborts the enclosing rule
    /// walk.
    fn matches(
        &self,
        account: &Account,
        mail: &mut Mail,
    ) -> Result<bool, Error>;

    /// A short human-readable description for debug logging.
    fn describe(&self) -> String;
}

/// How an expression item's result is folded into the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprOp {
    /// No operator was written. Only valid on the first item; combines
    /// like `Or` (the accumulator starts false).
    None,
    And,
    Or,
}

pub struct ExprItem {
    pub predicate: Box<dyn MatchPredicate>,
    pub inverted: bool,
    pub op: ExprOp,
}

/// An ordered sequence of expression items, combined strictly left to
/// right with no precedence.
pub type Expr = Vec<ExprItem>;
