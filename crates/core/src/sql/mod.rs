#![forbid(unsafe_code)]

//! Minimal SQL front-end for the state-view preprocessor.
//!
//! Queries are tokenized into a closed [`Token`] set, folded into a parenthesis tree of
//! [`SqlNode`]s and scanned for references to the logical views (`state`, `state_all`,
//! `state_history`). The rewriter swaps each reference for a subquery chosen by the caller and
//! renders everything else back unchanged. Nothing here understands full SQL grammar; it only
//! recognizes table positions and `WHERE` pins well enough to route a query.

mod node;
mod rewrite;
mod token;

pub use node::*;
pub use rewrite::*;
pub use token::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqlError {
    Empty,
    UnexpectedChar { ch: char, offset: usize },
    UnterminatedString { offset: usize },
    UnterminatedComment { offset: usize },
    UnbalancedParens,
    MultipleStatements,
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty sql"),
            Self::UnexpectedChar { ch, offset } => {
                write!(f, "unexpected character {ch:?} at offset {offset}")
            }
            Self::UnterminatedString { offset } => {
                write!(f, "unterminated literal starting at offset {offset}")
            }
            Self::UnterminatedComment { offset } => {
                write!(f, "unterminated comment starting at offset {offset}")
            }
            Self::UnbalancedParens => write!(f, "unbalanced parentheses"),
            Self::MultipleStatements => write!(f, "only one statement per call is supported"),
        }
    }
}

impl std::error::Error for SqlError {}
