#![forbid(unsafe_code)]

use super::{Keyword, SqlError, Token, tokenize};

/// Parenthesis tree over tokens. Groups never contain `LParen`/`RParen` tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqlNode {
    Token(Token),
    Group(Vec<SqlNode>),
}

impl SqlNode {
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::Token(token) => Some(token),
            Self::Group(_) => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.token().is_some_and(|t| t.is_keyword(keyword))
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self {
            Self::Token(Token::Keyword(k)) => Some(*k),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Write,
    Other,
}

/// One parsed statement, trailing semicolon dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub nodes: Vec<SqlNode>,
}

impl Statement {
    pub fn parse(sql: &str) -> Result<Self, SqlError> {
        let mut tokens = tokenize(sql)?;
        while matches!(tokens.last(), Some(Token::Semicolon)) {
            tokens.pop();
        }
        if tokens.is_empty() {
            return Err(SqlError::Empty);
        }
        if tokens.iter().any(|t| matches!(t, Token::Semicolon)) {
            return Err(SqlError::MultipleStatements);
        }
        let nodes = build_tree(tokens)?;
        let kind = classify(&nodes);
        Ok(Self { kind, nodes })
    }

    pub fn render(&self) -> String {
        render_nodes(&self.nodes)
    }
}

fn build_tree(tokens: Vec<Token>) -> Result<Vec<SqlNode>, SqlError> {
    let mut stack: Vec<Vec<SqlNode>> = vec![Vec::new()];
    for token in tokens {
        match token {
            Token::LParen => stack.push(Vec::new()),
            Token::RParen => {
                let group = stack.pop().ok_or(SqlError::UnbalancedParens)?;
                let parent = stack.last_mut().ok_or(SqlError::UnbalancedParens)?;
                parent.push(SqlNode::Group(group));
            }
            other => {
                let current = stack.last_mut().ok_or(SqlError::UnbalancedParens)?;
                current.push(SqlNode::Token(other));
            }
        }
    }
    if stack.len() != 1 {
        return Err(SqlError::UnbalancedParens);
    }
    stack.pop().ok_or(SqlError::UnbalancedParens)
}

fn classify(nodes: &[SqlNode]) -> StatementKind {
    match nodes.first().and_then(SqlNode::keyword) {
        Some(Keyword::Select | Keyword::Values) => StatementKind::Query,
        Some(Keyword::Insert | Keyword::Replace | Keyword::Update | Keyword::Delete) => {
            StatementKind::Write
        }
        Some(Keyword::With) => {
            let writes = nodes.iter().any(|n| {
                matches!(
                    n.keyword(),
                    Some(Keyword::Insert | Keyword::Replace | Keyword::Update | Keyword::Delete)
                )
            });
            if writes {
                StatementKind::Write
            } else {
                StatementKind::Query
            }
        }
        _ => StatementKind::Other,
    }
}

pub fn render_nodes(nodes: &[SqlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        if !out.is_empty() {
            out.push(' ');
        }
        match node {
            SqlNode::Token(token) => out.push_str(&token.render()),
            SqlNode::Group(inner) => {
                out.push('(');
                out.push_str(&render_nodes(inner));
                out.push(')');
            }
        }
    }
    out
}
