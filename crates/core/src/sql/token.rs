#![forbid(unsafe_code)]

use super::SqlError;

/// Keywords the preprocessor reasons about. Everything else stays an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Select,
    With,
    From,
    Join,
    Left,
    Right,
    Inner,
    Outer,
    Full,
    Cross,
    Natural,
    Where,
    Group,
    Order,
    Limit,
    Having,
    Window,
    Union,
    Intersect,
    Except,
    On,
    Using,
    And,
    Or,
    Not,
    In,
    As,
    Insert,
    Replace,
    Update,
    Delete,
    Into,
    Values,
    Set,
    Returning,
}

impl Keyword {
    pub fn parse(word: &str) -> Option<Self> {
        let keyword = match word.to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "WITH" => Self::With,
            "FROM" => Self::From,
            "JOIN" => Self::Join,
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            "INNER" => Self::Inner,
            "OUTER" => Self::Outer,
            "FULL" => Self::Full,
            "CROSS" => Self::Cross,
            "NATURAL" => Self::Natural,
            "WHERE" => Self::Where,
            "GROUP" => Self::Group,
            "ORDER" => Self::Order,
            "LIMIT" => Self::Limit,
            "HAVING" => Self::Having,
            "WINDOW" => Self::Window,
            "UNION" => Self::Union,
            "INTERSECT" => Self::Intersect,
            "EXCEPT" => Self::Except,
            "ON" => Self::On,
            "USING" => Self::Using,
            "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            "IN" => Self::In,
            "AS" => Self::As,
            "INSERT" => Self::Insert,
            "REPLACE" => Self::Replace,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "INTO" => Self::Into,
            "VALUES" => Self::Values,
            "SET" => Self::Set,
            "RETURNING" => Self::Returning,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::With => "WITH",
            Self::From => "FROM",
            Self::Join => "JOIN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Inner => "INNER",
            Self::Outer => "OUTER",
            Self::Full => "FULL",
            Self::Cross => "CROSS",
            Self::Natural => "NATURAL",
            Self::Where => "WHERE",
            Self::Group => "GROUP",
            Self::Order => "ORDER",
            Self::Limit => "LIMIT",
            Self::Having => "HAVING",
            Self::Window => "WINDOW",
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
            Self::On => "ON",
            Self::Using => "USING",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::In => "IN",
            Self::As => "AS",
            Self::Insert => "INSERT",
            Self::Replace => "REPLACE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Into => "INTO",
            Self::Values => "VALUES",
            Self::Set => "SET",
            Self::Returning => "RETURNING",
        }
    }

    /// Keywords that end a `FROM` list or a `WHERE` clause.
    pub fn ends_clause(self) -> bool {
        matches!(
            self,
            Self::Where
                | Self::Group
                | Self::Order
                | Self::Limit
                | Self::Having
                | Self::Window
                | Self::Union
                | Self::Intersect
                | Self::Except
                | Self::On
                | Self::Using
                | Self::Select
                | Self::Set
                | Self::Values
                | Self::Returning
        )
    }

    pub fn is_compound(self) -> bool {
        matches!(self, Self::Union | Self::Intersect | Self::Except)
    }

    pub fn is_join_modifier(self) -> bool {
        matches!(
            self,
            Self::Left
                | Self::Right
                | Self::Inner
                | Self::Outer
                | Self::Full
                | Self::Cross
                | Self::Natural
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Keyword(Keyword),
    Ident(String),
    /// `"x"`, `` `x` `` or `[x]`, stored unquoted.
    QuotedIdent(String),
    /// Unescaped content of a `'...'` literal.
    String(String),
    /// Hex digits of an `X'..'` literal.
    Blob(String),
    Number(String),
    /// `?`, `?NNN`, `:name`, `@name`, `$name`.
    Param(String),
    Operator(String),
    Comma,
    Dot,
    Semicolon,
    LParen,
    RParen,
}

impl Token {
    /// Identifier text for plain and quoted identifiers.
    pub fn ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) | Self::QuotedIdent(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, Self::Keyword(k) if *k == keyword)
    }

    pub fn render(&self) -> String {
        match self {
            Self::Keyword(k) => k.as_str().to_string(),
            Self::Ident(name) => name.clone(),
            Self::QuotedIdent(name) => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::String(value) => quote_literal(value),
            Self::Blob(hex) => format!("X'{hex}'"),
            Self::Number(raw) | Self::Param(raw) | Self::Operator(raw) => raw.clone(),
            Self::Comma => ",".to_string(),
            Self::Dot => ".".to_string(),
            Self::Semicolon => ";".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
        }
    }
}

/// Renders `value` as a single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

const THREE_CHAR_OPERATORS: &[&str] = &["->>"];
const TWO_CHAR_OPERATORS: &[&str] = &["||", "<=", ">=", "<>", "!=", "==", "<<", ">>", "->"];
const ONE_CHAR_OPERATORS: &[char] = &['=', '<', '>', '+', '-', '*', '/', '%', '&', '|', '~'];

pub fn tokenize(sql: &str) -> Result<Vec<Token>, SqlError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(SqlError::UnterminatedComment { offset: start });
                }
                if chars[i] == '*' && chars[i + 1] == '/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }

        if (c == 'x' || c == 'X') && chars.get(i + 1) == Some(&'\'') {
            let (hex, next) = read_quoted(&chars, i + 1, '\'')?;
            tokens.push(Token::Blob(hex));
            i = next;
            continue;
        }

        match c {
            '\'' => {
                let (value, next) = read_quoted(&chars, i, '\'')?;
                tokens.push(Token::String(value));
                i = next;
            }
            '"' | '`' => {
                let (value, next) = read_quoted(&chars, i, c)?;
                tokens.push(Token::QuotedIdent(value));
                i = next;
            }
            '[' => {
                let start = i;
                i += 1;
                let mut value = String::new();
                while i < chars.len() && chars[i] != ']' {
                    value.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(SqlError::UnterminatedString { offset: start });
                }
                i += 1;
                tokens.push(Token::QuotedIdent(value));
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' if chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                && !matches!(tokens.last(), Some(Token::Ident(_) | Token::QuotedIdent(_))) =>
            {
                let (raw, next) = read_number(&chars, i);
                tokens.push(Token::Number(raw));
                i = next;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '?' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token::Param(chars[start..i].iter().collect()));
            }
            ':' | '@' | '$' if chars.get(i + 1).is_some_and(|n| is_ident_char(*n)) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Param(chars[start..i].iter().collect()));
            }
            _ if c.is_ascii_digit() => {
                let (raw, next) = read_number(&chars, i);
                tokens.push(Token::Number(raw));
                i = next;
            }
            _ if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match Keyword::parse(&word) {
                    Some(keyword) => tokens.push(Token::Keyword(keyword)),
                    None => tokens.push(Token::Ident(word)),
                }
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                if let Some(op) = THREE_CHAR_OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                    tokens.push(Token::Operator(op.to_string()));
                    i += 3;
                } else if let Some(op) = TWO_CHAR_OPERATORS.iter().find(|op| rest.starts_with(**op))
                {
                    tokens.push(Token::Operator(op.to_string()));
                    i += 2;
                } else if ONE_CHAR_OPERATORS.contains(&c) {
                    tokens.push(Token::Operator(c.to_string()));
                    i += 1;
                } else {
                    return Err(SqlError::UnexpectedChar { ch: c, offset: i });
                }
            }
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Reads a literal opened by `quote` at `start`; a doubled quote is an escaped quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), SqlError> {
    let mut value = String::new();
    let mut i = start + 1;
    loop {
        let Some(&c) = chars.get(i) else {
            return Err(SqlError::UnterminatedString { offset: start });
        };
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                value.push(quote);
                i += 2;
                continue;
            }
            return Ok((value, i + 1));
        }
        value.push(c);
        i += 1;
    }
}

fn read_number(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    if chars[i] == '0' && matches!(chars.get(i + 1), Some('x' | 'X')) {
        i += 2;
        while i < chars.len() && chars[i].is_ascii_hexdigit() {
            i += 1;
        }
        return (chars[start..i].iter().collect(), i);
    }
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    (chars[start..i].iter().collect(), i)
}
