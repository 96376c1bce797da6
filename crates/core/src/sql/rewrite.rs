#![forbid(unsafe_code)]

use super::{Keyword, SqlError, SqlNode, Statement, Token};
use std::convert::Infallible;

/// Logical views served by the engine instead of physical tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalView {
    /// Active version only.
    State,
    /// Every version.
    StateAll,
    /// Point-in-time state resolved from a change set.
    StateHistory,
}

impl LogicalView {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "state" => Some(Self::State),
            "state_all" => Some(Self::StateAll),
            "state_history" => Some(Self::StateHistory),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::StateAll => "state_all",
            Self::StateHistory => "state_history",
        }
    }
}

/// A view mentioned in table position, with whatever its scope statically pins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewReference {
    pub view: LogicalView,
    /// Name the surrounding query uses for the view: its alias, or the view name.
    pub binding: String,
    pub has_alias: bool,
    /// Single `schema_key` literal pinned by the scope's `WHERE` clause.
    pub schema_key: Option<String>,
    /// Single `change_set_id` literal pinned by the scope's `WHERE` clause.
    pub change_set_id: Option<String>,
    /// The view is the target of `INSERT`/`UPDATE`/`DELETE`.
    pub write_target: bool,
}

pub fn view_references(statement: &Statement) -> Vec<ViewReference> {
    let mut found = Vec::new();
    let collected: Result<Vec<SqlNode>, Infallible> =
        transform_scope(&statement.nodes, &mut |reference: &ViewReference| {
            found.push(reference.clone());
            Ok(None)
        });
    let Ok(_) = collected;
    found
}

/// Replaces every view reference with `(<subquery>) AS <binding>`.
///
/// `replace` returns the subquery text for a reference, or `None` to leave it untouched.
pub fn rewrite_view_references<E: From<SqlError>>(
    statement: &Statement,
    mut replace: impl FnMut(&ViewReference) -> Result<Option<String>, E>,
) -> Result<String, E> {
    let nodes = transform_scope(
        &statement.nodes,
        &mut |reference: &ViewReference| -> Result<Option<Vec<SqlNode>>, E> {
            match replace(reference)? {
                Some(sql) => Ok(Some(Statement::parse(&sql)?.nodes)),
                None => Ok(None),
            }
        },
    )?;
    Ok(super::render_nodes(&nodes))
}

type Replacer<'a, E> = dyn FnMut(&ViewReference) -> Result<Option<Vec<SqlNode>>, E> + 'a;

fn transform_scope<E>(nodes: &[SqlNode], replace: &mut Replacer<'_, E>) -> Result<Vec<SqlNode>, E> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut start = 0usize;
    for (index, node) in nodes.iter().enumerate() {
        if node.keyword().is_some_and(Keyword::is_compound) {
            out.extend(transform_part(&nodes[start..index], replace)?);
            out.push(node.clone());
            start = index + 1;
        }
    }
    out.extend(transform_part(&nodes[start..], replace)?);
    Ok(out)
}

struct Site {
    index: usize,
    reference: ViewReference,
}

fn transform_part<E>(part: &[SqlNode], replace: &mut Replacer<'_, E>) -> Result<Vec<SqlNode>, E> {
    let sites = find_sites(part);
    let mut out = Vec::with_capacity(part.len());
    let mut site_iter = sites.into_iter().peekable();

    for (index, node) in part.iter().enumerate() {
        if let Some(site) = site_iter.next_if(|site| site.index == index) {
            match replace(&site.reference)? {
                Some(subquery) => {
                    out.push(SqlNode::Group(subquery));
                    if !site.reference.has_alias {
                        out.push(SqlNode::Token(Token::Keyword(Keyword::As)));
                        out.push(SqlNode::Token(Token::Ident(site.reference.binding.clone())));
                    }
                }
                None => out.push(node.clone()),
            }
            continue;
        }
        match node {
            SqlNode::Group(inner) => out.push(SqlNode::Group(transform_scope(inner, replace)?)),
            SqlNode::Token(_) => out.push(node.clone()),
        }
    }

    Ok(out)
}

fn find_sites(part: &[SqlNode]) -> Vec<Site> {
    let deleting = part.first().is_some_and(|n| n.is_keyword(Keyword::Delete));
    let mut sites = Vec::new();
    let mut in_from = false;

    for (index, node) in part.iter().enumerate() {
        if let Some(keyword) = node.keyword() {
            match keyword {
                Keyword::From | Keyword::Join => in_from = true,
                k if k.ends_clause() => in_from = false,
                _ => {}
            }
            continue;
        }

        let Some(view) = node.token().and_then(Token::ident).and_then(LogicalView::from_name) else {
            continue;
        };
        let previous = index.checked_sub(1).map(|i| &part[i]);
        let next = part.get(index + 1);

        let write_target = previous.is_some_and(|p| {
            p.is_keyword(Keyword::Into)
                || p.is_keyword(Keyword::Update)
                || (deleting && p.is_keyword(Keyword::From))
        });
        let table_position = write_target
            || previous.is_some_and(|p| {
                p.is_keyword(Keyword::From)
                    || p.is_keyword(Keyword::Join)
                    || (in_from && matches!(p, SqlNode::Token(Token::Comma)))
            });
        if !table_position {
            continue;
        }
        let followed_by_member = matches!(next, Some(SqlNode::Token(Token::Dot)) | Some(SqlNode::Group(_)));
        if followed_by_member && !write_target {
            continue;
        }

        let alias = match (next, part.get(index + 2)) {
            (Some(n), Some(SqlNode::Token(t))) if n.is_keyword(Keyword::As) => {
                t.ident().map(str::to_string)
            }
            (Some(SqlNode::Token(t)), _) if !write_target => t.ident().map(str::to_string),
            _ => None,
        };

        sites.push(Site {
            index,
            reference: ViewReference {
                view,
                binding: alias.clone().unwrap_or_else(|| view.name().to_string()),
                has_alias: alias.is_some(),
                schema_key: None,
                change_set_id: None,
                write_target,
            },
        });
    }

    let pins = where_pins(part);
    let reference_count = sites.len();
    for site in &mut sites {
        site.reference.schema_key = resolve_pin(&pins, "schema_key", &site.reference, reference_count);
        site.reference.change_set_id =
            resolve_pin(&pins, "change_set_id", &site.reference, reference_count);
    }
    sites
}

#[derive(Debug)]
struct Pin {
    qualifier: Option<String>,
    column: String,
    value: String,
}

/// Equality pins from the top level of the part's `WHERE` clause. Any top-level `OR` voids them.
fn where_pins(part: &[SqlNode]) -> Vec<Pin> {
    let Some(where_index) = part.iter().position(|n| n.is_keyword(Keyword::Where)) else {
        return Vec::new();
    };
    let clause_end = part[where_index + 1..]
        .iter()
        .position(|n| n.keyword().is_some_and(Keyword::ends_clause))
        .map(|offset| where_index + 1 + offset)
        .unwrap_or(part.len());
    let clause = &part[where_index + 1..clause_end];

    if clause.iter().any(|n| n.is_keyword(Keyword::Or)) {
        return Vec::new();
    }

    let mut pins = Vec::new();
    let mut j = 0usize;
    while j < clause.len() {
        let negated = j > 0 && clause[j - 1].is_keyword(Keyword::Not);

        if let Some((qualifier, column, after)) = column_at(clause, j) {
            if let Some(value) = literal_after_column(clause, after) {
                if !negated {
                    pins.push(Pin { qualifier, column, value });
                }
            }
            j = after;
            continue;
        }

        if let Some(SqlNode::Token(Token::String(value))) = clause.get(j) {
            if is_equals(clause.get(j + 1)) {
                if let Some((qualifier, column, after)) = column_at(clause, j + 2) {
                    if !negated {
                        pins.push(Pin {
                            qualifier,
                            column,
                            value: value.clone(),
                        });
                    }
                    j = after;
                    continue;
                }
            }
        }

        j += 1;
    }
    pins
}

fn column_at(clause: &[SqlNode], j: usize) -> Option<(Option<String>, String, usize)> {
    let first = clause.get(j)?.token()?.ident()?;
    if matches!(clause.get(j + 1), Some(SqlNode::Token(Token::Dot))) {
        let column = clause.get(j + 2)?.token()?.ident()?;
        return Some((Some(first.to_string()), column.to_ascii_lowercase(), j + 3));
    }
    Some((None, first.to_ascii_lowercase(), j + 1))
}

fn literal_after_column(clause: &[SqlNode], after: usize) -> Option<String> {
    if is_equals(clause.get(after)) {
        if let Some(SqlNode::Token(Token::String(value))) = clause.get(after + 1) {
            return Some(value.clone());
        }
        return None;
    }
    if clause.get(after).is_some_and(|n| n.is_keyword(Keyword::In)) {
        if let Some(SqlNode::Group(items)) = clause.get(after + 1) {
            if let [SqlNode::Token(Token::String(value))] = items.as_slice() {
                return Some(value.clone());
            }
        }
    }
    None
}

fn is_equals(node: Option<&SqlNode>) -> bool {
    matches!(node, Some(SqlNode::Token(Token::Operator(op))) if op == "=" || op == "==")
}

fn resolve_pin(
    pins: &[Pin],
    column: &str,
    reference: &ViewReference,
    reference_count: usize,
) -> Option<String> {
    let mut values = pins
        .iter()
        .filter(|pin| pin.column == column)
        .filter(|pin| match &pin.qualifier {
            Some(q) => q.eq_ignore_ascii_case(&reference.binding),
            None => reference_count == 1,
        })
        .map(|pin| pin.value.as_str())
        .collect::<Vec<_>>();
    values.sort_unstable();
    values.dedup();
    match values.as_slice() {
        [single] => Some(single.to_string()),
        _ => None,
    }
}
