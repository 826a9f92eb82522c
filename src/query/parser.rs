//! Parser for bracketed AND/OR keyword expressions.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::{Combinator, Group, KeywordQuery, MalformedKind, QueryError, QueryResult, Term};

static OR_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:\bOR\b|\|\|)\s*").expect("valid OR pattern"));

static AND_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:\bAND\b|&&)\s*").expect("valid AND pattern"));

/// Groups and the text between them, as found by [`split_groups`].
struct Layout<'a> {
    groups: Vec<&'a str>,
    /// Text between consecutive groups; `gaps.len() == groups.len() - 1`
    gaps: Vec<&'a str>,
    leading: &'a str,
    trailing: &'a str,
}

/// Compile a keyword query into a [`KeywordQuery`].
///
/// Parsing is total: either the whole query compiles or an error naming the
/// offending fragment is returned, so callers can reject bad input before
/// touching any stored flags.
///
/// # Errors
/// Returns `QueryError::Malformed` when the query has no group, unbalanced or
/// nested parentheses, unrecognized text between or around groups, or an
/// empty keyword term.
pub fn compile(query: &str) -> QueryResult<KeywordQuery> {
    let body = query
        .trim()
        .trim_matches(|c: char| c == '[' || c == ']')
        .trim();

    let layout = split_groups(body)?;
    if layout.groups.is_empty() {
        return Err(QueryError::malformed(MalformedKind::NoGroups, body));
    }
    if !layout.leading.trim().is_empty() {
        return Err(QueryError::malformed(
            MalformedKind::StrayText,
            layout.leading.trim(),
        ));
    }
    if !layout.trailing.trim().is_empty() {
        return Err(QueryError::malformed(
            MalformedKind::StrayText,
            layout.trailing.trim(),
        ));
    }

    let combinator = infer_top_level(&layout.gaps)?;
    let groups = layout
        .groups
        .iter()
        .map(|group| parse_group(group))
        .collect::<QueryResult<Vec<_>>>()?;

    let compiled = KeywordQuery { combinator, groups };
    debug!(
        query = %compiled,
        groups = compiled.groups.len(),
        terms = compiled.term_count(),
        "compiled keyword query"
    );
    Ok(compiled)
}

/// Locate every single-level parenthesized group.
fn split_groups(body: &str) -> QueryResult<Layout<'_>> {
    let mut groups = Vec::new();
    let mut gaps = Vec::new();
    let mut leading = body;
    let mut open: Option<usize> = None;
    let mut last_end = 0;

    for (idx, ch) in body.char_indices() {
        match (ch, open) {
            ('(', None) => {
                let outside = &body[last_end..idx];
                if groups.is_empty() {
                    leading = outside;
                } else {
                    gaps.push(outside);
                }
                open = Some(idx);
            }
            ('(', Some(start)) => {
                return Err(QueryError::malformed(
                    MalformedKind::NestedGroup,
                    until_close(body, start),
                ));
            }
            (')', None) => {
                return Err(QueryError::malformed(
                    MalformedKind::UnmatchedParen,
                    body[last_end..=idx].trim(),
                ));
            }
            (')', Some(start)) => {
                groups.push(&body[start + 1..idx]);
                open = None;
                last_end = idx + 1;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        return Err(QueryError::malformed(
            MalformedKind::UnclosedGroup,
            &body[start..],
        ));
    }

    let trailing = if groups.is_empty() { "" } else { &body[last_end..] };
    Ok(Layout {
        groups,
        gaps,
        leading,
        trailing,
    })
}

/// The text from `start` up to and including the next `)`, or to the end.
fn until_close(body: &str, start: usize) -> &str {
    match body[start..].find(')') {
        Some(offset) => &body[start..=start + offset],
        None => &body[start..],
    }
}

/// Pick the operator joining all groups from the first connective found.
fn infer_top_level(gaps: &[&str]) -> QueryResult<Combinator> {
    let mut chosen: Option<Combinator> = None;
    for gap in gaps {
        let Some(found) = parse_connective(gap)? else {
            continue;
        };
        match chosen {
            None => chosen = Some(found),
            Some(first) if first != found => {
                warn!(
                    first = %first,
                    ignored = %found,
                    "mixed top-level connectives; all groups are combined with the first"
                );
            }
            Some(_) => {}
        }
    }
    Ok(chosen.unwrap_or(Combinator::And))
}

fn parse_connective(gap: &str) -> QueryResult<Option<Combinator>> {
    let word = gap.trim();
    if word.is_empty() {
        Ok(None)
    } else if word.eq_ignore_ascii_case("and") || word == "&&" {
        Ok(Some(Combinator::And))
    } else if word.eq_ignore_ascii_case("or") || word == "||" {
        Ok(Some(Combinator::Or))
    } else {
        Err(QueryError::malformed(MalformedKind::UnknownConnective, word))
    }
}

/// Parse the body of one group.
///
/// The body is split on OR first and each part on AND. If any part contains
/// AND, every term of the group is combined with AND.
fn parse_group(body: &str) -> QueryResult<Group> {
    let parts: Vec<&str> = OR_SPLIT.split(body.trim()).collect();
    let mut combinator = Combinator::Or;
    let mut terms = Vec::new();

    for part in &parts {
        let sub_terms: Vec<&str> = AND_SPLIT.split(part).collect();
        if sub_terms.len() > 1 {
            combinator = Combinator::And;
        }
        for raw in sub_terms {
            terms.push(parse_term(raw, body)?);
        }
    }

    if combinator == Combinator::And && parts.len() > 1 {
        warn!(
            group = body.trim(),
            "group mixes AND and OR; all of its terms are combined with AND"
        );
    }

    Ok(Group { combinator, terms })
}

fn parse_term(raw: &str, group: &str) -> QueryResult<Term> {
    let text = raw.trim().replace('_', " ");
    if text.trim().is_empty() {
        return Err(QueryError::malformed(
            MalformedKind::EmptyTerm,
            format!("({})", group.trim()),
        ));
    }
    Ok(Term::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(group: &Group) -> Vec<&str> {
        group.terms.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_single_group_single_term() {
        let query = compile("(blockchain)").unwrap();
        assert_eq!(query.combinator, Combinator::And);
        assert_eq!(query.groups.len(), 1);
        assert_eq!(query.groups[0].combinator, Combinator::Or);
        assert_eq!(texts(&query.groups[0]), vec!["blockchain"]);
    }

    #[test]
    fn test_or_group_with_underscore_term() {
        let query = compile("(blockchain OR data_recovery)").unwrap();
        let group = &query.groups[0];
        assert_eq!(group.combinator, Combinator::Or);
        assert_eq!(texts(group), vec!["blockchain", "data recovery"]);
        assert_eq!(group.terms[1].needle, "data recovery");
    }

    #[test]
    fn test_needles_are_lowercased() {
        let query = compile("(IoT OR Smart_Home)").unwrap();
        let needles: Vec<&str> = query.groups[0]
            .terms
            .iter()
            .map(|t| t.needle.as_str())
            .collect();
        assert_eq!(needles, vec!["iot", "smart home"]);
    }

    #[test]
    fn test_connectives_are_case_insensitive() {
        let query = compile("(a and b) or (c)").unwrap();
        assert_eq!(query.combinator, Combinator::Or);
        assert_eq!(query.groups[0].combinator, Combinator::And);
        assert_eq!(texts(&query.groups[0]), vec!["a", "b"]);
    }

    #[test]
    fn test_symbolic_connectives() {
        let query = compile("(a && b) || (c || d)").unwrap();
        assert_eq!(query.combinator, Combinator::Or);
        assert_eq!(query.groups[0].combinator, Combinator::And);
        assert_eq!(query.groups[1].combinator, Combinator::Or);
        assert_eq!(texts(&query.groups[1]), vec!["c", "d"]);
    }

    #[test]
    fn test_connective_words_inside_keywords_are_not_split() {
        let query = compile("(oregon OR android OR sandbox)").unwrap();
        assert_eq!(
            texts(&query.groups[0]),
            vec!["oregon", "android", "sandbox"]
        );
    }

    #[test]
    fn test_underscored_connective_stays_in_term() {
        let query = compile("(rock_and_roll)").unwrap();
        assert_eq!(texts(&query.groups[0]), vec!["rock and roll"]);
        assert_eq!(query.groups[0].combinator, Combinator::Or);
    }

    #[test]
    fn test_and_in_any_part_makes_group_and() {
        let query = compile("(a AND b OR c)").unwrap();
        let group = &query.groups[0];
        assert_eq!(group.combinator, Combinator::And);
        assert_eq!(texts(group), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_top_level_defaults_to_and() {
        let query = compile("(a) (b)").unwrap();
        assert_eq!(query.combinator, Combinator::And);
        assert_eq!(query.groups.len(), 2);
    }

    #[test]
    fn test_first_top_level_connective_wins() {
        let query = compile("(a) OR (b) AND (c)").unwrap();
        assert_eq!(query.combinator, Combinator::Or);
        assert_eq!(query.groups.len(), 3);
    }

    #[test]
    fn test_square_brackets_are_stripped() {
        let query = compile("  [(a) AND (b)]  ").unwrap();
        assert_eq!(query.combinator, Combinator::And);
        assert_eq!(query.groups.len(), 2);
    }

    #[test]
    fn test_no_groups_is_rejected() {
        let err = compile("blockchain AND ledger").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::NoGroups);

        let err = compile("   ").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::NoGroups);

        let err = compile("[]").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::NoGroups);
    }

    #[test]
    fn test_empty_terms_are_rejected() {
        for input in ["()", "(   )", "(a OR )", "(a AND  AND b)", "(_)", "(x) AND (__)"] {
            let err = compile(input).unwrap_err();
            assert_eq!(err.kind(), MalformedKind::EmptyTerm, "input: {input}");
        }
    }

    #[test]
    fn test_empty_term_fragment_names_group() {
        let err = compile("(ok) AND (a OR )").unwrap_err();
        assert_eq!(err.fragment(), "(a OR)");
    }

    #[test]
    fn test_nested_group_is_rejected() {
        let err = compile("((a) OR b)").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::NestedGroup);
        assert_eq!(err.fragment(), "((a)");
    }

    #[test]
    fn test_unbalanced_parentheses_are_rejected() {
        let err = compile("(a) AND (b").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::UnclosedGroup);
        assert_eq!(err.fragment(), "(b");

        let err = compile("(a) b)").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::UnmatchedParen);
        assert_eq!(err.fragment(), "b)");
    }

    #[test]
    fn test_unknown_connective_is_rejected() {
        let err = compile("(a) XOR (b)").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::UnknownConnective);
        assert_eq!(err.fragment(), "XOR");
    }

    #[test]
    fn test_stray_text_is_rejected() {
        let err = compile("title: (a)").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::StrayText);
        assert_eq!(err.fragment(), "title:");

        let err = compile("(a) AND").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::StrayText);
        assert_eq!(err.fragment(), "AND");
    }

    #[test]
    fn test_unicode_terms() {
        let query = compile("(Überwachung OR 区块链)").unwrap();
        assert_eq!(query.groups[0].terms[0].needle, "überwachung");
        assert_eq!(texts(&query.groups[0]), vec!["Überwachung", "区块链"]);
    }
}
