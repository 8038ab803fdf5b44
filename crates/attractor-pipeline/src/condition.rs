//! Condition expression language for edge gating.
//!
//! Grammar: one or more `key op value` clauses joined by `and`/`or`, with `and`
//! binding tighter than `or`. Supported operators: `=`, `!=`, `in` (comma-list),
//! `matches` (regex). An empty expression always evaluates to true.

use attractor_types::AttractorError;

/// A single comparison against a resolved context value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmp {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    /// Regex pattern compiled lazily at evaluation time.
    Matches(String, String),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    True,
    Clause(Cmp),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

fn make_error(msg: &str) -> AttractorError {
    AttractorError::ValidationError(msg.to_string())
}

fn validate_key(key: &str) -> Result<(), AttractorError> {
    if key.is_empty()
        || !key
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_'))
    {
        return Err(make_error(&format!("invalid condition key '{key}'")));
    }
    Ok(())
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Split input into whitespace-separated words, treating a quoted span
/// (single or double quotes) as one word so embedded spaces survive.
fn smart_split_whitespace(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' || c == '\'' {
            current.push(c);
            let quote = c;
            for qc in chars.by_ref() {
                current.push(qc);
                if qc == quote {
                    break;
                }
            }
        } else if c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Find the byte offset of `=` or `!=` outside quotes in a compact clause
/// like `key=value` or `key!=value`. Returns (operator_start, is_ne).
fn find_operator(s: &str) -> Result<(usize, bool), AttractorError> {
    let bytes = s.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => in_quote = Some(b),
            None if b == b'=' => {
                if i > 0 && bytes[i - 1] == b'!' {
                    return Ok((i - 1, true));
                }
                return Ok((i, false));
            }
            None => {}
        }
        i += 1;
    }
    Err(make_error(&format!("no operator found in clause '{s}'")))
}

fn parse_clause(tokens: &[String]) -> Result<Cmp, AttractorError> {
    if tokens.is_empty() {
        return Err(make_error("empty clause"));
    }

    if tokens.len() >= 3 && tokens[1] == "in" {
        let key = tokens[0].clone();
        validate_key(&key)?;
        let rest = tokens[2..].join(" ");
        let items: Vec<String> = rest.split(',').map(|s| strip_quotes(s.trim())).collect();
        return Ok(Cmp::In(key, items));
    }

    if tokens.len() >= 3 && tokens[1] == "matches" {
        let key = tokens[0].clone();
        validate_key(&key)?;
        let pattern = strip_quotes(&tokens[2..].join(" "));
        regex::Regex::new(&pattern)
            .map_err(|e| make_error(&format!("invalid regex '{pattern}': {e}")))?;
        return Ok(Cmp::Matches(key, pattern));
    }

    let joined = tokens.join(" ");
    let (op_pos, is_ne) = find_operator(&joined)?;
    let key = joined[..op_pos].trim().to_string();
    validate_key(&key)?;
    let value_start = if is_ne { op_pos + 2 } else { op_pos + 1 };
    let value = strip_quotes(joined[value_start..].trim());
    if is_ne {
        Ok(Cmp::Ne(key, value))
    } else {
        Ok(Cmp::Eq(key, value))
    }
}

/// Parse a condition string into an expression tree.
pub fn parse_condition(input: &str) -> Result<Expr, AttractorError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Expr::True);
    }

    let words = smart_split_whitespace(trimmed);

    // Split at top level on "or", then each group on "and".
    let mut or_groups: Vec<Vec<Vec<String>>> = vec![vec![]];
    let mut current_clause: Vec<String> = Vec::new();
    for word in words {
        if word == "or" {
            or_groups.last_mut().unwrap().push(std::mem::take(&mut current_clause));
            or_groups.push(vec![]);
        } else if word == "and" {
            or_groups.last_mut().unwrap().push(std::mem::take(&mut current_clause));
        } else {
            current_clause.push(word);
        }
    }
    or_groups.last_mut().unwrap().push(current_clause);

    let mut or_exprs = Vec::new();
    for group in or_groups {
        let mut and_exprs = Vec::new();
        for clause_tokens in group {
            if clause_tokens.is_empty() {
                return Err(make_error("empty clause between connectives"));
            }
            and_exprs.push(Expr::Clause(parse_clause(&clause_tokens)?));
        }
        let mut iter = and_exprs.into_iter();
        let mut acc = iter
            .next()
            .ok_or_else(|| make_error("empty condition group"))?;
        for next in iter {
            acc = Expr::And(Box::new(acc), Box::new(next));
        }
        or_exprs.push(acc);
    }

    let mut iter = or_exprs.into_iter();
    let mut acc = iter.next().unwrap_or(Expr::True);
    for next in iter {
        acc = Expr::Or(Box::new(acc), Box::new(next));
    }
    Ok(acc)
}

fn evaluate_cmp(cmp: &Cmp, resolve: &dyn Fn(&str) -> String) -> bool {
    match cmp {
        Cmp::Eq(key, value) => resolve(key) == *value,
        Cmp::Ne(key, value) => resolve(key) != *value,
        Cmp::In(key, values) => {
            let actual = resolve(key);
            values.iter().any(|v| v == &actual)
        }
        Cmp::Matches(key, pattern) => {
            let actual = resolve(key);
            regex::Regex::new(pattern)
                .map(|re| re.is_match(&actual))
                .unwrap_or(false)
        }
    }
}

/// Evaluate a parsed condition expression against a context-resolving callback.
pub fn evaluate_condition(expr: &Expr, resolve: &dyn Fn(&str) -> String) -> bool {
    match expr {
        Expr::True => true,
        Expr::Clause(cmp) => evaluate_cmp(cmp, resolve),
        Expr::And(a, b) => evaluate_condition(a, resolve) && evaluate_condition(b, resolve),
        Expr::Or(a, b) => evaluate_condition(a, resolve) || evaluate_condition(b, resolve),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> String + 'a {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default()
        }
    }

    #[test]
    fn simple_equality() {
        let expr = parse_condition("outcome=success").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("outcome", "success")])));
        assert!(!evaluate_condition(&expr, &resolve_from(&[("outcome", "fail")])));
    }

    #[test]
    fn not_equal() {
        let expr = parse_condition("outcome!=fail").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("outcome", "success")])));
        assert!(!evaluate_condition(&expr, &resolve_from(&[("outcome", "fail")])));
    }

    #[test]
    fn and_condition() {
        let expr = parse_condition("outcome=success and retries=0").unwrap();
        assert!(evaluate_condition(
            &expr,
            &resolve_from(&[("outcome", "success"), ("retries", "0")])
        ));
        assert!(!evaluate_condition(
            &expr,
            &resolve_from(&[("outcome", "success"), ("retries", "1")])
        ));
    }

    #[test]
    fn or_condition() {
        let expr = parse_condition("outcome=success or outcome=partial").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("outcome", "partial")])));
        assert!(!evaluate_condition(&expr, &resolve_from(&[("outcome", "fail")])));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // true and false or true -> (true and false) or true -> true
        let expr = parse_condition("a=1 and b=2 or c=3").unwrap();
        assert!(evaluate_condition(
            &expr,
            &resolve_from(&[("a", "1"), ("b", "x"), ("c", "3")])
        ));
        assert!(!evaluate_condition(
            &expr,
            &resolve_from(&[("a", "1"), ("b", "x"), ("c", "x")])
        ));
    }

    #[test]
    fn empty_condition_always_true() {
        let expr = parse_condition("").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[])));
    }

    #[test]
    fn missing_context_key_empty_string() {
        let expr = parse_condition("missing=").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[])));
    }

    #[test]
    fn quoted_string_values() {
        let expr = parse_condition(r#"status="needs review""#).unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("status", "needs review")])));
    }

    #[test]
    fn parse_error_invalid_syntax() {
        assert!(parse_condition("not a valid clause at all").is_err());
    }

    #[test]
    fn in_operator_matches_any() {
        let expr = parse_condition("status in active,pending,done").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("status", "pending")])));
        assert!(!evaluate_condition(&expr, &resolve_from(&[("status", "cancelled")])));
    }

    #[test]
    fn in_operator_with_spaced_list() {
        let expr = parse_condition("status in active, pending, done").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("status", "done")])));
    }

    #[test]
    fn matches_operator_evaluates_regex() {
        let expr = parse_condition(r#"message matches "^error:.*""#).unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("message", "error: boom")])));
        assert!(!evaluate_condition(&expr, &resolve_from(&[("message", "warning: boom")])));
    }

    #[test]
    fn invalid_regex_is_parse_error() {
        assert!(parse_condition("message matches \"(unclosed\"").is_err());
    }

    #[test]
    fn integer_values_as_strings() {
        let expr = parse_condition("count=5").unwrap();
        assert!(evaluate_condition(&expr, &resolve_from(&[("count", "5")])));
    }
}
