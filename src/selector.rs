//! Label selector parsing and evaluation
//!
//! Implements the standard Kubernetes label selector grammar over key/value
//! label sets: equality (`tier=batch`, `tier==batch`, `tier!=web`),
//! set membership (`env in (staging, prod)`, `env notin (dev)`), and
//! existence (`gpu`, `!gpu`). Requirements are comma separated and all must
//! hold for a selector to match.
//!
//! Evaluation is a pure function over the selector and a label set: no I/O,
//! no shared state, safe for unlimited concurrent use. A syntactically
//! invalid expression is a [`ParseError`] and never degrades to "does not
//! match", because a selector that silently matches nothing would make the
//! webhook skip every Job without anyone noticing.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors produced when parsing a label selector expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A requirement was empty, e.g. a stray comma in the expression
    #[error("empty requirement in selector {0:?}")]
    EmptyRequirement(String),

    /// A label key was missing or contained invalid characters
    #[error("invalid label key {key:?}")]
    InvalidKey {
        /// The offending key
        key: String,
    },

    /// A label value contained invalid characters
    #[error("invalid label value {value:?} for key {key:?}")]
    InvalidValue {
        /// The key the value belongs to
        key: String,
        /// The offending value
        value: String,
    },

    /// An equality operator was not followed by a value
    #[error("expected a value after {operator:?} for key {key:?}")]
    MissingValue {
        /// The key the requirement applies to
        key: String,
        /// The operator that was left dangling
        operator: &'static str,
    },

    /// A set operator was not followed by a parenthesized value list
    #[error("expected a parenthesized value list for key {key:?}")]
    MissingValueSet {
        /// The key the requirement applies to
        key: String,
    },

    /// Parentheses in the expression did not balance
    #[error("unbalanced parentheses in selector {0:?}")]
    UnbalancedParentheses(String),
}

/// Comparison operator of a single selector requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A single parsed requirement, e.g. `env in (staging, prod)`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// Evaluate this requirement against a label set.
    ///
    /// A key absent from the set does not satisfy equality or `in` clauses;
    /// negated clauses (`!=`, `notin`, `!key`) match when the key is absent,
    /// per Kubernetes semantics.
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            Operator::Equal | Operator::In => labels
                .get(&self.key)
                .map_or(false, |v| self.values.contains(v)),
            Operator::NotEqual | Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// A parsed label selector: a conjunction of requirements
///
/// A selector with no requirements matches every label set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse a selector expression.
    ///
    /// An empty or whitespace-only expression parses to a selector with no
    /// requirements, which matches everything.
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut requirements = Vec::new();
        for part in split_requirements(trimmed, expression)? {
            requirements.push(parse_requirement(part, expression)?);
        }
        Ok(Self { requirements })
    }

    /// Evaluate the selector against a label set.
    ///
    /// All requirements must hold for the selector to match.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

/// Evaluate a selector expression against a label set.
///
/// The empty expression is the sentinel for "selector filtering disabled"
/// and matches unconditionally. Anything else is parsed and evaluated;
/// a malformed expression is returned as an error for the caller to surface.
pub fn matches(
    expression: &str,
    labels: &BTreeMap<String, String>,
) -> Result<bool, ParseError> {
    if expression.trim().is_empty() {
        return Ok(true);
    }
    Ok(Selector::parse(expression)?.matches(labels))
}

/// Split an expression into requirement substrings at top-level commas.
///
/// Commas inside a parenthesized value list separate values, not
/// requirements, so nesting depth is tracked while scanning.
fn split_requirements<'a>(
    trimmed: &'a str,
    expression: &str,
) -> Result<Vec<&'a str>, ParseError> {
    let unbalanced = || ParseError::UnbalancedParentheses(expression.to_string());

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in trimmed.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            ',' if depth == 0 => {
                parts.push(&trimmed[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(unbalanced());
    }
    parts.push(&trimmed[start..]);
    Ok(parts)
}

/// Parse a single requirement substring.
fn parse_requirement(raw: &str, expression: &str) -> Result<Requirement, ParseError> {
    let req = raw.trim();
    if req.is_empty() {
        return Err(ParseError::EmptyRequirement(expression.to_string()));
    }

    // Negated existence: !key
    if let Some(rest) = req.strip_prefix('!') {
        let key = rest.trim();
        validate_key(key)?;
        return Ok(Requirement {
            key: key.to_string(),
            operator: Operator::DoesNotExist,
            values: Vec::new(),
        });
    }

    // Set membership: key notin (v1, v2) / key in (v1, v2).
    // notin is checked first so its trailing "in" is not misread.
    for (token, operator) in [(" notin", Operator::NotIn), (" in", Operator::In)] {
        if let Some((key, rest)) = split_set_requirement(req, token) {
            let key = key.trim();
            validate_key(key)?;
            let values = parse_value_set(key, rest)?;
            return Ok(Requirement {
                key: key.to_string(),
                operator,
                values,
            });
        }
    }

    // Equality: key != value, key == value, key = value.
    // != before == before =, so the longer operators are not split in two.
    for (token, operator) in [
        ("!=", Operator::NotEqual),
        ("==", Operator::Equal),
        ("=", Operator::Equal),
    ] {
        if let Some((key, value)) = req.split_once(token) {
            let key = key.trim();
            let value = value.trim();
            validate_key(key)?;
            if value.is_empty() {
                return Err(ParseError::MissingValue {
                    key: key.to_string(),
                    operator: token,
                });
            }
            validate_value(key, value)?;
            return Ok(Requirement {
                key: key.to_string(),
                operator,
                values: vec![value.to_string()],
            });
        }
    }

    // Bare existence: key
    validate_key(req)?;
    Ok(Requirement {
        key: req.to_string(),
        operator: Operator::Exists,
        values: Vec::new(),
    })
}

/// Split `key <op> (values)` at a word operator.
///
/// The operator token must be followed by whitespace or by the value list
/// itself; otherwise the match is rejected so that keys merely containing
/// the letters "in" are not misparsed.
fn split_set_requirement<'a>(req: &'a str, token: &str) -> Option<(&'a str, &'a str)> {
    let idx = req.find(token)?;
    let rest = &req[idx + token.len()..];
    let rest_trimmed = rest.trim_start();
    if rest.len() == rest_trimmed.len() && !rest_trimmed.starts_with('(') {
        return None;
    }
    Some((&req[..idx], rest_trimmed))
}

/// Parse the `(v1, v2, ...)` value list of a set requirement.
fn parse_value_set(key: &str, rest: &str) -> Result<Vec<String>, ParseError> {
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| ParseError::MissingValueSet {
            key: key.to_string(),
        })?;

    let mut values = Vec::new();
    for part in inner.split(',') {
        let value = part.trim();
        if value.is_empty() {
            return Err(ParseError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        validate_value(key, value)?;
        values.push(value.to_string());
    }
    Ok(values)
}

/// Check a name segment: alphanumeric at both ends, `-`, `_`, `.` allowed
/// inside, at most 63 characters.
fn is_valid_label_token(s: &str) -> bool {
    let bytes = s.as_bytes();
    !s.is_empty()
        && s.len() <= 63
        && bytes.first().map_or(false, |b| b.is_ascii_alphanumeric())
        && bytes.last().map_or(false, |b| b.is_ascii_alphanumeric())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Validate a label key, which may carry a DNS subdomain prefix
/// (`example.com/role`).
fn validate_key(key: &str) -> Result<(), ParseError> {
    let invalid = || ParseError::InvalidKey {
        key: key.to_string(),
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            let prefix_ok = !prefix.is_empty()
                && prefix.len() <= 253
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-'));
            if !prefix_ok {
                return Err(invalid());
            }
            name
        }
        None => key,
    };

    if !is_valid_label_token(name) {
        return Err(invalid());
    }
    Ok(())
}

/// Validate a label value.
fn validate_value(key: &str, value: &str) -> Result<(), ParseError> {
    if !is_valid_label_token(value) {
        return Err(ParseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
