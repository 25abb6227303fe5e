//! Text patterns.
//!
//! A [`Pattern`] is matched against the whole (trimmed) text of a message.
//! Its source is made of three kinds of token:
//!
//! | Token | Matches |
//! |-------|---------|
//! | literal text | itself, case-insensitively unless disabled |
//! | `{name}` | one or more characters, bound to `name` |
//! | `*` | any run of characters, including none |
//!
//! ```rust
//! use parley_framework::Pattern;
//!
//! let pattern = Pattern::new("call me {name}", true).unwrap();
//! let params = pattern.matches("Call me Ishmael").unwrap();
//! assert_eq!(params.get("name"), Some("Ishmael"));
//! ```
//!
//! Placeholder names must be identifiers and may appear at most once; both
//! are checked when the pattern is built, never at dispatch time.

use std::collections::HashSet;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::{PatternError, PatternResult};
use parley_core::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param(String),
    Wildcard,
}

#[derive(Clone)]
enum Compiled {
    /// Matches every text, including the empty one.
    Any,
    Regex(Regex),
}

/// A compiled text pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: Compiled,
    params: Vec<String>,
}

impl Pattern {
    /// Parses and compiles `source`.
    ///
    /// Literals compare case-insensitively when `case_insensitive` is set.
    pub fn new(source: &str, case_insensitive: bool) -> PatternResult<Self> {
        let tokens = tokenize(source)?;

        if tokens.iter().all(|t| *t == Token::Wildcard) {
            return Ok(Self {
                source: source.to_string(),
                compiled: Compiled::Any,
                params: Vec::new(),
            });
        }

        let mut expr = String::from("^");
        let mut params = Vec::new();
        for token in &tokens {
            match token {
                Token::Literal(text) => expr.push_str(&regex::escape(text)),
                Token::Param(name) => {
                    expr.push_str(&format!("(?P<{name}>.+?)"));
                    params.push(name.clone());
                }
                Token::Wildcard => expr.push_str(".*"),
            }
        }
        expr.push('$');

        let regex = RegexBuilder::new(&expr)
            .case_insensitive(case_insensitive)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| PatternError::Compile {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            source: source.to_string(),
            compiled: Compiled::Regex(regex),
            params,
        })
    }

    /// A pattern that matches any text, including an empty one.
    ///
    /// Used for registrations that only care about a category, such as
    /// "any message carrying an image".
    pub fn any() -> Self {
        Self {
            source: "*".to_string(),
            compiled: Compiled::Any,
            params: Vec::new(),
        }
    }

    /// Returns the source the pattern was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the placeholder names in order of appearance.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Matches `text`, returning the bound parameters on success.
    pub fn matches(&self, text: &str) -> Option<Params> {
        match &self.compiled {
            Compiled::Any => Some(Params::new()),
            Compiled::Regex(regex) => {
                let captures = regex.captures(text.trim())?;
                Some(
                    self.params
                        .iter()
                        .filter_map(|name| {
                            captures
                                .name(name)
                                .map(|m| (name.clone(), m.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("params", &self.params)
            .finish()
    }
}

/// Validates `source` without keeping the compiled form.
pub fn validate(source: &str) -> PatternResult<()> {
    Pattern::new(source, false).map(|_| ())
}

fn tokenize(source: &str) -> PatternResult<Vec<Token>> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(PatternError::Empty);
    }

    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut seen = HashSet::new();
    let mut chars = trimmed.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(PatternError::UnclosedPlaceholder {
                        pattern: source.to_string(),
                    });
                }
                if !is_identifier(&name) {
                    return Err(PatternError::InvalidParameter {
                        pattern: source.to_string(),
                        name,
                    });
                }
                if !seen.insert(name.clone()) {
                    return Err(PatternError::DuplicateParameter {
                        pattern: source.to_string(),
                        name,
                    });
                }
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Param(name));
            }
            '*' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Wildcard);
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(tokens)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_is_anchored() {
        let p = Pattern::new("Hello", true).unwrap();
        assert!(p.matches("hello").is_some());
        assert!(p.matches("  HELLO ").is_some());
        assert!(p.matches("hello there").is_none());
    }

    #[test]
    fn case_sensitive_when_configured() {
        let p = Pattern::new("Hello", false).unwrap();
        assert!(p.matches("Hello").is_some());
        assert!(p.matches("hello").is_none());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = Pattern::new("what? (really)", true).unwrap();
        assert!(p.matches("what? (really)").is_some());
        assert!(p.matches("wha (really)").is_none());
    }

    #[test]
    fn wildcard_matches_any_suffix() {
        let p = Pattern::new("a*", true).unwrap();
        assert!(p.matches("abc").is_some());
        assert!(p.matches("a").is_some());
        assert!(p.matches("ba").is_none());
    }

    #[test]
    fn placeholders_bind_parameters() {
        let p = Pattern::new("from {origin} to {destination}", true).unwrap();
        let params = p.matches("from Berlin to New York").unwrap();
        assert_eq!(params.get("origin"), Some("Berlin"));
        assert_eq!(params.get("destination"), Some("New York"));
        assert_eq!(p.param_names(), ["origin", "destination"]);
    }

    #[test]
    fn placeholder_requires_content() {
        let p = Pattern::new("call me {name}", true).unwrap();
        assert!(p.matches("call me").is_none());
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let err = Pattern::new("{x} and {x}", true).unwrap_err();
        assert!(matches!(err, PatternError::DuplicateParameter { name, .. } if name == "x"));
    }

    #[test]
    fn malformed_placeholders_are_rejected() {
        assert!(matches!(
            Pattern::new("hi {name", true),
            Err(PatternError::UnclosedPlaceholder { .. })
        ));
        assert!(matches!(
            Pattern::new("hi {1st}", true),
            Err(PatternError::InvalidParameter { .. })
        ));
        assert!(matches!(
            Pattern::new("hi {}", true),
            Err(PatternError::InvalidParameter { .. })
        ));
        assert_eq!(Pattern::new("   ", true).unwrap_err(), PatternError::Empty);
    }

    #[test]
    fn any_matches_empty_text() {
        assert!(Pattern::any().matches("").is_some());
        assert!(Pattern::new("*", true).unwrap().matches("").is_some());
    }
}
