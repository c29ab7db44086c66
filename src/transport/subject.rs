//! Subject patterns
//!
//! Subjects are dot-separated token lists such as `test.message.0`. A
//! pattern may use `*` to match exactly one token and `>` as its last token
//! to match one or more trailing tokens. Empty tokens are never valid.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Single,
    Tail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPattern {
    raw: String,
    tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid subject '{0}'")]
pub struct InvalidSubject(pub String);

impl SubjectPattern {
    pub fn parse(pattern: &str) -> Result<Self, InvalidSubject> {
        let invalid = || InvalidSubject(pattern.to_string());
        if pattern.is_empty() || pattern.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let parts: Vec<&str> = pattern.split('.').collect();
        let last = parts.len() - 1;
        let mut tokens = Vec::with_capacity(parts.len());
        for (i, part) in parts.into_iter().enumerate() {
            let token = match part {
                "" => return Err(invalid()),
                "*" => Token::Single,
                ">" if i == last => Token::Tail,
                ">" => return Err(invalid()),
                literal => Token::Literal(literal.to_string()),
            };
            tokens.push(token);
        }

        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        self.tokens.iter().any(|t| !matches!(t, Token::Literal(_)))
    }

    /// Whether a concrete subject is routed to this pattern.
    pub fn matches(&self, subject: &str) -> bool {
        let mut parts = subject.split('.');
        for token in &self.tokens {
            match token {
                // only ever the last token; needs at least one more subject token
                Token::Tail => {
                    let rest: Vec<&str> = parts.collect();
                    return !rest.is_empty() && rest.iter().all(|p| !p.is_empty());
                }
                Token::Single => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
                Token::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Validates a concrete subject for publishing: wildcards are not allowed.
pub fn validate_subject(subject: &str) -> Result<(), InvalidSubject> {
    let pattern = SubjectPattern::parse(subject)?;
    if pattern.is_wildcard() {
        return Err(InvalidSubject(subject.to_string()));
    }
    Ok(())
}
