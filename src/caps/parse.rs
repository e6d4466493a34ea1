//! Text form of capability descriptors
//!
//! Grammar (whitespace around separators is ignored):
//!
//! ```text
//! caps      := "ANY" | "EMPTY" | "" | structure (";" structure)*
//! structure := name ("," field)*
//! field     := key "=" ["(" type ")"] value
//! value     := int | n "/" d | "true" | "false" | "\"" text "\"" | word
//!            | "[" value "," value "]"        ; inclusive range
//!            | "{" value ("," value)* "}"     ; list of alternatives
//! ```
//!
//! Type annotations such as `(int)` or `(fraction)` are accepted and ignored.

use std::str::FromStr;

use thiserror::Error;

use super::structure::Structure;
use super::value::{Fraction, Value};
use super::Caps;

/// Error returned when caps text is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid caps '{input}': {reason}")]
pub struct CapsParseError {
    /// The fragment that failed to parse
    pub input: String,
    /// What was wrong with it
    pub reason: &'static str,
}

impl CapsParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for Caps {
    type Err = CapsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "ANY" => return Ok(Caps::any()),
            "" | "EMPTY" | "NONE" => return Ok(Caps::empty()),
            _ => {}
        }

        let mut caps = Caps::empty();
        for part in split_top_level(s, ';')? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            caps.append(part.parse()?);
        }
        Ok(caps)
    }
}

impl FromStr for Structure {
    type Err = CapsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = split_top_level(s, ',')?.into_iter();
        let name = parts
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CapsParseError::new(s, "missing media type"))?;

        if name.contains('=') {
            return Err(CapsParseError::new(s, "missing media type"));
        }

        let mut structure = Structure::new(name);
        for field in parts {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| CapsParseError::new(field, "field without '='"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CapsParseError::new(field, "empty field name"));
            }
            structure.set(key, parse_value(value)?);
        }
        Ok(structure)
    }
}

fn parse_value(raw: &str) -> Result<Value, CapsParseError> {
    let s = strip_type_annotation(raw.trim());
    if s.is_empty() {
        return Err(CapsParseError::new(raw, "empty value"));
    }

    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let bounds = split_top_level(inner, ',')?;
        if bounds.len() != 2 {
            return Err(CapsParseError::new(raw, "range needs exactly two bounds"));
        }
        return match (parse_value(bounds[0])?, parse_value(bounds[1])?) {
            (Value::Int(min), Value::Int(max)) => Ok(Value::int_range(min, max)),
            (Value::Fraction(min), Value::Fraction(max)) => Ok(Value::fraction_range(min, max)),
            _ => Err(CapsParseError::new(raw, "range bounds must be both int or both fraction")),
        };
    }

    if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        let items = split_top_level(inner, ',')?
            .into_iter()
            .map(parse_value)
            .collect::<Result<Vec<_>, _>>()?;
        return match items.len() {
            0 => Err(CapsParseError::new(raw, "empty list")),
            1 => Ok(items.into_iter().next().unwrap_or(Value::List(Vec::new()))),
            _ => Ok(Value::List(items)),
        };
    }

    if let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Ok(Value::Str(inner.replace("\\\"", "\"")));
    }

    match s {
        "true" | "TRUE" => return Ok(Value::Bool(true)),
        "false" | "FALSE" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Ok(v) = s.parse::<i64>() {
        return Ok(Value::Int(v));
    }

    if let Some((n, d)) = s.split_once('/') {
        if let (Ok(n), Ok(d)) = (n.trim().parse::<i32>(), d.trim().parse::<i32>()) {
            return Ok(Value::Fraction(Fraction::new(n, d)));
        }
    }

    Ok(Value::Str(s.to_string()))
}

fn strip_type_annotation(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix('(') {
        if let Some(end) = rest.find(')') {
            return rest[end + 1..].trim_start();
        }
    }
    s
}

/// Split on `sep` outside of brackets, braces and quotes
fn split_top_level(s: &str, sep: char) -> Result<Vec<&str>, CapsParseError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut prev = '\0';
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '"' if prev != '\\' => in_quotes = !in_quotes,
            '[' | '{' if !in_quotes => depth += 1,
            ']' | '}' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return Err(CapsParseError::new(s, "unbalanced brackets"));
                }
            }
            c if c == sep && depth == 0 && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
        prev = c;
    }

    if depth != 0 {
        return Err(CapsParseError::new(s, "unbalanced brackets"));
    }
    if in_quotes {
        return Err(CapsParseError::new(s, "unterminated string"));
    }

    parts.push(&s[start..]);
    Ok(parts)
}
