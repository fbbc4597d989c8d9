//! Parsing of list literals returned by the models.
//!
//! Models are asked for `["a", "b"]`-style output but often wrap it in prose or
//! use single quotes. Only flat lists of quoted strings, numbers, booleans and
//! `None`/`null` are accepted; anything else is a [`ParseError`].

use std::iter::Peekable;
use std::str::Chars;

use crate::table::row::is_working_field;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no bracketed list in model output")]
    NoList,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected character '{0}'")]
    Unexpected(char),

    #[error("nested lists are not supported")]
    NestedList,

    #[error("'{0}' is not a literal")]
    BareWord(String),

    #[error("expected exactly 2 elements, got {0}")]
    WrongArity(usize),

    #[error("fact type must be a non-empty string")]
    InvalidType,

    #[error("fact value is empty")]
    EmptyValue,

    #[error("fact type '{0}' is reserved")]
    ReservedType(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn into_text(self) -> Option<String> {
        match self {
            Literal::Str(s) | Literal::Number(s) => Some(s),
            Literal::Bool(true) => Some("True".into()),
            Literal::Bool(false) => Some("False".into()),
            Literal::Null => None,
        }
    }
}

/// A `(type, value)` pair distilled from search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub kind: String,
    pub value: String,
}

pub const POPULATION: &str = "Population";

/// Slice from the first `[` to the last `]`, inclusive.
fn bracketed(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (start < end).then(|| &text[start..=end])
}

/// Search queries from a query-generation response.
///
/// Non-string scalars are kept in their text form; `None` and blank entries are dropped.
pub fn parse_query_list(text: &str) -> Result<Vec<String>, ParseError> {
    let list = bracketed(text).ok_or(ParseError::NoList)?;
    Ok(parse_list_literal(list)?
        .into_iter()
        .filter_map(Literal::into_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// A `[type, value]` pair from a fact-extraction response.
///
/// Population values always have their thousands separators removed, as do
/// values of any type that are plain comma-grouped numbers.
pub fn parse_fact(text: &str) -> Result<Fact, ParseError> {
    let list = bracketed(text).ok_or(ParseError::NoList)?;
    let items = parse_list_literal(list)?;
    let [kind, value]: [Literal; 2] = items
        .try_into()
        .map_err(|items: Vec<Literal>| ParseError::WrongArity(items.len()))?;

    let kind = match kind {
        Literal::Str(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(ParseError::InvalidType),
    };
    if is_working_field(&kind) {
        return Err(ParseError::ReservedType(kind));
    }
    let value = value
        .into_text()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::EmptyValue)?;

    if kind.eq_ignore_ascii_case(POPULATION) {
        return Ok(Fact {
            kind: POPULATION.to_string(),
            value: value.replace(',', ""),
        });
    }

    let value = if is_grouped_number(&value) {
        value.replace(',', "")
    } else {
        value
    };
    Ok(Fact { kind, value })
}

/// `1,234` or `12,345,678.9`: digits grouped in threes by commas.
fn is_grouped_number(s: &str) -> bool {
    let int_part = s.split_once('.').map_or(s, |(int, frac)| {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            ""
        } else {
            int
        }
    });
    let mut groups = int_part.split(',');
    let Some(head) = groups.next() else {
        return false;
    };
    let mut saw_group = false;
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        saw_group = true;
    }
    saw_group && (1..=3).contains(&head.len()) && head.bytes().all(|b| b.is_ascii_digit())
}

fn parse_list_literal(src: &str) -> Result<Vec<Literal>, ParseError> {
    let inner = src
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or(ParseError::NoList)?;

    let mut chars = inner.chars().peekable();
    let mut items = Vec::new();
    loop {
        skip_whitespace(&mut chars);
        match chars.peek().copied() {
            None => break,
            Some(quote @ ('"' | '\'')) => {
                chars.next();
                items.push(Literal::Str(read_quoted(&mut chars, quote)?));
            }
            Some('[' | ']') => return Err(ParseError::NestedList),
            Some(',') => return Err(ParseError::Unexpected(',')),
            Some(_) => items.push(read_bare(&mut chars)?),
        }
        skip_whitespace(&mut chars);
        match chars.next() {
            None | Some(',') => {}
            Some(c) => return Err(ParseError::Unexpected(c)),
        }
    }
    Ok(items)
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, ParseError> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => return Err(ParseError::UnterminatedString),
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(ParseError::UnterminatedString)
}

fn read_bare(chars: &mut Peekable<Chars<'_>>) -> Result<Literal, ParseError> {
    let mut word = String::new();
    while let Some(c) = chars.next_if(|&c| c != ',') {
        if matches!(c, '[' | ']') {
            return Err(ParseError::NestedList);
        }
        word.push(c);
    }
    let word = word.trim();
    match word {
        "None" | "null" => Ok(Literal::Null),
        "True" | "true" => Ok(Literal::Bool(true)),
        "False" | "false" => Ok(Literal::Bool(false)),
        w if w.parse::<f64>().is_ok() => Ok(Literal::Number(w.to_string())),
        w => Err(ParseError::BareWord(w.to_string())),
    }
}
