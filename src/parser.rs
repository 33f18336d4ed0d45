// ABOUTME: Reader for PTC-Lisp source text using nom combinators
// Produces the raw form tree consumed by the analyzer.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::value,
    multi::many0,
    IResult, Parser,
};

use crate::error::LispError;

/// Raw syntax tree produced by the reader. Lists and vectors are kept
/// distinct here; the analyzer decides what each becomes.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Keyword(String),
    Symbol(String),
    List(Vec<Form>),
    Vector(Vec<Form>),
    Map(Vec<(Form, Form)>),
    Set(Vec<Form>),
    Quote(Box<Form>),
}

/// Pre-tokenization cleanup for LLM-emitted source: strip BOM and zero-width
/// characters, normalize smart quotes to ASCII.
pub fn sanitize(source: &str) -> String {
    source
        .chars()
        .filter_map(|c| match c {
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' => None,
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            other => Some(other),
        })
        .collect()
}

/// Commas count as whitespace, per Clojure.
fn is_space(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn parse_comment(input: &str) -> IResult<&str, ()> {
    let (input, _) = char(';')(input)?;
    let end = input.find('\n').unwrap_or(input.len());
    Ok((&input[end..], ()))
}

/// Skip whitespace, commas and line comments.
fn ws(input: &str) -> IResult<&str, ()> {
    many0(alt((
        value((), nom::bytes::complete::take_while1(is_space)),
        parse_comment,
    )))
    .map(|_| ())
    .parse(input)
}

/// Skip whitespace plus any `#_`-discarded forms. Each discard swallows the
/// next *read* form, so `#_#_a b` drops both `a` and `b`. A discard with no
/// readable form after it fails.
fn skip_ignored(input: &str) -> IResult<&str, ()> {
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((after, _)) = tag::<_, _, nom::error::Error<&str>>("#_")(rest) {
            let (after, _discarded) = parse_form(after)?;
            input = after;
            continue;
        }
        return Ok((rest, ()));
    }
}

fn is_symbol_start(c: char) -> bool {
    c.is_alphabetic() || "+-*/_!?<>=%&$.".contains(c)
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || "+-*/_!?<>=%&$.'".contains(c)
}

fn fail_at(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
}

/// Parse a number: integer, decimal float, or scientific notation.
/// The token must end at a delimiter; `12abc` is malformed.
fn parse_number(input: &str) -> IResult<&str, Form> {
    let mut end = 0;
    let bytes = input.as_bytes();
    let mut is_float = false;

    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return Err(fail_at(input));
    }
    if end < bytes.len() && bytes[end] == b'.' {
        is_float = true;
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'-' || bytes[exp] == b'+') {
            exp += 1;
        }
        let exp_start = exp;
        while exp < bytes.len() && bytes[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > exp_start {
            is_float = true;
            end = exp;
        }
    }

    // Must not run into a symbol tail ("12abc" is a token error)
    if let Some(next) = input[end..].chars().next() {
        if next.is_alphanumeric() || next == '.' {
            return Err(fail_at(input));
        }
    }

    let text = &input[..end];
    let rest = &input[end..];
    if is_float {
        match text.parse::<f64>() {
            Ok(f) => Ok((rest, Form::Float(f))),
            Err(_) => Err(fail_at(input)),
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Ok((rest, Form::Int(i))),
            Err(_) => Err(fail_at(input)),
        }
    }
}

/// Parse a double-quoted string with \n \t \r \" \\ escapes.
fn parse_string(input: &str) -> IResult<&str, Form> {
    let (mut rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();

    loop {
        match chars.next() {
            Some((i, '"')) => {
                rest = &rest[i + 1..];
                return Ok((rest, Form::String(out)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(fail_at(input)),
            },
            Some((_, c)) => out.push(c),
            None => return Err(fail_at(input)),
        }
    }
}

/// Parse a keyword: `:name` or `:ns/name`.
fn parse_keyword(input: &str) -> IResult<&str, Form> {
    let (rest, _) = char(':')(input)?;
    let end = rest
        .char_indices()
        .find(|(_, c)| !(is_symbol_char(*c) || *c == '/'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if end == 0 {
        return Err(fail_at(input));
    }
    Ok((&rest[end..], Form::Keyword(rest[..end].to_string())))
}

/// Parse a symbol, possibly namespace-qualified (`ctx/orders`).
/// `nil`, `true` and `false` read as literals.
fn parse_symbol(input: &str) -> IResult<&str, Form> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, c)) if is_symbol_start(c) => {}
        _ => return Err(fail_at(input)),
    }
    let end = input
        .char_indices()
        .find(|(i, c)| *i > 0 && !(is_symbol_char(*c) || *c == '/'))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    let name = &input[..end];
    let rest = &input[end..];
    let form = match name {
        "nil" => Form::Nil,
        "true" => Form::Bool(true),
        "false" => Form::Bool(false),
        _ => Form::Symbol(name.to_string()),
    };
    Ok((rest, form))
}

/// Parse forms until the closing delimiter.
fn parse_seq(input: &str, close: char) -> IResult<&str, Vec<Form>> {
    let mut items = Vec::new();
    let mut remaining = input;
    loop {
        let (rest, _) = skip_ignored(remaining)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(close)(rest) {
            return Ok((rest, items));
        }
        if rest.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::Fail,
            )));
        }
        let (rest, form) = parse_form(rest)?;
        items.push(form);
        remaining = rest;
    }
}

fn parse_list(input: &str) -> IResult<&str, Form> {
    let (input, _) = char('(')(input)?;
    let (input, items) = parse_seq(input, ')')?;
    Ok((input, Form::List(items)))
}

fn parse_vector(input: &str) -> IResult<&str, Form> {
    let (input, _) = char('[')(input)?;
    let (input, items) = parse_seq(input, ']')?;
    Ok((input, Form::Vector(items)))
}

fn parse_set(input: &str) -> IResult<&str, Form> {
    let (input, _) = tag("#{")(input)?;
    let (input, items) = parse_seq(input, '}')?;
    Ok((input, Form::Set(items)))
}

fn parse_map(input: &str) -> IResult<&str, Form> {
    let (input, _) = char('{')(input)?;
    let (input, items) = parse_seq(input, '}')?;
    if items.len() % 2 != 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Fail,
        )));
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        pairs.push((k, v));
    }
    Ok((input, Form::Map(pairs)))
}

fn parse_quote(input: &str) -> IResult<&str, Form> {
    let (input, _) = char('\'')(input)?;
    let (input, form) = parse_form(input)?;
    Ok((input, Form::Quote(Box::new(form))))
}

/// Main form parser. Leading reader discards are consumed by `skip_ignored`.
fn parse_form(input: &str) -> IResult<&str, Form> {
    let (input, _) = skip_ignored(input)?;
    alt((
        parse_quote,
        parse_set,
        parse_map,
        parse_vector,
        parse_list,
        parse_string,
        parse_keyword,
        parse_number,
        parse_symbol,
    ))
    .parse(input)
}

/// Public entry point: sanitize and read a whole program (zero or more
/// top-level forms).
pub fn parse(source: &str) -> Result<Vec<Form>, LispError> {
    let clean = sanitize(source);
    let mut forms = Vec::new();
    let mut remaining: &str = &clean;

    loop {
        let (rest, _) = skip_ignored(remaining).map_err(|_| {
            LispError::parse_error("reader discard #_ with no readable form after it")
        })?;
        if rest.is_empty() {
            return Ok(forms);
        }
        match parse_form(rest) {
            Ok((next, form)) => {
                forms.push(form);
                remaining = next;
            }
            Err(_) => {
                let snippet: String = rest.chars().take(40).collect();
                return Err(LispError::parse_error(format!(
                    "malformed form near '{}'",
                    snippet
                )));
            }
        }
    }
}

/// Parse exactly one form; trailing forms are an error. Used by tests and
/// the quote reader.
pub fn parse_one(source: &str) -> Result<Form, LispError> {
    let forms = parse(source)?;
    match forms.len() {
        0 => Err(LispError::parse_error("empty input")),
        1 => Ok(forms.into_iter().next().unwrap()),
        n => Err(LispError::parse_error(format!(
            "expected a single form, got {}",
            n
        ))),
    }
}
