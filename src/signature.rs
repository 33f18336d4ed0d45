// ABOUTME: Signature type language: parser, validator and hidden-field firewall
// Signatures gate the input context and the final return value of a mission.

use crate::error::LispError;
use crate::value::{flex_lookup, Value};
use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0},
    combinator::{opt, value},
    IResult, Parser,
};

/// A type in the signature language.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
    Any,
    Keyword,
    MapAny,
    /// `[T]` — ordered sequence
    Seq(Box<Type>),
    /// `#{T}` — set
    Set(Box<Type>),
    /// `{name T, …}`; `open` when declared with a trailing `...`
    Record { fields: Vec<Field>, open: bool },
    /// `T?`
    Optional(Box<Type>),
    /// `(p1 T1, p2 T2) -> R`
    Func {
        params: Vec<(String, Type)>,
        ret: Box<Type>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// `_`-prefixed fields are kept in the structured return but stripped
    /// from LLM-facing serialization.
    pub hidden: bool,
}

/// A full agent/tool signature: named inputs and a return type.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub raw: String,
}

fn ident(input: &str) -> IResult<&str, &str> {
    let end = input
        .char_indices()
        .find(|(i, c)| {
            if *i == 0 {
                !(c.is_alphabetic() || *c == '_')
            } else {
                !(c.is_alphanumeric() || *c == '_' || *c == '-')
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    if end == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Fail,
        )));
    }
    Ok((&input[end..], &input[..end]))
}

fn primitive(input: &str) -> IResult<&str, Type> {
    alt((
        value(Type::Int, tag(":int")),
        value(Type::Float, tag(":float")),
        value(Type::Str, tag(":string")),
        value(Type::Bool, tag(":bool")),
        value(Type::Any, tag(":any")),
        value(Type::Keyword, tag(":keyword")),
        value(Type::MapAny, tag(":map")),
    ))
    .parse(input)
}

fn seq_type(input: &str) -> IResult<&str, Type> {
    let (input, _) = char('[')(input)?;
    let (input, inner) = type_expr(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Type::Seq(Box::new(inner))))
}

fn set_type(input: &str) -> IResult<&str, Type> {
    let (input, _) = tag("#{")(input)?;
    let (input, inner) = type_expr(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, Type::Set(Box::new(inner))))
}

fn record_type(input: &str) -> IResult<&str, Type> {
    let (mut input, _) = char('{')(input)?;
    let mut fields = Vec::new();
    let mut open = false;

    loop {
        let (rest, _) = multispace0(input)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('}')(rest) {
            input = rest;
            break;
        }
        if let Ok((rest, _)) = tag::<_, _, nom::error::Error<_>>("...")(rest) {
            open = true;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = opt(char(',')).parse(rest)?;
            input = rest;
            continue;
        }
        let (rest, name) = ident(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, ty) = type_expr(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, _) = opt(char(',')).parse(rest)?;
        let hidden = name.starts_with('_');
        fields.push(Field {
            name: name.to_string(),
            ty,
            hidden,
        });
        input = rest;
    }
    Ok((input, Type::Record { fields, open }))
}

fn func_type(input: &str) -> IResult<&str, Type> {
    let (input, params) = param_list(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("->")(input)?;
    let (input, ret) = type_expr(input)?;
    Ok((
        input,
        Type::Func {
            params,
            ret: Box::new(ret),
        },
    ))
}

fn param_list(input: &str) -> IResult<&str, Vec<(String, Type)>> {
    let (mut input, _) = char('(')(input)?;
    let mut params = Vec::new();
    loop {
        let (rest, _) = multispace0(input)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(')')(rest) {
            input = rest;
            break;
        }
        let (rest, name) = ident(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, ty) = type_expr(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, _) = opt(char(',')).parse(rest)?;
        params.push((name.to_string(), ty));
        input = rest;
    }
    Ok((input, params))
}

/// A type expression, with postfix `?` for optionality.
fn type_expr(input: &str) -> IResult<&str, Type> {
    let (input, _) = multispace0(input)?;
    let (input, base) = alt((func_type, set_type, record_type, seq_type, primitive)).parse(input)?;
    let (input, q) = opt(char('?')).parse(input)?;
    Ok((
        input,
        if q.is_some() {
            Type::Optional(Box::new(base))
        } else {
            base
        },
    ))
}

/// Parse a single type string (e.g. `"[{id :string, total :float}]"`).
pub fn parse_type(source: &str) -> Result<Type, LispError> {
    match type_expr(source) {
        Ok((rest, ty)) if rest.trim().is_empty() => Ok(ty),
        Ok((rest, _)) => Err(LispError::parse_error(format!(
            "signature: trailing input '{}'",
            rest.trim()
        ))),
        Err(_) => Err(LispError::parse_error(format!(
            "signature: malformed type '{}'",
            source.trim()
        ))),
    }
}

/// Parse a full signature: `(orders [{id :string}], limit :int) -> {count :int}`.
pub fn parse_signature(source: &str) -> Result<Signature, LispError> {
    let parsed = (|input| {
        let (input, _) = multispace0(input)?;
        let (input, params) = param_list(input)?;
        let (input, _) = multispace0(input)?;
        let (input, _) = tag("->")(input)?;
        let (input, ret) = type_expr(input)?;
        Ok::<_, nom::Err<nom::error::Error<&str>>>((input, (params, ret)))
    })(source);

    match parsed {
        Ok((rest, (params, ret))) if rest.trim().is_empty() => Ok(Signature {
            params,
            ret,
            raw: source.trim().to_string(),
        }),
        _ => Err(LispError::parse_error(format!(
            "signature: malformed signature '{}'",
            source.trim()
        ))),
    }
}

fn mismatch(path: &str, expected: &str, actual: &Value, on_input: bool) -> LispError {
    LispError::Validation {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
        on_input,
    }
}

/// Check a value against a type, reporting the path of the first mismatch.
pub fn check(value: &Value, ty: &Type, path: &str, on_input: bool) -> Result<(), LispError> {
    match ty {
        Type::Any => Ok(()),
        Type::Int => match value {
            Value::Int(_) => Ok(()),
            other => Err(mismatch(path, "int", other, on_input)),
        },
        // ints satisfy float positions (numeric-tower-lite)
        Type::Float => match value {
            Value::Float(_) | Value::Int(_) => Ok(()),
            other => Err(mismatch(path, "float", other, on_input)),
        },
        Type::Str => match value {
            Value::String(_) => Ok(()),
            other => Err(mismatch(path, "string", other, on_input)),
        },
        Type::Bool => match value {
            Value::Bool(_) => Ok(()),
            other => Err(mismatch(path, "bool", other, on_input)),
        },
        Type::Keyword => match value {
            Value::Keyword(_) => Ok(()),
            other => Err(mismatch(path, "keyword", other, on_input)),
        },
        Type::MapAny => match value {
            Value::Map(_) => Ok(()),
            other => Err(mismatch(path, "map", other, on_input)),
        },
        Type::Optional(inner) => match value {
            Value::Nil => Ok(()),
            other => check(other, inner, path, on_input),
        },
        Type::Seq(inner) => match value {
            Value::Vector(items) => {
                for (i, item) in items.iter().enumerate() {
                    check(item, inner, &format!("{}[{}]", path, i), on_input)?;
                }
                Ok(())
            }
            other => Err(mismatch(path, "sequence", other, on_input)),
        },
        Type::Set(inner) => match value {
            Value::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    check(item, inner, &format!("{}[{}]", path, i), on_input)?;
                }
                Ok(())
            }
            other => Err(mismatch(path, "set", other, on_input)),
        },
        Type::Record { fields, open } => match value {
            Value::Map(map) => {
                for field in fields {
                    let key = Value::Keyword(field.name.clone());
                    let sub_path = format!("{}.{}", path, field.name);
                    match flex_lookup(map, &key) {
                        Some(v) => check(v, &field.ty, &sub_path, on_input)?,
                        None => {
                            if !matches!(field.ty, Type::Optional(_)) {
                                return Err(LispError::Validation {
                                    path: sub_path,
                                    expected: "required field".to_string(),
                                    actual: "missing".to_string(),
                                    on_input,
                                });
                            }
                        }
                    }
                }
                if !open {
                    for key in map.keys() {
                        let name = match key {
                            Value::Keyword(k) | Value::String(k) => k.clone(),
                            other => other.print_string(),
                        };
                        if !fields.iter().any(|f| f.name == name) {
                            return Err(LispError::Validation {
                                path: format!("{}.{}", path, name),
                                expected: "no extra fields".to_string(),
                                actual: "unexpected field".to_string(),
                                on_input,
                            });
                        }
                    }
                }
                Ok(())
            }
            other => Err(mismatch(path, "record", other, on_input)),
        },
        Type::Func { .. } => match value {
            Value::Closure(_) | Value::Builtin(_) | Value::Var(_) => Ok(()),
            other => Err(mismatch(path, "function", other, on_input)),
        },
    }
}

impl Signature {
    /// Validate the input context against the parameter list. Fatal on
    /// mismatch (the mission cannot start from bad data).
    pub fn validate_input(&self, ctx: &IndexMap<String, Value>) -> Result<(), LispError> {
        for (name, ty) in &self.params {
            match ctx.get(name) {
                Some(v) => check(v, ty, name, true)?,
                None => {
                    if !matches!(ty, Type::Optional(_)) {
                        return Err(LispError::Validation {
                            path: name.clone(),
                            expected: "required input".to_string(),
                            actual: "missing".to_string(),
                            on_input: true,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate the final return value.
    pub fn validate_return(&self, value: &Value) -> Result<(), LispError> {
        check(value, &self.ret, "return", false)
    }

    /// Strip `_`-prefixed record fields before the value reaches the LLM.
    pub fn firewall(&self, value: &Value) -> Value {
        strip_hidden(value, &self.ret)
    }
}

/// Remove hidden record fields, recursively, guided by the type.
pub fn strip_hidden(value: &Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Map(map), Type::Record { fields, .. }) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                let name = match k {
                    Value::Keyword(n) | Value::String(n) => n.clone(),
                    other => other.print_string(),
                };
                if let Some(field) = fields.iter().find(|f| f.name == name) {
                    if field.hidden {
                        continue;
                    }
                    out.insert(k.clone(), strip_hidden(v, &field.ty));
                } else {
                    out.insert(k.clone(), v.clone());
                }
            }
            Value::Map(out)
        }
        (Value::Vector(items), Type::Seq(inner)) => {
            Value::Vector(items.iter().map(|v| strip_hidden(v, inner)).collect())
        }
        (v, Type::Optional(inner)) => strip_hidden(v, inner),
        (v, _) => v.clone(),
    }
}

/// Render a type back to its source notation, used by the tool inventory.
pub fn render_type(ty: &Type) -> String {
    match ty {
        Type::Int => ":int".into(),
        Type::Float => ":float".into(),
        Type::Str => ":string".into(),
        Type::Bool => ":bool".into(),
        Type::Any => ":any".into(),
        Type::Keyword => ":keyword".into(),
        Type::MapAny => ":map".into(),
        Type::Seq(inner) => format!("[{}]", render_type(inner)),
        Type::Set(inner) => format!("#{{{}}}", render_type(inner)),
        Type::Optional(inner) => format!("{}?", render_type(inner)),
        Type::Record { fields, open } => {
            let mut parts: Vec<String> = fields
                .iter()
                .map(|f| format!("{} {}", f.name, render_type(&f.ty)))
                .collect();
            if *open {
                parts.push("...".into());
            }
            format!("{{{}}}", parts.join(", "))
        }
        Type::Func { params, ret } => {
            let params: Vec<String> = params
                .iter()
                .map(|(n, t)| format!("{} {}", n, render_type(t)))
                .collect();
            format!("({}) -> {}", params.join(", "), render_type(ret))
        }
    }
}
