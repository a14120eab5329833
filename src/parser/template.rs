//! Text template decoder for line-oriented device replies.
//!
//! A template interleaves literal delimiters with typed placeholders:
//! `{i}` (integer), `{f}` (float), `{s}` (string). `{{` and `}}` escape a
//! single brace. `parse("Pressure: {f} hPa", "Pressure: 1007.32 hPa")`
//! yields `[Float(1007.32)]`. An empty trailing delimiter consumes the
//! remainder of the response.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCode {
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unbalanced brace in template at character {0}")]
    UnbalancedBrace(usize),
    #[error("unknown placeholder type '{{{0}}}'")]
    UnknownType(String),
    #[error("delimiter {0:?} not found in response")]
    DelimiterMismatch(String),
    #[error("cannot convert {value:?} to {kind}")]
    Conversion { value: String, kind: &'static str },
}

/// Decode `response` against `template`, returning one value per placeholder.
///
/// Total: ill-formed templates and non-matching responses return an error,
/// they never loop or panic.
pub fn parse(template: &str, response: &str) -> Result<Vec<Value>, TemplateError> {
    let (delimiters, codes) = compile(template)?;

    let mut rest = response;
    let mut values = Vec::with_capacity(codes.len());
    for (index, code) in codes.iter().enumerate() {
        let before = &delimiters[index];
        let after = &delimiters[index + 1];

        let Some(tail) = rest.strip_prefix(before.as_str()) else {
            return Err(TemplateError::DelimiterMismatch(before.clone()));
        };

        let end = if after.is_empty() && index == codes.len() - 1 {
            tail.len()
        } else {
            tail.find(after.as_str())
                .ok_or_else(|| TemplateError::DelimiterMismatch(after.clone()))?
        };

        values.push(convert(&tail[..end], *code)?);
        rest = &tail[end..];
    }

    Ok(values)
}

/// Split a template into N+1 literal delimiters and N placeholder types.
fn compile(template: &str) -> Result<(Vec<String>, Vec<TypeCode>), TemplateError> {
    let chars: Vec<char> = template.chars().collect();
    let mut delimiters = Vec::new();
    let mut codes = Vec::new();
    let mut literal = String::new();

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| i + 1 + offset)
                    .ok_or(TemplateError::UnbalancedBrace(i))?;
                let spec: String = chars[i + 1..close].iter().collect();
                let code = match spec.as_str() {
                    "i" => TypeCode::Int,
                    "f" => TypeCode::Float,
                    "s" => TypeCode::Str,
                    _ => return Err(TemplateError::UnknownType(spec)),
                };
                delimiters.push(std::mem::take(&mut literal));
                codes.push(code);
                i = close + 1;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(TemplateError::UnbalancedBrace(i)),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    delimiters.push(literal);

    Ok((delimiters, codes))
}

fn convert(raw: &str, code: TypeCode) -> Result<Value, TemplateError> {
    match code {
        TypeCode::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| TemplateError::Conversion {
                value: raw.to_string(),
                kind: "integer",
            }),
        TypeCode::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| TemplateError::Conversion {
                value: raw.to_string(),
                kind: "float",
            }),
        TypeCode::Str => Ok(Value::Str(raw.to_string())),
    }
}
