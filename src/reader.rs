//! The reader: source text to s-expression trees.
//!
//! Reading happens in two stages. The tokenizer turns the character
//! stream into `(`, `)`, `'`, string-literal and symbol tokens, decoding
//! string escapes and discarding `;` line comments. The parser then
//! consumes the token sequence left-to-right into nested [`Value::Seq`]
//! trees, desugaring `'x` into `(quote x)` and classifying atoms by
//! attempting a decimal parse.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace1},
    combinator::{map, opt, value},
    multi::many0,
    sequence::preceded,
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::Value;

/// Characters that terminate a symbol token besides whitespace.
const DELIMITERS: &str = "()';\"";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    QuoteMark,
    Str(String),
    Atom(String),
}

/// Read every top-level form in `source`.
pub fn read_all(source: &str) -> Result<Vec<Value>, Error> {
    let tokens = tokenize(source)?;
    parse_tokens(&tokens)
}

/// Skip whitespace and `;` line comments.
fn ignored(input: &str) -> &str {
    let result: IResult<&str, ()> = value(
        (),
        many0(alt((
            value((), multispace1),
            value((), preceded(char(';'), opt(is_not("\n")))),
        ))),
    )
    .parse(input);
    match result {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

/// A string literal including the surrounding double quotes, with
/// `\n`, `\t`, `\\` and `\"` decoded inline. Unknown escapes keep the
/// escaped character; reaching end of input is a failure the tokenizer
/// reports as an unterminated literal.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut decoded = String::new();
    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), decoded)),
            Some('\\') => {
                match chars.next() {
                    Some('n') => decoded.push('\n'),
                    Some('t') => decoded.push('\t'),
                    Some('\\') => decoded.push('\\'),
                    Some('"') => decoded.push('"'),
                    Some(other) => decoded.push(other),
                    None => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            nom::error::ErrorKind::Char,
                        )));
                    }
                }
                remaining = chars.as_str();
            }
            Some(ch) => {
                decoded.push(ch);
                remaining = chars.as_str();
            }
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

/// A symbol token: a maximal run of characters that are neither
/// whitespace nor delimiters.
fn symbol_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !DELIMITERS.contains(c)).parse(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        value(Token::QuoteMark, char('\'')),
        map(string_literal, Token::Str),
        map(symbol_token, |s: &str| Token::Atom(s.to_owned())),
    ))
    .parse(input)
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut rest = ignored(source);
    while !rest.is_empty() {
        match token(rest) {
            Ok((remaining, tok)) => {
                tokens.push(tok);
                rest = ignored(remaining);
            }
            Err(_) => {
                if rest.starts_with('"') {
                    return Err(Error::ParseError("unterminated string literal".to_owned()));
                }
                let snippet: String = rest.chars().take(10).collect();
                return Err(Error::ParseError(format!("invalid token near '{snippet}'")));
            }
        }
    }
    Ok(tokens)
}

/// Parse the token sequence into an ordered sequence of top-level forms.
pub(crate) fn parse_tokens(tokens: &[Token]) -> Result<Vec<Value>, Error> {
    let mut forms = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let (form, next) = read_form(tokens, pos, 0)?;
        forms.push(form);
        pos = next;
    }
    Ok(forms)
}

fn read_form(tokens: &[Token], pos: usize, depth: usize) -> Result<(Value, usize), Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::ParseError(format!(
            "expression nested deeper than {MAX_PARSE_DEPTH} levels"
        )));
    }
    match tokens.get(pos) {
        None => Err(Error::ParseError("unexpected end of input".to_owned())),
        Some(Token::LParen) => {
            let mut items = Vec::new();
            let mut pos = pos + 1;
            loop {
                match tokens.get(pos) {
                    None => return Err(Error::ParseError("missing ')'".to_owned())),
                    Some(Token::RParen) => return Ok((Value::Seq(items), pos + 1)),
                    Some(_) => {
                        let (child, next) = read_form(tokens, pos, depth + 1)?;
                        items.push(child);
                        pos = next;
                    }
                }
            }
        }
        Some(Token::RParen) => Err(Error::ParseError("unexpected ')'".to_owned())),
        Some(Token::QuoteMark) => {
            let (quoted, next) = read_form(tokens, pos + 1, depth + 1)?;
            let form = Value::Seq(vec![Value::Symbol("quote".to_owned()), quoted]);
            Ok((form, next))
        }
        Some(Token::Str(s)) => Ok((Value::Str(s.clone()), pos + 1)),
        Some(Token::Atom(atom)) => Ok((atom_value(atom), pos + 1)),
    }
}

/// Classify a symbol token: whether it "is a number" is decided by
/// attempting a decimal parse.
fn atom_value(token: &str) -> Value {
    match token {
        "#t" => Value::Bool(true),
        "#f" => Value::Bool(false),
        _ => match token.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Symbol(token.to_owned()),
        },
    }
}
