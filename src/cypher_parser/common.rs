use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    error::{Error, ErrorKind, ParseError},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult, Parser,
};

use super::ast::Literal;

pub fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Case-insensitive keyword that must not run into a following identifier
/// character (`AS` must not match the start of `ASC`).
pub fn keyword<'a>(kw: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    terminated(tag_no_case(kw), not(peek(satisfy(is_word_char))))
}

fn bare_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_word_char),
    ))
    .parse(input)
}

/// Plain or backtick-quoted identifier.
pub fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(char('`'), take_while1(|c: char| c != '`'), char('`')),
            |s: &str| s.to_string(),
        ),
        map(bare_identifier, |s: &str| s.to_string()),
    ))
    .parse(input)
}

/// Parse a numeric literal (integer or float)
/// Matches: 123, -123, 3.14, -3.14, .5, -.5, 1e6
pub fn numeric_literal(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('-')),
        alt((
            recognize((digit1, char('.'), digit1)),
            recognize(pair(char('.'), digit1)),
            digit1,
        )),
        opt((alt((char('e'), char('E'))), opt(alt((char('+'), char('-')))), digit1)),
        not(peek(satisfy(is_word_char))),
    ))
    .parse(input)
}

/// Single- or double-quoted string with backslash escapes; yields the unescaped content.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('\'' | '"'))) => c,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };

    let mut content = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            content.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[idx + c.len_utf8()..], content));
        } else {
            content.push(c);
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

pub fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(string_literal, Literal::String),
        map(numeric_literal, |n: &str| Literal::Number(n.to_string())),
        value(Literal::Boolean(true), keyword("true")),
        value(Literal::Boolean(false), keyword("false")),
        value(Literal::Null, keyword("null")),
        map(preceded(char('$'), identifier), Literal::Parameter),
    ))
    .parse(input)
}

/// `[lit, lit, ...]`
pub fn list_literal(input: &str) -> IResult<&str, Vec<Literal>> {
    delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), ws(literal)),
        ws(char(']')),
    )
    .parse(input)
}

/// `{key: lit, ...}` as written inside node and relationship patterns.
pub fn property_map(input: &str) -> IResult<&str, Vec<(String, Literal)>> {
    delimited(
        ws(char('{')),
        separated_list0(
            ws(char(',')),
            separated_pair(ws(identifier), char(':'), ws(literal)),
        ),
        ws(char('}')),
    )
    .parse(input)
}
