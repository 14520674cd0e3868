use winnow::combinator::{alt, eof, opt};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::stream::LocatingSlice;
use winnow::token::{any, one_of, take_while};

use super::token::{Token, TokenKind};

type Input<'i> = LocatingSlice<&'i str>;

/// Tokenize an expression string.
///
/// The stream always terminates with an [`TokenKind::Eof`] token, or an
/// [`TokenKind::Error`] token whose literal describes the malformed input
/// (unterminated string, stray `&`, `|`, or `=`, unknown character).
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut stream = LocatingSlice::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = next_token(&mut stream).unwrap_or(Token {
            kind: TokenKind::Error,
            literal: "malformed input".to_owned(),
            pos: input.len(),
        });
        let stop = matches!(token.kind, TokenKind::Eof | TokenKind::Error);
        tokens.push(token);
        if stop {
            return tokens;
        }
    }
}

fn next_token(input: &mut Input<'_>) -> ModalResult<Token> {
    ws(input)?;
    let ((kind, literal), span) = alt((
        eof.map(|_| (TokenKind::Eof, String::new())),
        number,
        string_literal,
        word,
        operator,
        any.map(|c: char| (TokenKind::Error, c.to_string())),
    ))
    .with_span()
    .parse_next(input)?;

    Ok(Token {
        kind,
        literal,
        pos: span.start,
    })
}

fn ws(input: &mut Input<'_>) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

/// Digits with at most one dot.
fn number(input: &mut Input<'_>) -> ModalResult<(TokenKind, String)> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(0.., |c: char| c.is_ascii_digit()))),
    )
        .take()
        .map(|s: &str| (TokenKind::Number, s.to_owned()))
        .parse_next(input)
}

/// A `"` or `'` delimited string. The body is taken verbatim, no escapes.
fn string_literal(input: &mut Input<'_>) -> ModalResult<(TokenKind, String)> {
    let quote = alt(('"', '\'')).parse_next(input)?;
    let body = take_while(0.., move |c: char| c != quote).parse_next(input)?;
    match opt(quote).parse_next(input)? {
        Some(_) => Ok((TokenKind::String, body.to_owned())),
        None => Ok((TokenKind::Error, "unterminated string".to_owned())),
    }
}

/// An identifier, with `true`/`false` reclassified as boolean literals.
fn word(input: &mut Input<'_>) -> ModalResult<(TokenKind, String)> {
    let ident = (
        take_while(1.., |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;

    let kind = match ident {
        "true" | "false" => TokenKind::Bool,
        _ => TokenKind::Ident,
    };
    Ok((kind, ident.to_owned()))
}

fn operator(input: &mut Input<'_>) -> ModalResult<(TokenKind, String)> {
    let double = opt(alt((
        "&&".value((TokenKind::And, "&&")),
        "||".value((TokenKind::Or, "||")),
        "==".value((TokenKind::Eq, "==")),
        "!=".value((TokenKind::Ne, "!=")),
        "<=".value((TokenKind::Le, "<=")),
        ">=".value((TokenKind::Ge, ">=")),
    )))
    .parse_next(input)?;
    if let Some((kind, literal)) = double {
        return Ok((kind, literal.to_owned()));
    }

    let ch = one_of([
        '+', '-', '*', '/', '%', '<', '>', '!', '(', ')', ',', '&', '|', '=',
    ])
    .parse_next(input)?;
    let (kind, literal) = match ch {
        '+' => (TokenKind::Plus, "+".to_owned()),
        '-' => (TokenKind::Minus, "-".to_owned()),
        '*' => (TokenKind::Star, "*".to_owned()),
        '/' => (TokenKind::Slash, "/".to_owned()),
        '%' => (TokenKind::Percent, "%".to_owned()),
        '<' => (TokenKind::Lt, "<".to_owned()),
        '>' => (TokenKind::Gt, ">".to_owned()),
        '!' => (TokenKind::Not, "!".to_owned()),
        '(' => (TokenKind::LParen, "(".to_owned()),
        ')' => (TokenKind::RParen, ")".to_owned()),
        ',' => (TokenKind::Comma, ",".to_owned()),
        // Half of a two-character operator on its own.
        other => (TokenKind::Error, format!("unexpected '{other}'")),
    };
    Ok((kind, literal))
}
