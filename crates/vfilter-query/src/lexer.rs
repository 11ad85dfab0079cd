//! VQL lexer using logos
//!
//! Keywords are case-insensitive. Comments come in three flavors (`// ...`,
//! `-- ...`, `/* ... */`) and are skipped. Integer literals may be decimal,
//! hex (`0x1f`), or octal (`070`).

use logos::Logos;
use vfilter_core::{Error, Result};

/// VQL tokens
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"--[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    // Keywords
    #[token("SELECT", ignore(ascii_case))]
    Select,

    #[token("FROM", ignore(ascii_case))]
    From,

    #[token("WHERE", ignore(ascii_case))]
    Where,

    #[token("LET", ignore(ascii_case))]
    Let,

    #[token("AS", ignore(ascii_case))]
    As,

    #[token("AND", ignore(ascii_case))]
    And,

    #[token("OR", ignore(ascii_case))]
    Or,

    #[token("NOT", ignore(ascii_case))]
    Not,

    #[token("IN", ignore(ascii_case))]
    In,

    #[token("GROUP", ignore(ascii_case))]
    Group,

    #[token("ORDER", ignore(ascii_case))]
    Order,

    #[token("BY", ignore(ascii_case))]
    By,

    #[token("ASC", ignore(ascii_case))]
    Asc,

    #[token("DESC", ignore(ascii_case))]
    Desc,

    #[token("LIMIT", ignore(ascii_case))]
    Limit,

    #[token("TRUE", ignore(ascii_case))]
    True,

    #[token("FALSE", ignore(ascii_case))]
    False,

    #[token("NULL", ignore(ascii_case))]
    Null,

    // Operators
    #[token("=~")]
    Match,

    #[token("!=")]
    Ne,

    #[token("<=")]
    Le,

    #[token(">=")]
    Ge,

    #[token("=")]
    Eq,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 3)]
    #[regex(r"0[0-7]+", |lex| i64::from_str_radix(&lex.slice()[1..], 8).ok(), priority = 4)]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok(), priority = 5)]
    Integer(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok(), priority = 6)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok(), priority = 6)]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    String(String),

    // Identifiers; backticks escape names that clash with keywords.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    #[regex(r"`[^`]+`", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    Ident(String),
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// A token plus its byte range in the source.
pub type SpannedToken = (Token, std::ops::Range<usize>);

/// Convert a byte offset to a 1-based (line, column) pair.
pub fn line_col(input: &str, offset: usize) -> (usize, usize) {
    let clamped = offset.min(input.len());
    let mut line = 1;
    let mut col = 1;
    for (i, c) in input.char_indices() {
        if i >= clamped {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Tokenize a VQL input, failing with line/column on the first bad token.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(input);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => {
                let (line, column) = line_col(input, span.start);
                return Err(Error::parse(
                    format!("unexpected character {:?}", &input[span.clone()]),
                    line,
                    column,
                ));
            }
        }
    }
    Ok(tokens)
}
