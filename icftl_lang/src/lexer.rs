//! Tokens of the textual specification format.

use logos::Logos;
use std::fmt::Display;

/// Specification tokens
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"#([^0-9\n][^\n]*)?")]
pub enum Token<'a> {
    #[token("spec")]
    Spec,

    #[token("forall")]
    Forall,

    #[token("in")]
    In,

    #[token("until")]
    Until,

    #[token("check")]
    Check,

    #[token("not")]
    Not,

    #[token("and")]
    And,

    #[token("or")]
    Or,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(".")]
    Dot,

    /// Comparison operator
    #[regex(r"==|!=|<=|>=|<|>", |lex| lex.slice())]
    Cmp(&'a str),

    /// Integer literal
    #[regex(r"-?[0-9]+", |lex| lex.slice())]
    Int(&'a str),

    /// Floating-point literal
    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice())]
    Float(&'a str),

    /// String literal, quotes included
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    Str(&'a str),

    /// Reference literal (`#42`)
    #[regex(r"#[0-9]+", |lex| &lex.slice()[1..])]
    Ref(&'a str),

    /// Identifier, possibly hyphenated (`per-context`, `changes-to`)
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice())]
    Ident(&'a str),
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Spec => write!(f, "spec"),
            Token::Forall => write!(f, "forall"),
            Token::In => write!(f, "in"),
            Token::Until => write!(f, "until"),
            Token::Check => write!(f, "check"),
            Token::Not => write!(f, "not"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Ref(s) => write!(f, "#{s}"),
            Token::Cmp(s) | Token::Int(s) | Token::Float(s) | Token::Str(s) | Token::Ident(s) => {
                write!(f, "{s}")
            }
        }
    }
}
