//! Token-level `nom` parsers for the rule expression language.
//!
//! Every parser here works on the remaining `&str` and never allocates a
//! token stream. The grammar in `parser` combines them directly, and the
//! same token parser is used to classify whatever sits at an error position.

use super::parser::ParseError;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_while, take_while1};
use nom::character::complete::{anychar, char as pchar, digit1, one_of};
use nom::combinator::{map, opt, recognize, value};
use nom::error::ErrorKind;
use nom::multi::fold_many0;
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

/// Keywords that belong to statements or constructs the sandbox never accepts.
/// The parser reports them as forbidden rather than as plain syntax errors.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "lambda", "for", "while", "yield", "await", "async", "import", "from", "def", "class",
    "try", "except", "finally", "raise", "assert", "del", "with", "return", "global",
    "nonlocal", "pass", "break", "continue", "elif", "as",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    // Accepted keywords
    And,
    Or,
    Not,
    In,
    Is,
    If,
    Else,
    True,
    False,
    None,
    /// A keyword from [`RESERVED_KEYWORDS`]
    Reserved(&'static str),
    /// Operator or delimiter, e.g. `+`, `**`, `(`, `<=`
    Op(&'static str),
    /// Assignment forms: `=`, `+=`, `:=`, ...
    Assign(&'static str),
}

// Longest first so that `**` wins over `*`
const OPERATORS: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "~", "&", "|",
    "^", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".",
];

const ASSIGNMENTS: &[&str] = &[
    "**=", "//=", "<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", ":=",
];

/// What went wrong at an error position
#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    /// Nothing acceptable here; names what would have been
    Expected(&'static str),
    /// Malformed literal or unsupported syntax
    Invalid(String),
    Forbidden(&'static str),
    Limit {
        limit: &'static str,
        actual: usize,
        max: usize,
    },
}

/// `nom` error carrying the remaining input at the failure point
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarError<'a> {
    pub input: &'a str,
    pub problem: Problem,
}

pub type PResult<'a, O> = IResult<&'a str, O, GrammarError<'a>>;

impl<'a> GrammarError<'a> {
    pub fn new(input: &'a str, problem: Problem) -> Self {
        Self { input, problem }
    }

    /// Unrecoverable failure at `input`
    pub fn fail<O>(input: &'a str, problem: Problem) -> PResult<'a, O> {
        Err(nom::Err::Failure(Self::new(input, problem)))
    }

    /// Resolve against the full `source`: byte offsets, and forbidden
    /// constructs recognized from the token at the failure point
    pub fn into_parse_error(self, source: &str) -> ParseError {
        let at = self.input.trim_start();
        let offset = source.len().saturating_sub(at.len());
        match self.problem {
            Problem::Invalid(message) => ParseError::Syntax { offset, message },
            Problem::Forbidden(construct) => ParseError::Forbidden {
                offset,
                construct: construct.to_string(),
            },
            Problem::Limit { limit, actual, max } => ParseError::LimitExceeded {
                limit: limit.to_string(),
                actual,
                max,
            },
            Problem::Expected(expected) => unexpected(at, offset, expected),
        }
    }
}

impl<'a> nom::error::ParseError<&'a str> for GrammarError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self::new(input, Problem::Expected("an expression"))
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    // keep whichever branch got further
    fn or(self, other: Self) -> Self {
        if other.input.len() <= self.input.len() {
            other
        } else {
            self
        }
    }
}

/// Turn a `nom` outcome for `source` into a [`ParseError`]
pub fn to_parse_error(err: nom::Err<GrammarError<'_>>, source: &str) -> ParseError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.into_parse_error(source),
        nom::Err::Incomplete(_) => ParseError::Syntax {
            offset: source.len(),
            message: "unexpected end of expression".to_string(),
        },
    }
}

fn unexpected(at: &str, offset: usize, expected: &str) -> ParseError {
    let forbidden = |construct: &str| ParseError::Forbidden {
        offset,
        construct: construct.to_string(),
    };
    let message = match token(at) {
        Ok((_, TokenKind::Reserved("for"))) => return forbidden("comprehension or loop"),
        Ok((_, TokenKind::Reserved(k))) => return forbidden(k),
        Ok((_, TokenKind::If)) => return forbidden("if statement"),
        Ok((_, TokenKind::Assign(":="))) => return forbidden("walrus assignment"),
        Ok((_, TokenKind::Assign("="))) => return forbidden("assignment"),
        Ok((_, TokenKind::Assign(_))) => return forbidden("augmented assignment"),
        Ok((_, kind)) => format!("unexpected {}, expected {}", describe(&kind), expected),
        Err(_) => match at.chars().next() {
            Some(c) => format!("unexpected character '{}'", c),
            None => format!("unexpected end of expression, expected {}", expected),
        },
    };
    ParseError::Syntax { offset, message }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Int(i) => format!("number {}", i),
        TokenKind::Float(f) => format!("number {}", f),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Name(n) => format!("name '{}'", n),
        TokenKind::Op(op) | TokenKind::Assign(op) | TokenKind::Reserved(op) => {
            format!("'{}'", op)
        }
        other => format!("keyword '{}'", format!("{:?}", other).to_lowercase()),
    }
}

/// Any amount of whitespace, including none
pub fn blank<'a>(input: &'a str) -> PResult<'a, &'a str> {
    take_while(char::is_whitespace)(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn identifier<'a>(input: &'a str) -> PResult<'a, &'a str> {
    recognize(pair(take_while1(is_ident_start), take_while(is_ident_continue)))(input)
}

/// An identifier, accepted keyword or reserved keyword
pub fn word<'a>(input: &'a str) -> PResult<'a, TokenKind> {
    map(identifier, |word| match word {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        _ => match RESERVED_KEYWORDS.iter().find(|k| **k == word) {
            Some(k) => TokenKind::Reserved(*k),
            None => TokenKind::Name(word.to_string()),
        },
    })(input)
}

fn digits<'a>(input: &'a str) -> PResult<'a, &'a str> {
    recognize(pair(digit1, take_while(|c: char| c.is_ascii_digit() || c == '_')))(input)
}

fn exponent<'a>(input: &'a str) -> PResult<'a, &'a str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

/// Integer or float literal; `_` separators, `.5` and exponents allowed
pub fn number<'a>(input: &'a str) -> PResult<'a, TokenKind> {
    let (rest, text) = alt((
        recognize(tuple((digits, opt(pair(pchar('.'), opt(digits))), opt(exponent)))),
        recognize(tuple((pchar('.'), digits, opt(exponent)))),
    ))(input)?;
    if rest.starts_with(is_ident_continue) {
        return GrammarError::fail(input, Problem::Invalid("invalid number literal".to_string()));
    }

    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if text.contains(['.', 'e', 'E']) {
        match cleaned.parse::<f64>() {
            Ok(f) => Ok((rest, TokenKind::Float(f))),
            Err(_) => GrammarError::fail(
                input,
                Problem::Invalid(format!("invalid float literal '{}'", cleaned)),
            ),
        }
    } else {
        match cleaned.parse::<i64>() {
            Ok(i) => Ok((rest, TokenKind::Int(i))),
            Err(_) => GrammarError::fail(
                input,
                Problem::Invalid(format!("integer literal too large '{}'", cleaned)),
            ),
        }
    }
}

fn unescape(c: char) -> String {
    match c {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        '0' => "\0".to_string(),
        '\\' | '\'' | '"' => c.to_string(),
        other => format!("\\{}", other),
    }
}

/// Single- or double-quoted string on one line, escapes resolved
pub fn string_literal<'a>(input: &'a str) -> PResult<'a, String> {
    let (body, quote) = one_of("'\"")(input)?;
    let stop = if quote == '\'' { "'\\\n" } else { "\"\\\n" };
    let (rest, text) = fold_many0(
        alt((
            map(is_not(stop), str::to_string),
            preceded(pchar('\\'), map(anychar, unescape)),
        )),
        String::new,
        |mut acc: String, piece: String| {
            acc.push_str(&piece);
            acc
        },
    )(body)?;
    match pchar::<_, GrammarError<'a>>(quote)(rest) {
        Ok((rest, _)) => Ok((rest, text)),
        Err(_) => GrammarError::fail(
            input,
            Problem::Invalid("unterminated string literal".to_string()),
        ),
    }
}

/// First entry of `table` that prefixes the input
fn longest<'a>(table: &'static [&'static str]) -> impl Fn(&'a str) -> PResult<'a, &'static str> {
    move |input: &'a str| {
        for op in table {
            if let Ok((rest, _)) = tag::<_, _, GrammarError<'a>>(*op)(input) {
                return Ok((rest, *op));
            }
        }
        Err(nom::Err::Error(GrammarError::new(
            input,
            Problem::Expected("an operator"),
        )))
    }
}

/// Operator, delimiter or assignment, longest match first
pub fn punct<'a>(input: &'a str) -> PResult<'a, TokenKind> {
    alt((
        map(longest(ASSIGNMENTS), TokenKind::Assign),
        map(longest(OPERATORS), TokenKind::Op),
        value(TokenKind::Assign("="), pchar('=')),
    ))(input)
}

/// One token with no leading whitespace
pub fn token<'a>(input: &'a str) -> PResult<'a, TokenKind> {
    alt((number, map(string_literal, TokenKind::Str), word, punct))(input)
}
