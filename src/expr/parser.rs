//! Recursive-descent `nom` grammar for the rule expression language.
//!
//! Produces a [`Program`]: a single expression whose source length, nesting
//! depth and node count are all within [`ExpressionLimits`]. Once the opening
//! token of a construct is consumed the rest of it is `cut`, so an error
//! points at the token that broke it.

use std::cell::Cell;

use super::ast::{BinaryOp, BoolOp, CompareOp, Constant, Expr, UnaryOp};
use super::lexer::{
    blank, number, punct, string_literal, to_parse_error, word, GrammarError, PResult, Problem,
    TokenKind,
};
use nom::branch::alt;
use nom::combinator::{cut, map, map_opt, opt, value, verify};
use nom::multi::{many0, many1, separated_list0};
use nom::sequence::{pair, preceded};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceilings applied before and during parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionLimits {
    pub max_source_len: usize,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for ExpressionLimits {
    fn default() -> Self {
        Self {
            max_source_len: 4096,
            max_depth: 64,
            max_nodes: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum ParseError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Forbidden construct '{construct}' at offset {offset}")]
    Forbidden { offset: usize, construct: String },

    #[error("Expression exceeds {limit} limit ({actual} > {max})")]
    LimitExceeded {
        limit: String,
        actual: usize,
        max: usize,
    },
}

/// A parsed, size-bounded expression
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    root: Expr,
    node_count: usize,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }
}

/// Parse `source` as a single expression within `limits`
pub fn parse(source: &str, limits: &ExpressionLimits) -> Result<Program, ParseError> {
    if source.len() > limits.max_source_len {
        return Err(ParseError::LimitExceeded {
            limit: "source length".to_string(),
            actual: source.len(),
            max: limits.max_source_len,
        });
    }

    let grammar = Grammar::new(limits);
    let (rest, root) = grammar
        .expression(source)
        .map_err(|e| to_parse_error(e, source))?;
    if !rest.trim_start().is_empty() {
        return Err(
            GrammarError::new(rest, Problem::Expected("end of expression")).into_parse_error(source),
        );
    }

    // Left-associative chains can be deep without nesting the parser, so the
    // tree itself is measured once it is known to be small.
    let depth = root.depth();
    if depth > limits.max_depth {
        return Err(ParseError::LimitExceeded {
            limit: "depth".to_string(),
            actual: depth,
            max: limits.max_depth,
        });
    }

    Ok(Program {
        source: source.to_string(),
        root,
        node_count: grammar.nodes.get(),
    })
}

/// `parser` after optional whitespace
fn ws<'a, O, F>(mut parser: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    move |input: &'a str| {
        let (input, _) = blank(input)?;
        parser(input)
    }
}

/// Exactly the operator `sym`, never a longer one sharing its prefix
fn symbol<'a>(sym: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'static str> {
    ws(value(
        sym,
        verify(punct, move |t: &TokenKind| *t == TokenKind::Op(sym)),
    ))
}

fn keyword<'a>(kw: TokenKind) -> impl FnMut(&'a str) -> PResult<'a, ()> {
    ws(value((), verify(word, move |t: &TokenKind| *t == kw)))
}

fn name<'a>(input: &'a str) -> PResult<'a, String> {
    ws(map_opt(word, |t| match t {
        TokenKind::Name(id) => Some(id),
        _ => None,
    }))(input)
}

/// `parser` must match; otherwise fail hard, naming `what` was expected
fn required<'a, O, F>(what: &'static str, mut parser: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    move |input: &'a str| match parser(input) {
        Err(nom::Err::Error(_)) => GrammarError::fail(input, Problem::Expected(what)),
        other => other,
    }
}

fn starred(input: &str) -> bool {
    alt((symbol("*"), symbol("**")))(input).is_ok()
}

fn slice_error<'a, O>(open: &'a str) -> PResult<'a, O> {
    GrammarError::fail(open, Problem::Invalid("slices are not supported".to_string()))
}

fn compare_op<'a>(input: &'a str) -> PResult<'a, CompareOp> {
    alt((
        value(
            CompareOp::NotIn,
            pair(keyword(TokenKind::Not), keyword(TokenKind::In)),
        ),
        value(
            CompareOp::IsNot,
            pair(keyword(TokenKind::Is), keyword(TokenKind::Not)),
        ),
        value(CompareOp::Is, keyword(TokenKind::Is)),
        value(CompareOp::In, keyword(TokenKind::In)),
        map_opt(ws(punct), |t| match t {
            TokenKind::Op(sym) => CompareOp::from_symbol(sym),
            _ => None,
        }),
    ))(input)
}

fn binary_op<'a>(ops: &'static [&'static str]) -> impl FnMut(&'a str) -> PResult<'a, BinaryOp> {
    map_opt(ws(punct), move |t| match t {
        TokenKind::Op(sym) if ops.contains(&sym) => BinaryOp::from_symbol(sym),
        _ => None,
    })
}

fn unary_op<'a>(input: &'a str) -> PResult<'a, UnaryOp> {
    map_opt(ws(punct), |t| match t {
        TokenKind::Op("-") => Some(UnaryOp::Neg),
        TokenKind::Op("+") => Some(UnaryOp::Pos),
        TokenKind::Op("~") => Some(UnaryOp::Invert),
        _ => None,
    })(input)
}

fn literal<'a>(input: &'a str) -> PResult<'a, Expr> {
    let constant = alt((
        map_opt(ws(number), |t| match t {
            TokenKind::Int(i) => Some(Constant::Int(i)),
            TokenKind::Float(f) => Some(Constant::Float(f)),
            _ => None,
        }),
        // adjacent literals concatenate: 'a' 'b'
        map(many1(ws(string_literal)), |parts| {
            Constant::Str(parts.concat())
        }),
        map_opt(ws(word), |t| match t {
            TokenKind::True => Some(Constant::Bool(true)),
            TokenKind::False => Some(Constant::Bool(false)),
            TokenKind::None => Some(Constant::None),
            _ => None,
        }),
    ));
    map(constant, |value| Expr::Constant { value })(input)
}

/// Operand parser one precedence level down
type Level<'l> = for<'g, 'a> fn(&'g Grammar<'l>, &'a str) -> PResult<'a, Expr>;

/// Grammar state shared by every level: the limits plus running counters
struct Grammar<'l> {
    limits: &'l ExpressionLimits,
    nesting: Cell<usize>,
    nodes: Cell<usize>,
}

/// One open nesting level; closed on drop
struct Nesting<'g>(&'g Cell<usize>);

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl<'l> Grammar<'l> {
    fn new(limits: &'l ExpressionLimits) -> Self {
        Self {
            limits,
            nesting: Cell::new(0),
            nodes: Cell::new(0),
        }
    }

    /// Count one AST node against the node budget
    fn node<'a>(&self, input: &'a str, expr: Expr) -> PResult<'a, Expr> {
        let count = self.nodes.get() + 1;
        self.nodes.set(count);
        if count > self.limits.max_nodes {
            return GrammarError::fail(
                input,
                Problem::Limit {
                    limit: "node count",
                    actual: count,
                    max: self.limits.max_nodes,
                },
            );
        }
        Ok((input, expr))
    }

    fn enter<'a>(&self, input: &'a str) -> Result<Nesting<'_>, nom::Err<GrammarError<'a>>> {
        let depth = self.nesting.get() + 1;
        self.nesting.set(depth);
        let nesting = Nesting(&self.nesting);
        if depth > self.limits.max_depth {
            return Err(nom::Err::Failure(GrammarError::new(
                input,
                Problem::Limit {
                    limit: "depth",
                    actual: depth,
                    max: self.limits.max_depth,
                },
            )));
        }
        Ok(nesting)
    }

    // expression := or_test ['if' or_test 'else' expression]
    fn expression<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let _nesting = self.enter(input)?;
        let (input, body) = self.or_test(input)?;
        let (input, test) = opt(preceded(
            keyword(TokenKind::If),
            cut(|i: &'a str| self.or_test(i)),
        ))(input)?;
        let Some(test) = test else {
            return Ok((input, body));
        };
        let (input, _) = required("'else'", keyword(TokenKind::Else))(input)?;
        let (input, orelse) = cut(|i: &'a str| self.expression(i))(input)?;
        self.node(
            input,
            Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
        )
    }

    fn or_test<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.bool_chain(input, BoolOp::Or, TokenKind::Or, Self::and_test)
    }

    fn and_test<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.bool_chain(input, BoolOp::And, TokenKind::And, Self::not_test)
    }

    fn bool_chain<'a>(
        &self,
        input: &'a str,
        op: BoolOp,
        token: TokenKind,
        next: Level<'l>,
    ) -> PResult<'a, Expr> {
        let (input, first) = next(self, input)?;
        let (input, rest) =
            many0(preceded(keyword(token), cut(|i: &'a str| next(self, i))))(input)?;
        if rest.is_empty() {
            return Ok((input, first));
        }
        let mut values = vec![first];
        values.extend(rest);
        self.node(input, Expr::BoolOp { op, values })
    }

    // not_test := 'not' not_test | comparison
    fn not_test<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let Ok((rest, ())) = keyword(TokenKind::Not)(input) else {
            return self.comparison(input);
        };
        let _nesting = self.enter(rest)?;
        let (rest, operand) = cut(|i: &'a str| self.not_test(i))(rest)?;
        self.node(
            rest,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
        )
    }

    fn comparison<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, left) = self.bitor(input)?;
        let (input, rest) = many0(pair(compare_op, cut(|i: &'a str| self.bitor(i))))(input)?;
        if rest.is_empty() {
            return Ok((input, left));
        }
        let (ops, comparators): (Vec<CompareOp>, Vec<Expr>) = rest.into_iter().unzip();
        self.node(
            input,
            Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
        )
    }

    /// Left-associative binary level over `ops`, with `next` as operand parser
    fn binary_level<'a>(
        &self,
        input: &'a str,
        ops: &'static [&'static str],
        next: Level<'l>,
    ) -> PResult<'a, Expr> {
        let (input, first) = next(self, input)?;
        let (input, rest) =
            many0(pair(binary_op(ops), cut(|i: &'a str| next(self, i))))(input)?;
        rest.into_iter()
            .try_fold((input, first), |(input, left), (op, right)| {
                self.node(
                    input,
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                )
            })
    }

    fn bitor<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["|"], Self::bitxor)
    }

    fn bitxor<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["^"], Self::bitand)
    }

    fn bitand<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["&"], Self::shift)
    }

    fn shift<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["<<", ">>"], Self::arith)
    }

    fn arith<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["+", "-"], Self::term)
    }

    fn term<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        self.binary_level(input, &["*", "/", "//", "%"], Self::factor)
    }

    // factor := ('+' | '-' | '~') factor | power
    fn factor<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let Ok((rest, op)) = unary_op(input) else {
            return self.power(input);
        };
        let _nesting = self.enter(rest)?;
        let (rest, operand) = cut(|i: &'a str| self.factor(i))(rest)?;
        self.node(
            rest,
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
        )
    }

    // power := postfix ['**' factor]
    fn power<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, base) = self.postfix(input)?;
        let Ok((rest, _)) = symbol("**")(input) else {
            return Ok((input, base));
        };
        let _nesting = self.enter(rest)?;
        let (rest, exponent) = cut(|i: &'a str| self.factor(i))(rest)?;
        self.node(
            rest,
            Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
        )
    }

    // postfix := atom ('.' name | '(' args ')' | '[' expression ']')*
    fn postfix<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (mut input, mut expr) = self.atom(input)?;
        loop {
            (input, expr) = if let Ok((rest, _)) = symbol(".")(input) {
                let (rest, attr) = required("attribute name", name)(rest)?;
                self.node(
                    rest,
                    Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                )?
            } else if let Ok((rest, _)) = symbol("(")(input) {
                let (rest, args) = self.call_args(rest)?;
                self.node(
                    rest,
                    Expr::Call {
                        func: Box::new(expr),
                        args,
                    },
                )?
            } else if let Ok((rest, _)) = symbol("[")(input) {
                let (rest, index) = self.subscript(input, rest)?;
                self.node(
                    rest,
                    Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                )?
            } else {
                return Ok((input, expr));
            };
        }
    }

    /// Index after the `[` at `open`; slices are refused
    fn subscript<'a>(&self, open: &'a str, input: &'a str) -> PResult<'a, Expr> {
        if symbol(":")(input).is_ok() {
            return slice_error(open);
        }
        let (input, index) = cut(|i: &'a str| self.expression(i))(input)?;
        if symbol(":")(input).is_ok() {
            return slice_error(open);
        }
        let (input, _) = required("']'", symbol("]"))(input)?;
        Ok((input, index))
    }

    // args := [argument (',' argument)*] [','] ')'
    fn call_args<'a>(&self, input: &'a str) -> PResult<'a, Vec<Expr>> {
        let (input, args) =
            separated_list0(symbol(","), |i: &'a str| self.argument(i))(input)?;
        let (input, _) = opt(symbol(","))(input)?;
        let (input, _) = required("',' or ')'", symbol(")"))(input)?;
        Ok((input, args))
    }

    fn argument<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if starred(input) {
            return GrammarError::fail(input, Problem::Forbidden("starred argument"));
        }
        let assign = verify(punct, |t: &TokenKind| *t == TokenKind::Assign("="));
        if pair(name, ws(assign))(input).is_ok() {
            return GrammarError::fail(
                input,
                Problem::Invalid("keyword arguments are not supported".to_string()),
            );
        }
        self.expression(input)
    }

    fn element<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if starred(input) {
            return GrammarError::fail(input, Problem::Forbidden("starred expression"));
        }
        self.expression(input)
    }

    /// Elements up to `close`, trailing comma allowed
    fn sequence<'a>(
        &self,
        input: &'a str,
        close: &'static str,
        expected: &'static str,
    ) -> PResult<'a, Vec<Expr>> {
        let (input, elts) =
            separated_list0(symbol(","), |i: &'a str| self.element(i))(input)?;
        let (input, _) = opt(symbol(","))(input)?;
        let (input, _) = required(expected, symbol(close))(input)?;
        Ok((input, elts))
    }

    fn atom<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if let Ok((rest, _)) = symbol("(")(input) {
            let _nesting = self.enter(rest)?;
            return self.paren(rest);
        }
        if let Ok((rest, _)) = symbol("[")(input) {
            let _nesting = self.enter(rest)?;
            let (rest, elts) = self.sequence(rest, "]", "',' or ']'")?;
            return self.node(rest, Expr::List { elts });
        }
        if let Ok((rest, _)) = symbol("{")(input) {
            let _nesting = self.enter(rest)?;
            return self.brace(rest);
        }
        if starred(input) {
            return GrammarError::fail(input, Problem::Forbidden("starred expression"));
        }
        match alt((literal, map(name, |id| Expr::Name { id })))(input) {
            Ok((rest, expr)) => self.node(rest, expr),
            Err(nom::Err::Error(_)) => Err(nom::Err::Error(GrammarError::new(
                input,
                Problem::Expected("an expression"),
            ))),
            Err(failure) => Err(failure),
        }
    }

    // paren := ')' | element ')' | element ',' [elements] ')'
    fn paren<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if let Ok((rest, _)) = symbol(")")(input) {
            return self.node(rest, Expr::Tuple { elts: Vec::new() });
        }
        let (input, first) = cut(|i: &'a str| self.element(i))(input)?;
        if let Ok((rest, _)) = symbol(")")(input) {
            return Ok((rest, first));
        }
        let (input, _) = required("',' or ')'", symbol(","))(input)?;
        let (input, rest) = self.sequence(input, ")", "',' or ')'")?;
        let mut elts = vec![first];
        elts.extend(rest);
        self.node(input, Expr::Tuple { elts })
    }

    // brace := '}' | key ':' value (',' key ':' value)* [','] '}'
    //        | element (',' element)* [','] '}'
    fn brace<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if let Ok((rest, _)) = symbol("}")(input) {
            return self.node(
                rest,
                Expr::Dict {
                    entries: Vec::new(),
                },
            );
        }
        let (input, first) = cut(|i: &'a str| self.element(i))(input)?;
        let Ok((input, _)) = symbol(":")(input) else {
            let (input, rest) = match symbol("}")(input) {
                Ok((input, _)) => (input, Vec::new()),
                Err(_) => {
                    let (input, _) = required("',' or '}'", symbol(","))(input)?;
                    self.sequence(input, "}", "',' or '}'")?
                }
            };
            let mut elts = vec![first];
            elts.extend(rest);
            return self.node(input, Expr::Set { elts });
        };

        let (input, value) = cut(|i: &'a str| self.expression(i))(input)?;
        let (input, rest) = many0(preceded(symbol(","), |i: &'a str| self.entry(i)))(input)?;
        let (input, _) = opt(symbol(","))(input)?;
        let (input, _) = required("',' or '}'", symbol("}"))(input)?;
        let mut entries = vec![(first, value)];
        entries.extend(rest);
        self.node(input, Expr::Dict { entries })
    }

    fn entry<'a>(&self, input: &'a str) -> PResult<'a, (Expr, Expr)> {
        let (input, key) = self.expression(input)?;
        let (input, _) = required("':'", symbol(":"))(input)?;
        let (input, value) = cut(|i: &'a str| self.expression(i))(input)?;
        Ok((input, (key, value)))
    }
}

/// Check that `source` parses, without keeping the tree
pub fn check_syntax(source: &str, limits: &ExpressionLimits) -> Result<(), ParseError> {
    parse(source, limits).map(|_| ())
}
