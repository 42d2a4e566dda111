//! Abstract Syntax Tree types for the rule expression language.
//!
//! The tree covers exactly the constructs the sandbox accepts. Anything else
//! (loops, assignment, lambdas, comprehensions, imports) is rejected by the
//! parser before a tree exists, so the validator and the interpreter can both
//! match exhaustively on [`Expr`].

use serde::{Deserialize, Serialize};

/// Root expression type for the rule language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "node")]
pub enum Expr {
    /// Literal constant: 42, 3.5, 'text', True, None
    Constant { value: Constant },
    /// Bare identifier: a, voltage, len
    Name { id: String },
    /// Attribute access: a.voltage
    Attribute { value: Box<Expr>, attr: String },
    /// Index access: a['max-length'], values[0]
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// Function call: len(a.name)
    Call { func: Box<Expr>, args: Vec<Expr> },
    /// Unary operator: -x, not x, ~x
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary operator: x + y, x ** y
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Boolean chain: x and y and z
    BoolOp { op: BoolOp, values: Vec<Expr> },
    /// Comparison chain: a < b <= c
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOp>,
        comparators: Vec<Expr>,
    },
    /// Ternary conditional: body if test else orelse
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// List display: [x, y]
    List { elts: Vec<Expr> },
    /// Tuple display: (x, y)
    Tuple { elts: Vec<Expr> },
    /// Set display: {x, y}
    Set { elts: Vec<Expr> },
    /// Dict display: {k: v}
    Dict { entries: Vec<(Expr, Expr)> },
}

/// Literal values that can appear in source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation: -x
    Neg,
    /// Arithmetic identity: +x
    Pos,
    /// Bitwise inversion: ~x
    Invert,
    /// Logical negation: not x
    Not,
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    /// Parse operator from its source token
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            "//" => Some(BinaryOp::FloorDiv),
            "%" => Some(BinaryOp::Mod),
            "**" => Some(BinaryOp::Pow),
            "<<" => Some(BinaryOp::LShift),
            ">>" => Some(BinaryOp::RShift),
            "&" => Some(BinaryOp::BitAnd),
            "|" => Some(BinaryOp::BitOr),
            "^" => Some(BinaryOp::BitXor),
            _ => None,
        }
    }

    /// Source token for this operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::LShift => "<<",
            BinaryOp::RShift => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

/// Short-circuiting boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
}

/// Comparison operators. Chains of these compare pairwise left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal: ==
    Eq,
    /// Not equal: !=
    NotEq,
    /// Less than: <
    Lt,
    /// Less than or equal: <=
    LtE,
    /// Greater than: >
    Gt,
    /// Greater than or equal: >=
    GtE,
    /// Membership: in
    In,
    /// Negated membership: not in
    NotIn,
    /// Identity: is
    Is,
    /// Negated identity: is not
    IsNot,
}

impl CompareOp {
    /// Parse a symbolic comparison operator from its token.
    /// Word operators (`in`, `is`, ...) are recognised by the parser.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::NotEq),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::LtE),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::GtE),
            _ => None,
        }
    }

    /// Source spelling of this operator
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtE => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtE => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

impl Expr {
    /// Human-readable node kind, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "Constant",
            Expr::Name { .. } => "Name",
            Expr::Attribute { .. } => "Attribute",
            Expr::Subscript { .. } => "Subscript",
            Expr::Call { .. } => "Call",
            Expr::Unary { .. } => "UnaryOp",
            Expr::Binary { .. } => "BinOp",
            Expr::BoolOp { .. } => "BoolOp",
            Expr::Compare { .. } => "Compare",
            Expr::IfExp { .. } => "IfExp",
            Expr::List { .. } => "List",
            Expr::Tuple { .. } => "Tuple",
            Expr::Set { .. } => "Set",
            Expr::Dict { .. } => "Dict",
        }
    }

    /// Direct children of this node, in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant { .. } | Expr::Name { .. } => Vec::new(),
            Expr::Attribute { value, .. } => vec![value.as_ref()],
            Expr::Subscript { value, index } => vec![value.as_ref(), index.as_ref()],
            Expr::Call { func, args } => {
                let mut out = vec![func.as_ref()];
                out.extend(args.iter());
                out
            }
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::BoolOp { values, .. } => values.iter().collect(),
            Expr::Compare {
                left, comparators, ..
            } => {
                let mut out = vec![left.as_ref()];
                out.extend(comparators.iter());
                out
            }
            Expr::IfExp { test, body, orelse } => {
                vec![body.as_ref(), test.as_ref(), orelse.as_ref()]
            }
            Expr::List { elts } | Expr::Tuple { elts } | Expr::Set { elts } => {
                elts.iter().collect()
            }
            Expr::Dict { entries } => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
        }
    }

    /// Visit this node and every descendant, pre-order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Height of the tree rooted at this node (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expr::depth)
            .max()
            .unwrap_or(0)
    }

    /// Name of the callee when this is a call through a plain name or attribute
    pub fn callee_name(&self) -> Option<&str> {
        match self {
            Expr::Name { id } => Some(id),
            Expr::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(id: &str) -> Expr {
        Expr::Name { id: id.to_string() }
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(CompareOp::from_symbol("=="), Some(CompareOp::Eq));
        assert_eq!(CompareOp::from_symbol("!="), Some(CompareOp::NotEq));
        assert_eq!(CompareOp::from_symbol(">="), Some(CompareOp::GtE));
        assert_eq!(CompareOp::from_symbol("in"), None);
        assert_eq!(BinaryOp::from_symbol("//"), Some(BinaryOp::FloorDiv));
        assert_eq!(BinaryOp::from_symbol("**"), Some(BinaryOp::Pow));
        assert_eq!(BinaryOp::from_symbol("@"), None);
    }

    #[test]
    fn test_symbol_round_trip() {
        for op in [BinaryOp::Add, BinaryOp::Mod, BinaryOp::LShift, BinaryOp::BitXor] {
            assert_eq!(BinaryOp::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(CompareOp::NotIn.symbol(), "not in");
    }

    #[test]
    fn test_walk_visits_every_node() {
        // a.voltage == b.voltage
        let expr = Expr::Compare {
            left: Box::new(Expr::Attribute {
                value: Box::new(name("a")),
                attr: "voltage".to_string(),
            }),
            ops: vec![CompareOp::Eq],
            comparators: vec![Expr::Attribute {
                value: Box::new(name("b")),
                attr: "voltage".to_string(),
            }],
        };

        let mut kinds = Vec::new();
        expr.walk(&mut |node| kinds.push(node.kind()));
        assert_eq!(
            kinds,
            vec!["Compare", "Attribute", "Name", "Attribute", "Name"]
        );
        assert_eq!(expr.depth(), 3);
    }

    #[test]
    fn test_callee_name() {
        assert_eq!(name("len").callee_name(), Some("len"));
        let attr = Expr::Attribute {
            value: Box::new(name("a")),
            attr: "lower".to_string(),
        };
        assert_eq!(attr.callee_name(), Some("lower"));
        let constant = Expr::Constant {
            value: Constant::Int(1),
        };
        assert_eq!(constant.callee_name(), None);
    }
}
