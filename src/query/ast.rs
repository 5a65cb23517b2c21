//! Expression tree produced by the parser and bound by the compiler.

use std::fmt;
use std::sync::Arc;

use super::extensions::{Extension, ExtensionFunction};
use super::functions::CoreFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }

    /// Reverse axes number proximity positions against document order
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(String),
    /// `*`
    Wildcard,
    /// `node()`
    AnyNode,
    /// `text()`
    Text,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    /// The `//` abbreviation: `descendant-or-self::node()`
    pub fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

/// How a function call resolves; filled in by the compiler
#[derive(Clone, Default)]
pub enum Binding {
    #[default]
    Unbound,
    Core(CoreFunction),
    Extension(Arc<ExtensionFunction>),
    /// Extension already specialized for its constant arguments
    Specialized {
        function: Arc<ExtensionFunction>,
        implementation: Arc<dyn Extension>,
    },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Unbound => f.write_str("Unbound"),
            Binding::Core(func) => write!(f, "Core({})", func.name()),
            Binding::Extension(func) => write!(f, "Extension({})", func.name()),
            Binding::Specialized { function, .. } => write!(f, "Specialized({})", function.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub binding: Binding,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Call(FunctionCall),
    /// Location path, from the document node when `absolute`
    Path { absolute: bool, steps: Vec<Step> },
    /// Primary expression narrowed by predicates
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
    },
    /// Filter expression continued by a relative path, e.g. `rhs()/@kind`
    PathFrom { base: Box<Expr>, steps: Vec<Step> },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Literal strings and numbers; the only arguments folded at compile time
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Number(_))
    }
}
