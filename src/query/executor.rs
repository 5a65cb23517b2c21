//! Tree-walking evaluator for compiled queries.
//!
//! Every failure inside evaluation is funnelled into one internal error type
//! and converted to [`QueryError`] at the boundary, carrying the query text.

use super::ast::{Axis, BinaryOp, Binding, Expr, FunctionCall, NodeTest, Step};
use super::compiler::CompiledQuery;
use super::error::QueryError;
use super::extensions::{CallContext, ExtensionError};
use super::functions::FunctionContext;
use super::value::{CompareOp, NodeRef, Value, compare, normalize};
use crate::tree::{NodeId, Tree};

enum EvalError {
    Eval(String),
    Extension(ExtensionError),
}

impl EvalError {
    fn into_query_error(self, source: &str) -> QueryError {
        match self {
            EvalError::Eval(message) => QueryError::evaluation(source, message),
            EvalError::Extension(error) => QueryError::from_extension(source, error),
        }
    }
}

type EvalResult<T> = Result<T, EvalError>;

/// Context node with its proximity position and context size
#[derive(Clone, Copy)]
struct Context {
    node: NodeRef,
    position: usize,
    size: usize,
}

/// Evaluates compiled queries against one tree
pub struct QueryExecutor<'a> {
    tree: &'a Tree,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(tree: &'a Tree) -> Self {
        Self { tree }
    }

    /// Run `query` from the document node. The result must be a node-set.
    pub fn execute(&self, query: &CompiledQuery) -> Result<Vec<NodeRef>, QueryError> {
        match self.evaluate(query)? {
            Value::NodeSet(nodes) => Ok(nodes),
            other => Err(QueryError::evaluation(
                query.source(),
                format!(
                    "Expression does not evaluate to a node-set (got {})",
                    other.type_name()
                ),
            )),
        }
    }

    pub fn evaluate(&self, query: &CompiledQuery) -> Result<Value, QueryError> {
        let ctx = Context {
            node: NodeRef::Element(self.tree.document()),
            position: 1,
            size: 1,
        };
        self.eval(query.program(), ctx)
            .map_err(|e| e.into_query_error(query.source()))
    }

    fn eval(&self, expr: &Expr, ctx: Context) -> EvalResult<Value> {
        match expr {
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx),
            Expr::Negate(inner) => Ok(Value::Number(-self.eval(inner, ctx)?.to_number(self.tree))),
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Call(call) => self.eval_call(call, ctx),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    NodeRef::Element(self.tree.document())
                } else {
                    ctx.node
                };
                self.apply_steps(vec![start], steps).map(Value::NodeSet)
            }
            Expr::Filter {
                primary,
                predicates,
            } => {
                let nodes = self.node_set(primary, ctx, "filter expression")?;
                self.apply_predicates(nodes, predicates).map(Value::NodeSet)
            }
            Expr::PathFrom { base, steps } => {
                let nodes = self.node_set(base, ctx, "path expression")?;
                self.apply_steps(nodes, steps).map(Value::NodeSet)
            }
        }
    }

    fn node_set(&self, expr: &Expr, ctx: Context, what: &str) -> EvalResult<Vec<NodeRef>> {
        match self.eval(expr, ctx)? {
            Value::NodeSet(nodes) => Ok(nodes),
            other => Err(EvalError::Eval(format!(
                "Invalid type: {what} requires a node-set, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: Context) -> EvalResult<Value> {
        let compare_op = match op {
            BinaryOp::Or => {
                let result = self.eval(lhs, ctx)?.to_boolean() || self.eval(rhs, ctx)?.to_boolean();
                return Ok(Value::Boolean(result));
            }
            BinaryOp::And => {
                let result = self.eval(lhs, ctx)?.to_boolean() && self.eval(rhs, ctx)?.to_boolean();
                return Ok(Value::Boolean(result));
            }
            BinaryOp::Union => {
                let mut nodes = self.node_set(lhs, ctx, "union")?;
                nodes.extend(self.node_set(rhs, ctx, "union")?);
                normalize(&mut nodes);
                return Ok(Value::NodeSet(nodes));
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let a = self.eval(lhs, ctx)?.to_number(self.tree);
                let b = self.eval(rhs, ctx)?.to_number(self.tree);
                let n = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                return Ok(Value::Number(n));
            }
            BinaryOp::Eq => CompareOp::Eq,
            BinaryOp::Ne => CompareOp::Ne,
            BinaryOp::Lt => CompareOp::Lt,
            BinaryOp::Le => CompareOp::Le,
            BinaryOp::Gt => CompareOp::Gt,
            BinaryOp::Ge => CompareOp::Ge,
        };
        let a = self.eval(lhs, ctx)?;
        let b = self.eval(rhs, ctx)?;
        Ok(Value::Boolean(compare(compare_op, &a, &b, self.tree)))
    }

    fn eval_call(&self, call: &FunctionCall, ctx: Context) -> EvalResult<Value> {
        let call_ctx = CallContext {
            tree: self.tree,
            node: ctx.node,
            position: ctx.position,
            size: ctx.size,
        };
        match &call.binding {
            Binding::Unbound => Err(EvalError::Eval(format!(
                "Unregistered function: {}",
                call.name
            ))),
            Binding::Core(function) => {
                let fn_ctx = FunctionContext {
                    tree: self.tree,
                    node: ctx.node,
                    position: ctx.position,
                    size: ctx.size,
                };
                let args = self.eval_args(call, ctx)?;
                function.call(&fn_ctx, args).map_err(EvalError::Eval)
            }
            Binding::Extension(function) => {
                let args = self.eval_args(call, ctx)?;
                function
                    .invoke(&call_ctx, args)
                    .map_err(EvalError::Extension)
            }
            Binding::Specialized {
                function,
                implementation,
            } => {
                let args = self.eval_args(call, ctx)?;
                function
                    .invoke_with(implementation.as_ref(), &call_ctx, args)
                    .map_err(EvalError::Extension)
            }
        }
    }

    fn eval_args(&self, call: &FunctionCall, ctx: Context) -> EvalResult<Vec<Value>> {
        call.args.iter().map(|arg| self.eval(arg, ctx)).collect()
    }

    fn apply_steps(&self, mut current: Vec<NodeRef>, steps: &[Step]) -> EvalResult<Vec<NodeRef>> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &current {
                let selected: Vec<NodeRef> = self
                    .axis_nodes(step.axis, node)
                    .into_iter()
                    .filter(|&n| self.test_matches(&step.test, step.axis, n))
                    .collect();
                next.extend(self.apply_predicates(selected, &step.predicates)?);
            }
            normalize(&mut next);
            current = next;
        }
        Ok(current)
    }

    /// Keep nodes whose predicate holds. `nodes` is in proximity order.
    fn apply_predicates(
        &self,
        mut nodes: Vec<NodeRef>,
        predicates: &[Expr],
    ) -> EvalResult<Vec<NodeRef>> {
        for predicate in predicates {
            let size = nodes.len();
            let mut kept = Vec::with_capacity(size);
            for (i, &node) in nodes.iter().enumerate() {
                let ctx = Context {
                    node,
                    position: i + 1,
                    size,
                };
                let keep = match self.eval(predicate, ctx)? {
                    Value::Number(n) => n == ctx.position as f64,
                    other => other.to_boolean(),
                };
                if keep {
                    kept.push(node);
                }
            }
            nodes = kept;
        }
        Ok(nodes)
    }

    /// Nodes on `axis` from `node`, nearest first for reverse axes
    fn axis_nodes(&self, axis: Axis, node: NodeRef) -> Vec<NodeRef> {
        let tree = self.tree;
        match (axis, node) {
            (Axis::SelfAxis, _) => vec![node],
            (Axis::Attribute, NodeRef::Element(id)) => (0..tree.node(id).attributes.len() as u32)
                .map(|i| NodeRef::Attribute(id, i))
                .collect(),
            (Axis::Parent, NodeRef::Attribute(owner, _)) => vec![NodeRef::Element(owner)],
            (Axis::Parent, NodeRef::Element(id)) => elements(tree.parent(id)),
            (Axis::Ancestor | Axis::AncestorOrSelf, _) => {
                let mut nodes = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    nodes.push(node);
                }
                let start = match node {
                    NodeRef::Attribute(owner, _) => {
                        nodes.push(NodeRef::Element(owner));
                        owner
                    }
                    NodeRef::Element(id) => id,
                };
                nodes.extend(tree.ancestors(start).map(NodeRef::Element));
                if !tree.is_document(start) {
                    nodes.push(NodeRef::Element(tree.document()));
                }
                nodes
            }
            // Attributes have no children or siblings
            (_, NodeRef::Attribute(owner, _)) => match axis {
                Axis::DescendantOrSelf => vec![node],
                Axis::Following => elements(tree.descendants(owner).chain(tree.following(owner))),
                Axis::Preceding => {
                    elements(tree.preceding(owner).collect::<Vec<_>>().into_iter().rev())
                }
                _ => Vec::new(),
            },
            (Axis::Child, NodeRef::Element(id)) => elements(tree.children(id).iter().copied()),
            (Axis::Descendant, NodeRef::Element(id)) => elements(tree.descendants(id)),
            (Axis::DescendantOrSelf, NodeRef::Element(id)) => {
                elements(std::iter::once(id).chain(tree.descendants(id)))
            }
            (Axis::FollowingSibling, NodeRef::Element(id)) => {
                elements(tree.following_siblings(id).iter().copied())
            }
            (Axis::PrecedingSibling, NodeRef::Element(id)) => {
                elements(tree.preceding_siblings(id).iter().rev().copied())
            }
            (Axis::Following, NodeRef::Element(id)) => elements(tree.following(id)),
            (Axis::Preceding, NodeRef::Element(id)) => {
                elements(tree.preceding(id).collect::<Vec<_>>().into_iter().rev())
            }
        }
    }

    fn test_matches(&self, test: &NodeTest, axis: Axis, node: NodeRef) -> bool {
        match test {
            NodeTest::AnyNode => true,
            // Text is folded into element string-values, never a separate node
            NodeTest::Text => false,
            NodeTest::Wildcard | NodeTest::Name(_) => {
                let principal = match node {
                    NodeRef::Attribute(..) => axis == Axis::Attribute,
                    NodeRef::Element(id) => axis != Axis::Attribute && !self.tree.is_document(id),
                };
                match test {
                    NodeTest::Name(name) => principal && node.name(self.tree) == name,
                    _ => principal,
                }
            }
        }
    }
}

fn elements(ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeRef> {
    ids.into_iter().map(NodeRef::Element).collect()
}
