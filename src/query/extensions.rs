//! AST-aware extension functions and the registry that exposes them to queries.
//!
//! An [`ExtensionRegistry`] is built once at startup and handed to the
//! compiler by reference. Each entry may restrict the context node tags it can
//! be called from; the restriction is checked before the implementation runs.

use ahash::AHashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::value::{NodeRef, Value, number_to_string};
use crate::tree::{NodeId, Tree};

const PARAMETERIZED_EXPR: &str = "ParameterizedExpr";
const CELL_INDEX_EXPR: &str = "CellIndexExpr";
const DOT_EXPR: &str = "DotExpr";
const ASSIGN_STMT: &str = "AssignStmt";
const FOR_STMT: &str = "ForStmt";
const NAME_EXPR: &str = "NameExpr";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error(
        "{function} called in {actual} context, expecting any of {}",
        .expected.iter().cloned().collect::<Vec<_>>().join(", ")
    )]
    UnexpectedContext {
        function: String,
        actual: String,
        expected: BTreeSet<String>,
    },

    #[error("{0}")]
    Invalid(String),
}

/// What an extension sees of the evaluation in progress
pub struct CallContext<'a> {
    pub tree: &'a Tree,
    pub node: NodeRef,
    pub position: usize,
    pub size: usize,
}

impl CallContext<'_> {
    /// The context element, or the owner element for an attribute context
    #[inline]
    pub fn element(&self) -> NodeId {
        self.node.element()
    }

    /// Tag used for context checks
    pub fn tag(&self) -> &str {
        self.node.name(self.tree)
    }

    fn child(&self, index: usize) -> Value {
        match self.node {
            NodeRef::Element(id) => Value::NodeSet(
                self.tree
                    .child(id, index)
                    .map(NodeRef::Element)
                    .into_iter()
                    .collect(),
            ),
            NodeRef::Attribute(..) => Value::NodeSet(Vec::new()),
        }
    }
}

/// A natively implemented query function
pub trait Extension: Send + Sync {
    fn call(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, ExtensionError>;

    /// Specialise for constant arguments known at compile time.
    /// The returned implementation is called with the same arguments.
    fn bind(&self, _args: &[Value]) -> Option<Arc<dyn Extension>> {
        None
    }
}

struct FnExtension<F>(F);

impl<F> Extension for FnExtension<F>
where
    F: Fn(&CallContext<'_>, Vec<Value>) -> Result<Value, ExtensionError> + Send + Sync,
{
    fn call(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, ExtensionError> {
        (self.0)(ctx, args)
    }
}

/// A registry entry
pub struct ExtensionFunction {
    name: String,
    /// `None` accepts any context
    pub allowed_contexts: Option<BTreeSet<String>>,
    pub implementation: Arc<dyn Extension>,
}

impl fmt::Debug for ExtensionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFunction")
            .field("name", &self.name)
            .field("allowed_contexts", &self.allowed_contexts)
            .finish_non_exhaustive()
    }
}

impl ExtensionFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check_context(&self, ctx: &CallContext<'_>) -> Result<(), ExtensionError> {
        match &self.allowed_contexts {
            Some(allowed) if !allowed.contains(ctx.tag()) => {
                Err(ExtensionError::UnexpectedContext {
                    function: self.name.clone(),
                    actual: ctx.tag().to_string(),
                    expected: allowed.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Check the context, then run the registered implementation
    pub fn invoke(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, ExtensionError> {
        self.invoke_with(self.implementation.as_ref(), ctx, args)
    }

    /// Check the context, then run a specialized implementation
    pub fn invoke_with(
        &self,
        implementation: &dyn Extension,
        ctx: &CallContext<'_>,
        args: Vec<Value>,
    ) -> Result<Value, ExtensionError> {
        self.check_context(ctx)?;
        implementation.call(ctx, args)
    }
}

/// Name to extension table
#[derive(Debug, Default, Clone)]
pub struct ExtensionRegistry {
    functions: AHashMap<String, Arc<ExtensionFunction>>,
}

impl ExtensionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the AST helpers: `is_call`, `num_args`, `arg`,
    /// `lhs`, `rhs`, `target`, `loopvars`, `is_stmt` and `is_expr`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_extension(
            "is_call",
            &[PARAMETERIZED_EXPR],
            Arc::new(IsCall { filter: None }),
        );
        registry.register(
            "num_args",
            &[PARAMETERIZED_EXPR, CELL_INDEX_EXPR],
            |ctx, _args| {
                let count = ctx.tree.children(ctx.element()).len() as f64;
                Ok(Value::Number(count - 1.0))
            },
        );
        registry.register("arg", &[PARAMETERIZED_EXPR, CELL_INDEX_EXPR], |ctx, args| {
            let [index] = args.as_slice() else {
                return Err(ExtensionError::Invalid(format!(
                    "arg() takes exactly 1 argument, got {}",
                    args.len()
                )));
            };
            let index = index.to_number(ctx.tree);
            if index.is_nan() || index < 0.0 {
                return Ok(Value::NodeSet(Vec::new()));
            }
            Ok(ctx.child(index as usize))
        });
        registry.register("lhs", &[ASSIGN_STMT], |ctx, _args| Ok(ctx.child(0)));
        registry.register("rhs", &[ASSIGN_STMT], |ctx, _args| Ok(ctx.child(1)));
        registry.register(
            "target",
            &[CELL_INDEX_EXPR, DOT_EXPR, PARAMETERIZED_EXPR],
            |ctx, _args| Ok(ctx.child(0)),
        );
        registry.register("loopvars", &[], |ctx, _args| {
            Ok(Value::Strings(loop_variables(ctx.tree, ctx.element())))
        });
        registry.register("is_stmt", &[], |ctx, _args| {
            Ok(Value::Boolean(ctx.tag().ends_with("Stmt")))
        });
        registry.register("is_expr", &[], |ctx, _args| {
            Ok(Value::Boolean(ctx.tag().ends_with("Expr")))
        });
        registry
    }

    /// Register a closure. An empty `contexts` slice accepts any context.
    /// A name that is already registered is replaced.
    pub fn register<F>(&mut self, name: &str, contexts: &[&str], implementation: F)
    where
        F: Fn(&CallContext<'_>, Vec<Value>) -> Result<Value, ExtensionError>
            + Send
            + Sync
            + 'static,
    {
        self.register_extension(name, contexts, Arc::new(FnExtension(implementation)));
    }

    pub fn register_extension(
        &mut self,
        name: &str,
        contexts: &[&str],
        implementation: Arc<dyn Extension>,
    ) {
        let allowed_contexts = if contexts.is_empty() {
            None
        } else {
            Some(contexts.iter().map(|c| c.to_string()).collect())
        };
        let function = ExtensionFunction {
            name: name.to_string(),
            allowed_contexts,
            implementation,
        };
        if self
            .functions
            .insert(name.to_string(), Arc::new(function))
            .is_some()
        {
            tracing::debug!(name, "replaced extension function");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ExtensionFunction>> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Names accepted by `is_call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    Any,
    Single(String),
    Many(BTreeSet<String>),
}

impl NameFilter {
    /// Flatten `is_call` arguments. No arguments accepts any callee; arguments
    /// that yield no names accept none.
    pub fn from_args(args: &[Value], tree: Option<&Tree>) -> Option<Self> {
        if args.is_empty() {
            return Some(NameFilter::Any);
        }
        let mut names = BTreeSet::new();
        for arg in args {
            match arg {
                Value::String(s) => {
                    names.insert(s.clone());
                }
                Value::Strings(items) => names.extend(items.iter().cloned()),
                Value::NodeSet(nodes) => {
                    // Node-sets need a tree; not resolvable at compile time
                    let tree = tree?;
                    names.extend(nodes.iter().map(|n| n.string_value(tree)));
                }
                Value::Number(n) => {
                    names.insert(number_to_string(*n));
                }
                Value::Boolean(b) => {
                    names.insert(b.to_string());
                }
            }
        }
        Some(if names.len() == 1 {
            let mut names = names.into_iter();
            NameFilter::Single(names.next().unwrap_or_default())
        } else {
            NameFilter::Many(names)
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Single(single) => single == name,
            NameFilter::Many(names) => names.contains(name),
        }
    }
}

/// `is_call(names?)`. Holds a pre-resolved filter once bound to literal arguments.
pub struct IsCall {
    filter: Option<NameFilter>,
}

impl IsCall {
    /// Name of the function called by a `ParameterizedExpr`, if its target is
    /// a function name
    fn callee(tree: &Tree, node: NodeId) -> Option<&str> {
        let target = tree.child(node, 0)?;
        if tree.tag(target) != NAME_EXPR || tree.attribute(target, "kind") != Some("FUN") {
            return None;
        }
        let name = tree.child(target, 0)?;
        Some(tree.attribute(name, "nameId").unwrap_or_default())
    }
}

impl Extension for IsCall {
    fn call(&self, ctx: &CallContext<'_>, args: Vec<Value>) -> Result<Value, ExtensionError> {
        let NodeRef::Element(node) = ctx.node else {
            return Ok(Value::Boolean(false));
        };
        let Some(callee) = Self::callee(ctx.tree, node) else {
            return Ok(Value::Boolean(false));
        };
        let matched = match &self.filter {
            Some(filter) => filter.matches(callee),
            None => NameFilter::from_args(&args, Some(ctx.tree))
                .is_some_and(|filter| filter.matches(callee)),
        };
        Ok(Value::Boolean(matched))
    }

    fn bind(&self, args: &[Value]) -> Option<Arc<dyn Extension>> {
        let filter = NameFilter::from_args(args, None)?;
        Some(Arc::new(IsCall {
            filter: Some(filter),
        }))
    }
}

/// Loop variables of the enclosing `for` loops, innermost first.
///
/// The variable is the left side of the loop's first child, an assignment.
/// Its `nameId` sits either on that node or on its `Name` child.
fn loop_variables(tree: &Tree, node: NodeId) -> Vec<String> {
    tree.ancestors(node)
        .filter(|&a| tree.tag(a) == FOR_STMT)
        .filter_map(|a| {
            let assign = tree.child(a, 0)?;
            let var = tree.child(assign, 0)?;
            tree.attribute(var, "nameId")
                .or_else(|| tree.attribute(tree.child(var, 0)?, "nameId"))
                .map(str::to_string)
        })
        .collect()
}
