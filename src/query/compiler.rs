//! Query compilation: parse, then bind every function call once.

use std::sync::Arc;

use super::ast::{Binding, Expr, FunctionCall, Step};
use super::error::QueryError;
use super::executor::QueryExecutor;
use super::extensions::ExtensionRegistry;
use super::functions::CoreFunction;
use super::parser::parse;
use super::value::{NodeRef, Value};
use crate::tree::Tree;

/// A parsed and bound query.
///
/// Immutable after [`compile`]; share it freely between threads. All
/// evaluation state lives on the executor's stack.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    source: String,
    program: Expr,
}

impl CompiledQuery {
    /// The query text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn program(&self) -> &Expr {
        &self.program
    }

    /// Matching nodes in document order
    pub fn execute(&self, tree: &Tree) -> Result<Vec<NodeRef>, QueryError> {
        QueryExecutor::new(tree).execute(self)
    }

    /// Evaluate to any value type
    pub fn evaluate(&self, tree: &Tree) -> Result<Value, QueryError> {
        QueryExecutor::new(tree).evaluate(self)
    }
}

/// Compile `source` against the functions in `registry`.
///
/// Only syntax is checked here. Calls to names neither in the core library
/// nor in the registry compile, and fail when evaluated.
pub fn compile(source: &str, registry: &ExtensionRegistry) -> Result<CompiledQuery, QueryError> {
    let mut program = parse(source)?;
    let mut unresolved = Vec::new();
    bind_expr(&mut program, registry, &mut unresolved);

    if !unresolved.is_empty() {
        tracing::debug!(query = source, ?unresolved, "query calls unregistered functions");
    }
    tracing::debug!(query = source, "compiled query");

    Ok(CompiledQuery {
        source: source.to_string(),
        program,
    })
}

/// Compile optional user input. Absent or blank input means "no query" and
/// yields `Ok(None)`; anything else must compile.
pub fn compile_input(
    input: Option<&str>,
    registry: &ExtensionRegistry,
) -> Result<Option<CompiledQuery>, QueryError> {
    match input {
        Some(text) if !text.trim().is_empty() => compile(text, registry).map(Some),
        _ => Ok(None),
    }
}

fn bind_expr(expr: &mut Expr, registry: &ExtensionRegistry, unresolved: &mut Vec<String>) {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            bind_expr(lhs, registry, unresolved);
            bind_expr(rhs, registry, unresolved);
        }
        Expr::Negate(inner) => bind_expr(inner, registry, unresolved),
        Expr::Literal(_) | Expr::Number(_) => {}
        Expr::Call(call) => bind_call(call, registry, unresolved),
        Expr::Path { steps, .. } => bind_steps(steps, registry, unresolved),
        Expr::Filter {
            primary,
            predicates,
        } => {
            bind_expr(primary, registry, unresolved);
            for predicate in predicates {
                bind_expr(predicate, registry, unresolved);
            }
        }
        Expr::PathFrom { base, steps } => {
            bind_expr(base, registry, unresolved);
            bind_steps(steps, registry, unresolved);
        }
    }
}

fn bind_steps(steps: &mut [Step], registry: &ExtensionRegistry, unresolved: &mut Vec<String>) {
    for step in steps {
        for predicate in &mut step.predicates {
            bind_expr(predicate, registry, unresolved);
        }
    }
}

fn bind_call(call: &mut FunctionCall, registry: &ExtensionRegistry, unresolved: &mut Vec<String>) {
    for arg in &mut call.args {
        bind_expr(arg, registry, unresolved);
    }

    call.binding = if let Some(core) = CoreFunction::from_name(&call.name) {
        Binding::Core(core)
    } else if let Some(function) = registry.get(&call.name) {
        let specialized = constant_args(&call.args)
            .and_then(|args| function.implementation.bind(&args));
        match specialized {
            Some(implementation) => Binding::Specialized {
                function: Arc::clone(function),
                implementation,
            },
            None => Binding::Extension(Arc::clone(function)),
        }
    } else {
        unresolved.push(call.name.clone());
        Binding::Unbound
    };
}

/// Argument values when every argument is a literal
fn constant_args(args: &[Expr]) -> Option<Vec<Value>> {
    args.iter()
        .map(|arg| match arg {
            Expr::Literal(s) => Some(Value::String(s.clone())),
            Expr::Number(n) => Some(Value::Number(*n)),
            _ => None,
        })
        .collect()
}
