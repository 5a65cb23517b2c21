pub mod ast;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use compiler::{CompiledQuery, compile, compile_input};
pub use error::{QueryError, QueryErrorKind};
pub use executor::QueryExecutor;
pub use extensions::{
    CallContext, Extension, ExtensionError, ExtensionFunction, ExtensionRegistry, NameFilter,
};
pub use value::{NodeRef, Value};
