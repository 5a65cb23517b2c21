//! Syntax tree model for parsed MATLAB sources.
//!
//! - [`types`] - arena [`Tree`], [`NodeId`] handles and the [`TreeBuilder`]
//! - [`reader`] - loading trees from the XML serialization

pub mod reader;
pub mod types;

pub use reader::{LoadError, parse_xml, parse_xml_file};
pub use types::{Ancestors, Node, NodeId, Tree, TreeBuilder};
