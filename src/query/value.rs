//! Runtime values and XPath 1.0 conversion and comparison rules.

use crate::tree::{NodeId, Tree};

/// A node selected by a query: an element or one of its attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Element(NodeId),
    /// Owner element and attribute index
    Attribute(NodeId, u32),
}

impl NodeRef {
    /// Key that sorts node references into document order.
    /// Attributes come after their owner and before its children.
    #[inline]
    pub fn order_key(self) -> (NodeId, u32) {
        match self {
            NodeRef::Element(id) => (id, 0),
            NodeRef::Attribute(id, index) => (id, index + 1),
        }
    }

    /// The element itself, or the owner of an attribute
    #[inline]
    pub fn element(self) -> NodeId {
        match self {
            NodeRef::Element(id) | NodeRef::Attribute(id, _) => id,
        }
    }

    pub fn name(self, tree: &Tree) -> &str {
        match self {
            NodeRef::Element(id) => tree.tag(id),
            NodeRef::Attribute(id, index) => &tree.node(id).attributes[index as usize].0,
        }
    }

    pub fn string_value(self, tree: &Tree) -> String {
        match self {
            NodeRef::Element(id) => tree.string_value(id),
            NodeRef::Attribute(id, index) => tree.node(id).attributes[index as usize].1.clone(),
        }
    }
}

/// Sort into document order and drop duplicates
pub fn normalize(nodes: &mut Vec<NodeRef>) {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    NodeSet(Vec<NodeRef>),
    Boolean(bool),
    Number(f64),
    String(String),
    /// Ordered strings returned by extensions such as `loopvars()`.
    /// Compared existentially, like a node-set of text nodes.
    Strings(Vec<String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::NodeSet(_) => "node-set",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Strings(_) => "string sequence",
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Strings(items) => !items.is_empty(),
        }
    }

    pub fn to_number(&self, tree: &Tree) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => string_to_number(&other.to_xpath_string(tree)),
        }
    }

    /// XPath `string()`: first node's string-value for node-sets
    pub fn to_xpath_string(&self, tree: &Tree) -> String {
        match self {
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|n| n.string_value(tree))
                .unwrap_or_default(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Strings(items) => items.first().cloned().unwrap_or_default(),
        }
    }

    /// String-values of every member, for node-sets and string sequences
    pub fn members(&self, tree: &Tree) -> Option<Vec<String>> {
        match self {
            Value::NodeSet(nodes) => Some(nodes.iter().map(|n| n.string_value(tree)).collect()),
            Value::Strings(items) => Some(items.clone()),
            _ => None,
        }
    }
}

/// XPath `number()` applied to a string: NaN unless the whole trimmed text is a decimal
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1
        && digits != ".";
    if valid {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// XPath number to string conversion
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 1e15 {
        // also maps -0 to "0"
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn numbers(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }

    fn strings(self, a: &str, b: &str) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => self.numbers(string_to_number(a), string_to_number(b)),
        }
    }

    fn booleans(self, a: bool, b: bool) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => self.numbers(a as u8 as f64, b as u8 as f64),
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    /// Same comparison with the operands swapped
    fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

/// XPath 1.0 general comparison
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value, tree: &Tree) -> bool {
    match (lhs.members(tree), rhs.members(tree)) {
        (Some(left), Some(right)) => left
            .iter()
            .any(|a| right.iter().any(|b| op.strings(a, b))),
        (Some(left), None) => compare_members(op, &left, rhs, tree),
        (None, Some(right)) => compare_members(op.flipped(), &right, lhs, tree),
        (None, None) => compare_atomic(op, lhs, rhs, tree),
    }
}

fn compare_members(op: CompareOp, members: &[String], other: &Value, tree: &Tree) -> bool {
    match other {
        Value::Boolean(b) => op.booleans(!members.is_empty(), *b),
        Value::Number(n) => members
            .iter()
            .any(|m| op.numbers(string_to_number(m), *n)),
        _ => {
            let s = other.to_xpath_string(tree);
            members.iter().any(|m| op.strings(m, &s))
        }
    }
}

fn compare_atomic(op: CompareOp, lhs: &Value, rhs: &Value, tree: &Tree) -> bool {
    if op.is_equality() {
        if matches!(lhs, Value::Boolean(_)) || matches!(rhs, Value::Boolean(_)) {
            op.booleans(lhs.to_boolean(), rhs.to_boolean())
        } else if matches!(lhs, Value::Number(_)) || matches!(rhs, Value::Number(_)) {
            op.numbers(lhs.to_number(tree), rhs.to_number(tree))
        } else {
            op.strings(&lhs.to_xpath_string(tree), &rhs.to_xpath_string(tree))
        }
    } else {
        op.numbers(lhs.to_number(tree), rhs.to_number(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;

    fn tree() -> Tree {
        let mut b = TreeBuilder::new();
        b.open("Root", &[("a", "1"), ("b", "two")], 1);
        b.leaf("Child", &[("n", "3")], 2);
        b.close();
        b.finish()
    }

    #[test]
    fn test_order_key_places_attributes_before_children() {
        let t = tree();
        let root = t.root().unwrap();
        let child = t.child(root, 0).unwrap();
        let mut nodes = vec![
            NodeRef::Element(child),
            NodeRef::Attribute(root, 1),
            NodeRef::Element(root),
            NodeRef::Attribute(root, 0),
            NodeRef::Element(child),
        ];
        normalize(&mut nodes);
        assert_eq!(
            nodes,
            [
                NodeRef::Element(root),
                NodeRef::Attribute(root, 0),
                NodeRef::Attribute(root, 1),
                NodeRef::Element(child),
            ]
        );
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number("-1.5"), -1.5);
        assert_eq!(string_to_number(".5"), 0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number(".").is_nan());
        assert!(string_to_number("abc").is_nan());
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_boolean_conversion() {
        assert!(!Value::NodeSet(vec![]).to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(Value::String("0".into()).to_boolean());
        assert!(!Value::Strings(vec![]).to_boolean());
    }

    #[test]
    fn test_node_set_compares_existentially() {
        let t = tree();
        let root = t.root().unwrap();
        let attrs = Value::NodeSet(vec![NodeRef::Attribute(root, 0), NodeRef::Attribute(root, 1)]);
        assert!(compare(CompareOp::Eq, &attrs, &Value::String("two".into()), &t));
        assert!(compare(CompareOp::Eq, &attrs, &Value::Number(1.0), &t));
        assert!(compare(CompareOp::Ne, &attrs, &Value::String("two".into()), &t));
        assert!(!compare(CompareOp::Eq, &Value::NodeSet(vec![]), &Value::String("".into()), &t));
        // flipped relational comparison: 0 < @a
        assert!(compare(CompareOp::Lt, &Value::Number(0.0), &attrs, &t));
        assert!(!compare(CompareOp::Gt, &Value::Number(0.0), &attrs, &t));
    }

    #[test]
    fn test_boolean_dominates_equality() {
        let t = tree();
        assert!(compare(
            CompareOp::Eq,
            &Value::Boolean(true),
            &Value::String("x".into()),
            &t
        ));
        assert!(compare(
            CompareOp::Eq,
            &Value::Number(1.0),
            &Value::String(" 1 ".into()),
            &t
        ));
    }

    #[test]
    fn test_strings_sequence_membership() {
        let t = tree();
        let vars = Value::Strings(vec!["i".into(), "j".into()]);
        assert!(compare(CompareOp::Eq, &vars, &Value::String("j".into()), &t));
        assert!(!compare(CompareOp::Eq, &vars, &Value::String("k".into()), &t));
    }
}
