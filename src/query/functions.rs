//! XPath 1.0 core function library.

use super::value::{NodeRef, Value};
use crate::tree::Tree;

/// Evaluation state a core function may consult
pub struct FunctionContext<'a> {
    pub tree: &'a Tree,
    pub node: NodeRef,
    pub position: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreFunction {
    Last,
    Position,
    Count,
    Name,
    LocalName,
    String,
    Concat,
    StartsWith,
    EndsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    Not,
    True,
    False,
    Boolean,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
}

impl CoreFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        use CoreFunction::*;
        Some(match name {
            "last" => Last,
            "position" => Position,
            "count" => Count,
            "name" => Name,
            "local-name" => LocalName,
            "string" => String,
            "concat" => Concat,
            "starts-with" => StartsWith,
            "ends-with" => EndsWith,
            "contains" => Contains,
            "substring-before" => SubstringBefore,
            "substring-after" => SubstringAfter,
            "substring" => Substring,
            "string-length" => StringLength,
            "normalize-space" => NormalizeSpace,
            "translate" => Translate,
            "not" => Not,
            "true" => True,
            "false" => False,
            "boolean" => Boolean,
            "number" => Number,
            "sum" => Sum,
            "floor" => Floor,
            "ceiling" => Ceiling,
            "round" => Round,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use CoreFunction::*;
        match self {
            Last => "last",
            Position => "position",
            Count => "count",
            Name => "name",
            LocalName => "local-name",
            String => "string",
            Concat => "concat",
            StartsWith => "starts-with",
            EndsWith => "ends-with",
            Contains => "contains",
            SubstringBefore => "substring-before",
            SubstringAfter => "substring-after",
            Substring => "substring",
            StringLength => "string-length",
            NormalizeSpace => "normalize-space",
            Translate => "translate",
            Not => "not",
            True => "true",
            False => "false",
            Boolean => "boolean",
            Number => "number",
            Sum => "sum",
            Floor => "floor",
            Ceiling => "ceiling",
            Round => "round",
        }
    }

    /// Accepted argument counts, inclusive; `None` upper bound is unlimited
    fn arity(self) -> (usize, Option<usize>) {
        use CoreFunction::*;
        match self {
            Last | Position | True | False => (0, Some(0)),
            Count | Not | Boolean | Sum | Floor | Ceiling | Round => (1, Some(1)),
            Name | LocalName | String | StringLength | NormalizeSpace | Number => (0, Some(1)),
            StartsWith | EndsWith | Contains | SubstringBefore | SubstringAfter => (2, Some(2)),
            Substring => (2, Some(3)),
            Translate => (3, Some(3)),
            Concat => (2, None),
        }
    }

    /// Apply the function. Errors are messages for an evaluation error.
    pub fn call(self, ctx: &FunctionContext<'_>, args: Vec<Value>) -> Result<Value, String> {
        let (min, max) = self.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(format!(
                "Invalid number of arguments for {}(): got {}",
                self.name(),
                args.len()
            ));
        }

        let tree = ctx.tree;
        let string_arg = |i: usize| args[i].to_xpath_string(tree);
        // Zero-argument forms default to the context node
        let string_or_context = || match args.first() {
            Some(v) => v.to_xpath_string(tree),
            None => ctx.node.string_value(tree),
        };

        use CoreFunction::*;
        let value = match self {
            Last => Value::Number(ctx.size as f64),
            Position => Value::Number(ctx.position as f64),
            Count => match &args[0] {
                Value::NodeSet(nodes) => Value::Number(nodes.len() as f64),
                Value::Strings(items) => Value::Number(items.len() as f64),
                other => return Err(self.type_error(other)),
            },
            Name | LocalName => {
                let node = match args.first() {
                    None => Some(ctx.node),
                    Some(Value::NodeSet(nodes)) => nodes.first().copied(),
                    Some(other) => return Err(self.type_error(other)),
                };
                Value::String(node.map(|n| n.name(tree).to_string()).unwrap_or_default())
            }
            String => Value::String(string_or_context()),
            Concat => Value::String(args.iter().map(|a| a.to_xpath_string(tree)).collect()),
            StartsWith => Value::Boolean(string_arg(0).starts_with(&string_arg(1))),
            EndsWith => Value::Boolean(string_arg(0).ends_with(&string_arg(1))),
            Contains => Value::Boolean(string_arg(0).contains(&string_arg(1))),
            SubstringBefore => {
                let s = string_arg(0);
                let needle = string_arg(1);
                Value::String(
                    s.find(&needle)
                        .map(|i| s[..i].to_string())
                        .unwrap_or_default(),
                )
            }
            SubstringAfter => {
                let s = string_arg(0);
                let needle = string_arg(1);
                Value::String(
                    s.find(&needle)
                        .map(|i| s[i + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            Substring => {
                let s = string_arg(0);
                let start = args[1].to_number(tree);
                let len = args.get(2).map(|v| v.to_number(tree));
                Value::String(substring(&s, start, len))
            }
            StringLength => Value::Number(string_or_context().chars().count() as f64),
            NormalizeSpace => Value::String(
                string_or_context()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Translate => {
                let from: Vec<char> = string_arg(1).chars().collect();
                let to: Vec<char> = string_arg(2).chars().collect();
                Value::String(
                    string_arg(0)
                        .chars()
                        .filter_map(|c| match from.iter().position(|&f| f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            Not => Value::Boolean(!args[0].to_boolean()),
            True => Value::Boolean(true),
            False => Value::Boolean(false),
            Boolean => Value::Boolean(args[0].to_boolean()),
            Number => Value::Number(match args.first() {
                Some(v) => v.to_number(tree),
                None => Value::String(ctx.node.string_value(tree)).to_number(tree),
            }),
            Sum => match args[0].members(tree) {
                Some(items) => Value::Number(
                    items
                        .iter()
                        .map(|s| Value::String(s.clone()).to_number(tree))
                        .sum(),
                ),
                None => return Err(self.type_error(&args[0])),
            },
            Floor => Value::Number(args[0].to_number(tree).floor()),
            Ceiling => Value::Number(args[0].to_number(tree).ceil()),
            Round => Value::Number(xpath_round(args[0].to_number(tree))),
        };
        Ok(value)
    }

    fn type_error(self, got: &Value) -> String {
        format!(
            "Invalid type for {}(): expected a node-set, got {}",
            self.name(),
            got.type_name()
        )
    }
}

/// XPath rounding: halves go towards positive infinity
fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// XPath `substring()` with 1-based, rounded positions
fn substring(s: &str, start: f64, len: Option<f64>) -> String {
    let start = xpath_round(start);
    let end = match len {
        Some(len) => start + xpath_round(len),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= start && pos < end
        })
        .map(|(_, c)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;

    fn with_ctx<T>(f: impl FnOnce(&FunctionContext<'_>) -> T) -> T {
        let mut b = TreeBuilder::new();
        b.open("ForStmt", &[("line", "7")], 1);
        b.leaf("Name", &[("nameId", "i")], 1);
        b.close();
        let tree = b.finish();
        let ctx = FunctionContext {
            tree: &tree,
            node: NodeRef::Element(tree.root().unwrap()),
            position: 2,
            size: 5,
        };
        f(&ctx)
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
        with_ctx(|ctx| CoreFunction::from_name(name).unwrap().call(ctx, args))
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_lookup_roundtrip_names() {
        for name in ["count", "local-name", "substring-after", "normalize-space"] {
            assert_eq!(CoreFunction::from_name(name).unwrap().name(), name);
        }
        assert!(CoreFunction::from_name("is_call").is_none());
    }

    #[test]
    fn test_context_functions() {
        assert_eq!(call("position", vec![]), Ok(Value::Number(2.0)));
        assert_eq!(call("last", vec![]), Ok(Value::Number(5.0)));
        assert_eq!(call("name", vec![]), Ok(s("ForStmt")));
    }

    #[test]
    fn test_arity_errors() {
        let err = call("count", vec![]).unwrap_err();
        assert!(err.contains("Invalid number of arguments"), "{err}");
        assert!(call("true", vec![s("x")]).is_err());
        assert!(call("concat", vec![s("a")]).is_err());
    }

    #[test]
    fn test_count_requires_node_set() {
        let err = call("count", vec![s("x")]).unwrap_err();
        assert!(err.contains("Invalid type"), "{err}");
        assert_eq!(
            call("count", vec![Value::Strings(vec!["i".into(), "j".into()])]),
            Ok(Value::Number(2.0))
        );
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("concat", vec![s("a"), s("b"), Value::Number(1.0)]), Ok(s("ab1")));
        assert_eq!(call("substring-before", vec![s("a.b.c"), s(".")]), Ok(s("a")));
        assert_eq!(call("substring-after", vec![s("a.b.c"), s(".")]), Ok(s("b.c")));
        let n = Value::Number;
        assert_eq!(call("substring", vec![s("12345"), n(2.0), n(3.0)]), Ok(s("234")));
        assert_eq!(call("substring", vec![s("12345"), n(1.5), n(2.6)]), Ok(s("234")));
        assert_eq!(call("normalize-space", vec![s("  a   b ")]), Ok(s("a b")));
        assert_eq!(call("translate", vec![s("bar"), s("abc"), s("AB")]), Ok(s("BAr")));
        assert_eq!(call("starts-with", vec![s("feval"), s("fe")]), Ok(Value::Boolean(true)));
        assert_eq!(call("string-length", vec![s("héllo")]), Ok(Value::Number(5.0)));
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("round", vec![Value::Number(2.5)]), Ok(Value::Number(3.0)));
        assert_eq!(call("round", vec![Value::Number(-2.5)]), Ok(Value::Number(-2.0)));
        assert_eq!(call("floor", vec![Value::Number(1.7)]), Ok(Value::Number(1.0)));
        assert_eq!(call("ceiling", vec![Value::Number(1.2)]), Ok(Value::Number(2.0)));
        assert_eq!(call("number", vec![s(" 12 ")]), Ok(Value::Number(12.0)));
        assert_eq!(
            call("sum", vec![Value::Strings(vec!["1".into(), "2.5".into()])]),
            Ok(Value::Number(3.5))
        );
    }
}
