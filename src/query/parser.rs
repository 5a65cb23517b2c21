//! Recursive-descent parser for the XPath 1.0 subset.
//!
//! Precedence, lowest first: `or`, `and`, equality, relational, additive,
//! multiplicative, unary minus, union, path.

use super::ast::{Axis, BinaryOp, Expr, FunctionCall, NodeTest, Step};
use super::error::QueryError;
use super::lexer::{Token, TokenKind, lex, token_text};

/// Limit on expression nesting. Each parenthesis, predicate, argument list,
/// unary minus and chained binary operator counts one level, since the binder
/// and evaluator recurse as deep as the tree.
const MAX_DEPTH: u32 = 256;

/// Parse a query string into an unbound expression tree
pub fn parse(source: &str) -> Result<Expr, QueryError> {
    let tokens = lex(source).map_err(|e| {
        let snippet: String = source[e.span.start..].chars().take(1).collect();
        QueryError::syntax(
            source,
            e.span.start,
            format!("Invalid expression: unexpected character '{snippet}'"),
        )
    })?;

    if tokens.is_empty() {
        return Err(QueryError::syntax(source, 0, "Invalid expression: empty query"));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek_token() {
        return Err(parser.error_at(token, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

impl<'a> Parser<'a> {
    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        self.descend()?;
        let mut lhs = self.parse_and()?;
        let mut chain = 1;
        while self.consume_operator_name("or") {
            self.descend()?;
            chain += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_equality()?;
        let mut chain = 0;
        while self.consume_operator_name("and") {
            self.descend()?;
            chain += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_relational()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Equals) => BinaryOp::Eq,
                Some(TokenKind::NotEquals) => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_additive()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Less) => BinaryOp::Lt,
                Some(TokenKind::LessEquals) => BinaryOp::Le,
                Some(TokenKind::Greater) => BinaryOp::Gt,
                Some(TokenKind::GreaterEquals) => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_multiplicative()?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_unary()?;
        let mut chain = 0;
        loop {
            // After an operand, `*` and the names div/mod are operators
            let op = if self.peek() == Some(TokenKind::Star) {
                self.advance();
                BinaryOp::Mul
            } else if self.consume_operator_name("div") {
                BinaryOp::Div
            } else if self.consume_operator_name("mod") {
                BinaryOp::Mod
            } else {
                break;
            };
            self.descend()?;
            chain += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        if self.peek() == Some(TokenKind::Minus) {
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend(1);
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.parse_path_expr()?;
        let mut chain = 0;
        while self.peek() == Some(TokenKind::Pipe) {
            self.advance();
            self.descend()?;
            chain += 1;
            let rhs = self.parse_path_expr()?;
            lhs = Expr::binary(BinaryOp::Union, lhs, rhs);
        }
        self.ascend(chain);
        Ok(lhs)
    }

    fn parse_path_expr(&mut self) -> Result<Expr, QueryError> {
        match self.peek() {
            Some(TokenKind::Slash) => {
                self.advance();
                let steps = if self.at_step_start() {
                    self.parse_relative_path()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(TokenKind::DoubleSlash) => {
                self.advance();
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_path()?);
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ if self.at_step_start() => Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative_path()?,
            }),
            _ => self.parse_filter_path(),
        }
    }

    /// FilterExpr, optionally continued with `/` or `//` and a relative path
    fn parse_filter_path(&mut self) -> Result<Expr, QueryError> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let base = if predicates.is_empty() {
            primary
        } else {
            Expr::Filter {
                primary: Box::new(primary),
                predicates,
            }
        };

        let mut steps = Vec::new();
        match self.peek() {
            Some(TokenKind::Slash) => {
                self.advance();
            }
            Some(TokenKind::DoubleSlash) => {
                self.advance();
                steps.push(Step::descendant_or_self());
            }
            _ => return Ok(base),
        }
        steps.extend(self.parse_relative_path()?);
        Ok(Expr::PathFrom {
            base: Box::new(base),
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        let Some(token) = self.peek_token() else {
            return Err(self.error_at_end("expected an expression"));
        };

        match token.kind {
            TokenKind::ParenOpen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenKind::ParenClose, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::Literal => {
                self.advance();
                let text = token_text(self.source, &token);
                Ok(Expr::Literal(text[1..text.len() - 1].to_string()))
            }
            TokenKind::Number => {
                self.advance();
                let text = token_text(self.source, &token);
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.error_at(token.clone(), "invalid number"))?;
                Ok(Expr::Number(value))
            }
            TokenKind::Name if self.peek_nth(1) == Some(TokenKind::ParenOpen) => {
                self.parse_function_call()
            }
            _ => Err(self.error_at(token, "expected an expression")),
        }
    }

    fn parse_function_call(&mut self) -> Result<Expr, QueryError> {
        let name_token = self.advance_token();
        let name = token_text(self.source, &name_token).to_string();
        self.expect(TokenKind::ParenOpen, "expected '('")?;

        let mut args = Vec::new();
        if self.peek() != Some(TokenKind::ParenClose) {
            args.push(self.parse_or()?);
            while self.peek() == Some(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        self.expect(TokenKind::ParenClose, "expected ')' after function arguments")?;

        Ok(Expr::Call(FunctionCall {
            name,
            args,
            binding: Default::default(),
        }))
    }

    fn parse_relative_path(&mut self) -> Result<Vec<Step>, QueryError> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(TokenKind::Slash) => {
                    self.advance();
                }
                Some(TokenKind::DoubleSlash) => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                }
                _ => break,
            }
            steps.push(self.parse_step()?);
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> Result<Step, QueryError> {
        match self.peek() {
            Some(TokenKind::Dot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                });
            }
            Some(TokenKind::DotDot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = if self.peek() == Some(TokenKind::At) {
            self.advance();
            Axis::Attribute
        } else if self.peek() == Some(TokenKind::Name)
            && self.peek_nth(1) == Some(TokenKind::DoubleColon)
        {
            let token = self.advance_token();
            let name = token_text(self.source, &token);
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error_at(token.clone(), "unknown axis"))?;
            self.advance();
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, QueryError> {
        let Some(token) = self.peek_token() else {
            return Err(self.error_at_end("expected a node test"));
        };

        match token.kind {
            TokenKind::Star => {
                self.advance();
                Ok(NodeTest::Wildcard)
            }
            TokenKind::Name => {
                self.advance();
                let name = token_text(self.source, &token);
                if self.peek() == Some(TokenKind::ParenOpen) {
                    let test = match name {
                        "node" => NodeTest::AnyNode,
                        "text" => NodeTest::Text,
                        _ => return Err(self.error_at(token, "expected a node test")),
                    };
                    self.advance();
                    self.expect(TokenKind::ParenClose, "expected ')'")?;
                    Ok(test)
                } else {
                    Ok(NodeTest::Name(name.to_string()))
                }
            }
            _ => Err(self.error_at(token, "expected a node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, QueryError> {
        let mut predicates = Vec::new();
        while self.peek() == Some(TokenKind::BracketOpen) {
            self.advance();
            predicates.push(self.parse_or()?);
            self.expect(TokenKind::BracketClose, "expected ']'")?;
        }
        Ok(predicates)
    }

    /// Whether the next tokens begin a location step rather than a filter expression
    fn at_step_start(&self) -> bool {
        match self.peek() {
            Some(TokenKind::Dot | TokenKind::DotDot | TokenKind::At | TokenKind::Star) => true,
            Some(TokenKind::Name) => match self.peek_nth(1) {
                Some(TokenKind::DoubleColon) => true,
                Some(TokenKind::ParenOpen) => {
                    let token = &self.tokens[self.pos];
                    matches!(token_text(self.source, token), "node" | "text")
                }
                _ => true,
            },
            _ => false,
        }
    }

    fn consume_operator_name(&mut self, name: &str) -> bool {
        match self.tokens.get(self.pos) {
            Some(token)
                if token.kind == TokenKind::Name && token_text(self.source, token) == name =>
            {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<(), QueryError> {
        match self.peek_token() {
            Some(token) if token.kind == kind => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(self.error_at(token, message)),
            None => Err(self.error_at_end(message)),
        }
    }

    fn descend(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth <= MAX_DEPTH {
            return Ok(());
        }
        let position = self
            .peek_token()
            .map_or(self.source.len(), |token| token.span.start);
        Err(QueryError::syntax(
            self.source,
            position,
            "Invalid expression: expression nested too deeply",
        ))
    }

    fn ascend(&mut self, levels: u32) {
        self.depth -= levels;
    }

    fn peek(&self) -> Option<TokenKind> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    fn peek_token(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn advance_token(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn error_at(&self, token: Token, message: &str) -> QueryError {
        let text = token_text(self.source, &token);
        QueryError::syntax(
            self.source,
            token.span.start,
            format!("Invalid expression: {message}, found '{text}'"),
        )
    }

    fn error_at_end(&self, message: &str) -> QueryError {
        QueryError::syntax(
            self.source,
            self.source.len(),
            format!("Invalid expression: {message} at end of query"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse(source).unwrap_or_else(|e| panic!("{source}: {e}"))
    }

    #[test]
    fn test_descendant_path() {
        let expr = parse_ok("//ForStmt");
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(absolute);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[1].axis, Axis::Child);
                assert_eq!(steps[1].test, NodeTest::Name("ForStmt".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_root_only() {
        assert!(matches!(
            parse_ok("/"),
            Expr::Path { absolute: true, ref steps } if steps.is_empty()
        ));
    }

    #[test]
    fn test_predicate_with_call() {
        let expr = parse_ok("//ParameterizedExpr[is_call('eval')]");
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        let step = &steps[1];
        assert_eq!(step.predicates.len(), 1);
        match &step.predicates[0] {
            Expr::Call(call) => {
                assert_eq!(call.name, "is_call");
                assert!(matches!(&call.args[..], [Expr::Literal(s)] if s == "eval"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_filter_then_path() {
        let expr = parse_ok("rhs()/@kind");
        match expr {
            Expr::PathFrom { base, steps } => {
                assert!(matches!(*base, Expr::Call(ref c) if c.name == "rhs"));
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].axis, Axis::Attribute);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_axis_steps() {
        let expr = parse_ok("ancestor::Function/Name/@nameId");
        let Expr::Path { absolute, steps } = expr else {
            panic!("expected path");
        };
        assert!(!absolute);
        assert_eq!(steps[0].axis, Axis::Ancestor);
        assert_eq!(steps[1].axis, Axis::Child);
        assert_eq!(steps[2].axis, Axis::Attribute);
    }

    #[test]
    fn test_star_is_wildcard_or_multiply() {
        let expr = parse_ok("count(*) * 2");
        match expr {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Mul);
                let Expr::Call(call) = *lhs else {
                    panic!("expected call");
                };
                assert!(matches!(
                    &call.args[..],
                    [Expr::Path { steps, .. }] if steps[0].test == NodeTest::Wildcard
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_operator_names_versus_element_names() {
        // `and` is an element name in operand position
        let expr = parse_ok("and and or");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
        let expr = parse_ok("6 div 2 mod 2");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mod, .. }));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_ok("1 + 2 * 3 = 7 or false()");
        let Expr::Binary { op, lhs, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_node_type_tests() {
        let expr = parse_ok("//node()/text()");
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert_eq!(steps[1].test, NodeTest::AnyNode);
        assert_eq!(steps[2].test, NodeTest::Text);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            r"\\ForStmt",
            r"\ForStmt",
            "//",
            "//ForStmt[",
            "//ForStmt[1",
            "//ForStmt]",
            "count(",
            "bogus::ForStmt",
            "//ForStmt/comment()",
            "1 +",
            "",
            "   ",
        ] {
            let err = parse(bad).expect_err(bad);
            assert!(err.is_syntax(), "{bad}: {err}");
            assert_eq!(err.source_text, bad);
        }
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse("//ForStmt[@x = ]").unwrap_err();
        assert_eq!(err.position, Some(15));
    }

    #[test]
    fn test_nesting_limit() {
        let deep_parens = format!("//ForStmt[{}1{}]", "(".repeat(10_000), ")".repeat(10_000));
        let deep_minus = format!("{}1", "-".repeat(10_000));
        let deep_predicates = format!("//a{}", "[b".repeat(10_000));
        let long_chain = vec!["1"; 10_000].join(" + ");
        let wide_union = vec!["//a"; 10_000].join(" | ");
        for source in [&deep_parens, &deep_minus, &deep_predicates, &long_chain, &wide_union] {
            let err = parse(source).expect_err("deep query should be rejected");
            assert!(err.is_syntax(), "{err}");
            assert!(err.message.contains("nested too deeply"), "{}", err.message);
            assert!(err.position.is_some());
        }
    }

    #[test]
    fn test_nesting_below_limit() {
        let nested = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(parse_ok(&nested), Expr::Number(n) if n == 1.0));

        let chain = vec!["1"; 100].join(" + ");
        parse_ok(&chain);
        // siblings do not accumulate depth
        let siblings = vec!["(1)"; 1_000].join(", ");
        parse_ok(&format!("concat({siblings})"));
    }
}
