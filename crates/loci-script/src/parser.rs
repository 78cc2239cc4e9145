use crate::ast::{AstNode, NodeKind};
use crate::token::{Token, TokenKind};
use loci_error::{LociResult, loci_err};

/// Recursive-descent parser over a token stream. The low-level cursor
/// methods are public so embedders can drive it for outer grammars that wrap
/// the expression language (script block headers, for example) and hand the
/// bodies back to [Parser::parse_compound].
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub fn expect(&mut self, kind: &TokenKind) -> LociResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(loci_err!(
                Parse: "expected {} but found {}", kind.describe(), found.kind.describe()
            )
            .at(found.pos))
        }
    }

    pub fn parse_program(&mut self) -> LociResult<Vec<AstNode>> {
        let mut statements = Vec::new();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    pub fn parse_statement(&mut self) -> LociResult<AstNode> {
        match self.peek().kind {
            TokenKind::LBrace => self.parse_compound(),
            TokenKind::If => self.parse_if(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Next => {
                let token = self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(AstNode::new(NodeKind::Next, token))
            }
            TokenKind::Break => {
                let token = self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(AstNode::new(NodeKind::Break, token))
            }
            TokenKind::Return => {
                let token = self.advance();
                let mut children = Vec::new();
                if !self.check(&TokenKind::Semicolon) {
                    children.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::Semicolon)?;
                Ok(AstNode::with_children(NodeKind::Return, token, children))
            }
            TokenKind::Semicolon => {
                let token = self.advance();
                Ok(AstNode::new(NodeKind::Empty, token))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(expr)
            }
        }
    }

    pub fn parse_compound(&mut self) -> LociResult<AstNode> {
        let token = self.expect(&TokenKind::LBrace)?;
        let mut children = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(
                    loci_err!(Parse: "expected '}}' but found end of script").at(self.peek().pos)
                );
            }
            children.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(AstNode::with_children(NodeKind::Block, token, children))
    }

    fn parse_if(&mut self) -> LociResult<AstNode> {
        let token = self.advance();
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.parse_statement()?;

        let mut children = vec![condition, then_branch];
        if self.eat(&TokenKind::Else).is_some() {
            children.push(self.parse_statement()?);
        }
        Ok(AstNode::with_children(NodeKind::If, token, children))
    }

    fn parse_while(&mut self) -> LociResult<AstNode> {
        let token = self.advance();
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_statement()?;
        Ok(AstNode::with_children(
            NodeKind::While,
            token,
            vec![condition, body],
        ))
    }

    fn parse_do_while(&mut self) -> LociResult<AstNode> {
        let token = self.advance();
        let body = self.parse_statement()?;
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(AstNode::with_children(
            NodeKind::DoWhile,
            token,
            vec![body, condition],
        ))
    }

    fn parse_for(&mut self) -> LociResult<AstNode> {
        let token = self.advance();
        self.expect(&TokenKind::LParen)?;
        let variable = if matches!(self.peek().kind, TokenKind::Ident(_)) {
            AstNode::new(NodeKind::Ident, self.advance())
        } else {
            let found = self.peek();
            return Err(loci_err!(
                Parse: "expected identifier but found {}", found.kind.describe()
            )
            .at(found.pos));
        };
        self.expect(&TokenKind::In)?;
        let sequence = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_statement()?;
        Ok(AstNode::with_children(
            NodeKind::For,
            token,
            vec![variable, sequence, body],
        ))
    }

    pub fn parse_expr(&mut self) -> LociResult<AstNode> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> LociResult<AstNode> {
        let lhs = self.parse_or()?;
        if self.check(&TokenKind::Assign) {
            let token = self.advance();
            let rhs = self.parse_assignment()?;
            if !matches!(
                lhs.kind,
                NodeKind::Ident | NodeKind::Subscript | NodeKind::Member
            ) {
                return Err(loci_err!(Parse: "invalid assignment target").at(lhs.pos()));
            }
            return Ok(AstNode::with_children(
                NodeKind::Assign,
                token,
                vec![lhs, rhs],
            ));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let token = self.advance();
            let rhs = self.parse_and()?;
            node = AstNode::with_children(NodeKind::Or, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_equality()?;
        while self.check(&TokenKind::And) {
            let token = self.advance();
            let rhs = self.parse_equality()?;
            node = AstNode::with_children(NodeKind::And, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_equality(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_relational()?;
        loop {
            let kind = match self.peek().kind {
                TokenKind::Eq => NodeKind::Eq,
                TokenKind::NotEq => NodeKind::NotEq,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.parse_relational()?;
            node = AstNode::with_children(kind, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_relational(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_range_expr()?;
        loop {
            let kind = match self.peek().kind {
                TokenKind::Lt => NodeKind::Lt,
                TokenKind::LtEq => NodeKind::LtEq,
                TokenKind::Gt => NodeKind::Gt,
                TokenKind::GtEq => NodeKind::GtEq,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.parse_range_expr()?;
            node = AstNode::with_children(kind, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_range_expr(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_additive()?;
        while self.check(&TokenKind::Colon) {
            let token = self.advance();
            let rhs = self.parse_additive()?;
            node = AstNode::with_children(NodeKind::Range, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_additive(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_multiplicative()?;
        loop {
            let kind = match self.peek().kind {
                TokenKind::Plus => NodeKind::Add,
                TokenKind::Minus => NodeKind::Sub,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.parse_multiplicative()?;
            node = AstNode::with_children(kind, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_exponent()?;
        loop {
            let kind = match self.peek().kind {
                TokenKind::Star => NodeKind::Mul,
                TokenKind::Slash => NodeKind::Div,
                TokenKind::Percent => NodeKind::Mod,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.parse_exponent()?;
            node = AstNode::with_children(kind, token, vec![node, rhs]);
        }
        Ok(node)
    }

    fn parse_exponent(&mut self) -> LociResult<AstNode> {
        let base = self.parse_unary()?;
        if self.check(&TokenKind::Caret) {
            let token = self.advance();
            let exponent = self.parse_exponent()?;
            return Ok(AstNode::with_children(
                NodeKind::Pow,
                token,
                vec![base, exponent],
            ));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> LociResult<AstNode> {
        let kind = match self.peek().kind {
            TokenKind::Plus => Some(NodeKind::Pos),
            TokenKind::Minus => Some(NodeKind::Neg),
            TokenKind::Not => Some(NodeKind::Not),
            _ => None,
        };
        if let Some(kind) = kind {
            let token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(AstNode::with_children(kind, token, vec![operand]));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> LociResult<AstNode> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    let token = self.advance();
                    let mut children = vec![node];
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            children.push(self.parse_expr()?);
                            if self.eat(&TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    node = AstNode::with_children(NodeKind::Call, token, children);
                }
                TokenKind::LBracket => {
                    let token = self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    node = AstNode::with_children(NodeKind::Subscript, token, vec![node, index]);
                }
                TokenKind::Dot => {
                    let token = self.advance();
                    let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
                        AstNode::new(NodeKind::Ident, self.advance())
                    } else {
                        let found = self.peek();
                        return Err(loci_err!(
                            Parse: "expected identifier but found {}", found.kind.describe()
                        )
                        .at(found.pos));
                    };
                    node = AstNode::with_children(NodeKind::Member, token, vec![node, name]);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> LociResult<AstNode> {
        match self.peek().kind {
            TokenKind::IntLit(_) => Ok(AstNode::new(NodeKind::IntLit, self.advance())),
            TokenKind::FloatLit(_) => Ok(AstNode::new(NodeKind::FloatLit, self.advance())),
            TokenKind::StrLit(_) => Ok(AstNode::new(NodeKind::StrLit, self.advance())),
            TokenKind::Ident(_) => Ok(AstNode::new(NodeKind::Ident, self.advance())),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            ref other => {
                let desc = other.describe();
                Err(loci_err!(Parse: "unexpected {}", desc).at(self.peek().pos))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;
    use loci_error::ErrorCode;

    fn parse(source: &str) -> Vec<AstNode> {
        Parser::new(tokenize(source).unwrap())
            .parse_program()
            .unwrap()
    }

    #[test]
    fn test_precedence_tree() {
        let nodes = parse("1 + 2 * 3;");
        assert_eq!(nodes[0].kind, NodeKind::Add);
        assert_eq!(nodes[0].children[1].kind, NodeKind::Mul);
    }

    #[test]
    fn test_exponent_right_assoc() {
        let nodes = parse("2 ^ 3 ^ 2;");
        assert_eq!(nodes[0].kind, NodeKind::Pow);
        assert_eq!(nodes[0].children[1].kind, NodeKind::Pow);
    }

    #[test]
    fn test_unary_binds_tighter_than_exponent() {
        let nodes = parse("-2 ^ 2;");
        assert_eq!(nodes[0].kind, NodeKind::Pow);
        assert_eq!(nodes[0].children[0].kind, NodeKind::Neg);
    }

    #[test]
    fn test_range_between_relational_and_additive() {
        let nodes = parse("1 : 5 + 2;");
        assert_eq!(nodes[0].kind, NodeKind::Range);
        assert_eq!(nodes[0].children[1].kind, NodeKind::Add);

        let nodes = parse("x < 1 : 5;");
        assert_eq!(nodes[0].kind, NodeKind::Lt);
        assert_eq!(nodes[0].children[1].kind, NodeKind::Range);
    }

    #[test]
    fn test_postfix_chain() {
        let nodes = parse("sim.subpopulations[0].individualCount;");
        let member = &nodes[0];
        assert_eq!(member.kind, NodeKind::Member);
        assert_eq!(member.children[0].kind, NodeKind::Subscript);
        assert_eq!(member.children[0].children[0].kind, NodeKind::Member);
    }

    #[test]
    fn test_statement_forms() {
        let nodes = parse("if (x) { 1; } else { 2; } while (T) next; for (i in 1:3) break;");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].kind, NodeKind::If);
        assert_eq!(nodes[0].children.len(), 3);
        assert_eq!(nodes[1].kind, NodeKind::While);
        assert_eq!(nodes[2].kind, NodeKind::For);
    }

    #[test]
    fn test_assignment_right_assoc_and_targets() {
        let nodes = parse("x = y = 1;");
        assert_eq!(nodes[0].kind, NodeKind::Assign);
        assert_eq!(nodes[0].children[1].kind, NodeKind::Assign);

        let err = Parser::new(tokenize("1 = 2;").unwrap())
            .parse_program()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Parse);
        assert!(err.message().contains("assignment target"));
    }

    #[test]
    fn test_missing_token_position() {
        let err = Parser::new(tokenize("f(1, 2;").unwrap())
            .parse_program()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Parse);
        assert_eq!(err.pos(), Some(6));
    }
}
