use crate::functions::{FunctionDef, FunctionRegistry};
use crate::token::{Token, TokenKind};
use crate::value::Value;
use hashbrown::HashSet;
use loci_error::{LociResult, loci_err};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static NAME_IDS: RefCell<HashSet<&'static str>> = RefCell::new(HashSet::new());
}

/// Interns an identifier, property or method name into a pointer-stable
/// name id. AST caches store these so member dispatch compares name ids
/// instead of re-hashing strings; the interpreter is single-threaded, so
/// one thread-local table suffices.
pub fn intern_name(name: &str) -> &'static str {
    NAME_IDS.with(|ids| {
        let mut ids = ids.borrow_mut();
        match ids.get(name) {
            Some(&id) => id,
            None => {
                let id: &'static str = Box::leak(Box::from(name));
                ids.insert(id);
                id
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    IntLit,
    FloatLit,
    StrLit,
    Ident,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Range,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,

    Not,
    Neg,
    Pos,

    Assign,
    Call,
    Subscript,
    Member,

    Block,
    If,
    While,
    DoWhile,
    For,
    Next,
    Break,
    Return,
    Empty,
}

/// One parse-tree node: a kind, the token it was built from (for error
/// positions), and ordered children. The `cached`, `resolved` and `interned`
/// slots are filled once by [optimize] and treated as immutable afterwards.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub token: Token,
    pub children: Vec<AstNode>,
    pub cached: Option<Value>,
    pub resolved: Option<Arc<FunctionDef>>,
    pub interned: Option<&'static str>,
}

impl AstNode {
    pub fn new(kind: NodeKind, token: Token) -> Self {
        AstNode {
            kind,
            token,
            children: Vec::new(),
            cached: None,
            resolved: None,
            interned: None,
        }
    }

    pub fn with_children(kind: NodeKind, token: Token, children: Vec<AstNode>) -> Self {
        AstNode {
            kind,
            token,
            children,
            cached: None,
            resolved: None,
            interned: None,
        }
    }

    pub fn pos(&self) -> usize {
        self.token.pos
    }

    pub fn ident_name(&self) -> Option<&str> {
        match &self.token.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }
}

/// Post-parse tree optimization: folds literals into cached values,
/// propagates a single cached child through compound/return nodes, interns
/// identifier and member names, and pre-resolves direct call targets against
/// the function registry. Unknown function names fail here rather than at
/// evaluation time, unless the registry defers them.
pub fn optimize(node: &mut AstNode, registry: &FunctionRegistry) -> LociResult<()> {
    for child in &mut node.children {
        optimize(child, registry)?;
    }

    match node.kind {
        NodeKind::IntLit => {
            if let TokenKind::IntLit(v) = node.token.kind {
                node.cached = Some(Value::int(v));
            }
        }
        NodeKind::FloatLit => {
            if let TokenKind::FloatLit(v) = node.token.kind {
                node.cached = Some(Value::float(v));
            }
        }
        NodeKind::StrLit => {
            if let TokenKind::StrLit(v) = &node.token.kind {
                node.cached = Some(Value::string(v.clone()));
            }
        }
        NodeKind::Block | NodeKind::Return => {
            if node.children.len() == 1 {
                node.cached = node.children[0].cached.clone();
            }
        }
        NodeKind::Ident => {
            if let Some(name) = node.ident_name() {
                node.interned = Some(intern_name(name));
            }
        }
        NodeKind::Member => {
            if let Some(name) = node.children[1].ident_name() {
                node.interned = Some(intern_name(name));
            }
        }
        NodeKind::Call => {
            let callee = &node.children[0];
            if callee.kind == NodeKind::Ident {
                let name = callee.ident_name().unwrap_or_default();
                match registry.get(name) {
                    Some(def) => node.resolved = Some(Arc::clone(def)),
                    None => {
                        if !registry.allows_late(name) {
                            return Err(
                                loci_err!(Name: "unrecognized function name '{}'", name)
                                    .at(callee.pos()),
                            );
                        }
                    }
                }
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::token::tokenize;

    fn parse_one(source: &str) -> AstNode {
        let mut statements = Parser::new(tokenize(source).unwrap())
            .parse_program()
            .unwrap();
        assert_eq!(statements.len(), 1);
        statements.remove(0)
    }

    #[test]
    fn test_literal_folding() {
        let registry = FunctionRegistry::base();
        let mut node = parse_one("42;");
        optimize(&mut node, &registry).unwrap();
        assert_eq!(node.cached, Some(Value::int(42)));
    }

    #[test]
    fn test_block_cache_propagation() {
        let registry = FunctionRegistry::base();
        let mut node = parse_one("{ 3.5; }");
        optimize(&mut node, &registry).unwrap();
        assert_eq!(node.cached, Some(Value::float(3.5)));
    }

    #[test]
    fn test_unknown_function_fails_fast() {
        let registry = FunctionRegistry::base();
        let mut node = parse_one("noSuchFunction(1);");
        let err = optimize(&mut node, &registry).unwrap_err();
        assert!(err.message().contains("noSuchFunction"));
    }

    #[test]
    fn test_call_resolution_and_interning() {
        let registry = FunctionRegistry::base();
        let mut node = parse_one("sum(1:10);");
        optimize(&mut node, &registry).unwrap();
        assert!(node.resolved.is_some());

        let mut node = parse_one("x.position;");
        optimize(&mut node, &registry).unwrap();
        assert_eq!(node.interned, Some("position"));
    }

    #[test]
    fn test_name_ids_are_pointer_stable() {
        let a = intern_name("selectionCoeff");
        let b = intern_name(&String::from("selectionCoeff"));
        assert!(std::ptr::eq(a, b));
        assert!(!std::ptr::eq(a, intern_name("position")));
    }
}
