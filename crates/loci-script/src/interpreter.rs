use crate::ast::{AstNode, NodeKind, optimize};
use crate::functions::{FunctionImpl, FunctionRegistry};
use crate::parser::Parser;
use crate::symbols::Symbols;
use crate::token::{TokenKind, tokenize};
use crate::value::object::ObjectValue;
use crate::value::ops::{self, CompareOp};
use crate::value::{Value, ValueKind};
use loci_error::{LociError, LociResult, ensure, loci_err};

/// Control flow out of a statement. `next` and `break` unwind the innermost
/// loop; `return` unwinds to the enclosing script-block receiver.
#[derive(Debug)]
pub enum Flow {
    Normal(Value),
    Next,
    Break,
    Return(Value),
}

/// The seam through which the interpreter reaches host-owned objects: object
/// property access, method dispatch, and host-registered functions. The
/// interpreter performs all class/signature checking before calling in.
pub trait Host {
    fn get_property(&mut self, obj: &ObjectValue, name: &str) -> LociResult<Value>;
    fn set_property(&mut self, obj: &ObjectValue, name: &str, value: &Value) -> LociResult<()>;
    fn call_method(&mut self, obj: &ObjectValue, name: &str, args: &[Value]) -> LociResult<Value>;
    fn call_function(&mut self, name: &str, args: &[Value]) -> LociResult<Value>;
}

/// A host that refuses all host traffic; standalone evaluation uses this.
pub struct NoHost;

impl Host for NoHost {
    fn get_property(&mut self, _obj: &ObjectValue, name: &str) -> LociResult<Value> {
        Err(loci_err!(Name: "property '{}' is not available without a host", name))
    }

    fn set_property(&mut self, _obj: &ObjectValue, name: &str, _value: &Value) -> LociResult<()> {
        Err(loci_err!(Name: "property '{}' is not available without a host", name))
    }

    fn call_method(&mut self, _obj: &ObjectValue, name: &str, _args: &[Value]) -> LociResult<Value> {
        Err(loci_err!(Name: "method '{}' is not available without a host", name))
    }

    fn call_function(&mut self, name: &str, _args: &[Value]) -> LociResult<Value> {
        Err(loci_err!(Name: "function '{}' is not available without a host", name))
    }
}

/// Tree-walking evaluator. Single-threaded and cooperative: a script runs to
/// completion or error, with no suspension points.
pub struct Interpreter<'a> {
    pub symbols: &'a mut Symbols,
    pub functions: &'a FunctionRegistry,
    pub host: &'a mut dyn Host,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        symbols: &'a mut Symbols,
        functions: &'a FunctionRegistry,
        host: &'a mut dyn Host,
    ) -> Self {
        Interpreter {
            symbols,
            functions,
            host,
        }
    }

    /// Tokenizes, parses, optimizes and evaluates a script in the current
    /// scope, returning the value of the last statement (or of `return`).
    pub fn run(&mut self, source: &str) -> LociResult<Value> {
        let tokens = tokenize(source)?;
        let mut statements = Parser::new(tokens).parse_program()?;
        for statement in &mut statements {
            optimize(statement, self.functions)?;
        }
        self.eval_statements(&statements)
    }

    pub fn eval_statements(&mut self, statements: &[AstNode]) -> LociResult<Value> {
        let mut last = Value::null().into_invisible();
        for statement in statements {
            match self.exec(statement)? {
                Flow::Normal(v) => last = v,
                Flow::Return(v) => return Ok(v),
                Flow::Next => {
                    return Err(
                        loci_err!(Parse: "'next' may only be used inside a loop")
                            .at(statement.pos()),
                    );
                }
                Flow::Break => {
                    return Err(
                        loci_err!(Parse: "'break' may only be used inside a loop")
                            .at(statement.pos()),
                    );
                }
            }
        }
        Ok(last)
    }

    pub fn exec(&mut self, node: &AstNode) -> LociResult<Flow> {
        match node.kind {
            NodeKind::Empty => Ok(Flow::Normal(Value::null().into_invisible())),
            NodeKind::Block => {
                if let Some(v) = &node.cached {
                    return Ok(Flow::Normal(v.clone()));
                }
                let mut last = Value::null().into_invisible();
                for child in &node.children {
                    match self.exec(child)? {
                        Flow::Normal(v) => last = v,
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal(last))
            }
            NodeKind::If => {
                let condition = self.eval(&node.children[0])?;
                if self.truthy(&condition, node.pos())? {
                    self.exec(&node.children[1])
                } else if node.children.len() > 2 {
                    self.exec(&node.children[2])
                } else {
                    Ok(Flow::Normal(Value::null().into_invisible()))
                }
            }
            NodeKind::While => {
                loop {
                    let condition = self.eval(&node.children[0])?;
                    if !self.truthy(&condition, node.pos())? {
                        break;
                    }
                    match self.exec(&node.children[1])? {
                        Flow::Normal(_) | Flow::Next => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::null().into_invisible()))
            }
            NodeKind::DoWhile => {
                loop {
                    match self.exec(&node.children[0])? {
                        Flow::Normal(_) | Flow::Next => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    let condition = self.eval(&node.children[1])?;
                    if !self.truthy(&condition, node.pos())? {
                        break;
                    }
                }
                Ok(Flow::Normal(Value::null().into_invisible()))
            }
            NodeKind::For => {
                let name = node.children[0]
                    .ident_name()
                    .map(str::to_string)
                    .unwrap_or_default();
                let sequence = self.eval(&node.children[1])?;
                'outer: for i in 0..sequence.count() {
                    let element = sequence.element(i).map_err(at(node))?;
                    self.symbols
                        .assign(&name, element)
                        .map_err(at(&node.children[0]))?;
                    match self.exec(&node.children[2])? {
                        Flow::Normal(_) | Flow::Next => {}
                        Flow::Break => break 'outer,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::null().into_invisible()))
            }
            NodeKind::Next => Ok(Flow::Next),
            NodeKind::Break => Ok(Flow::Break),
            NodeKind::Return => {
                if let Some(v) = &node.cached {
                    return Ok(Flow::Return(v.clone()));
                }
                let value = match node.children.first() {
                    Some(child) => self.eval(child)?,
                    None => Value::null().into_invisible(),
                };
                Ok(Flow::Return(value))
            }
            _ => Ok(Flow::Normal(self.eval(node)?)),
        }
    }

    pub fn eval(&mut self, node: &AstNode) -> LociResult<Value> {
        if let Some(v) = &node.cached {
            return Ok(v.clone());
        }

        match node.kind {
            NodeKind::IntLit => match node.token.kind {
                TokenKind::IntLit(v) => Ok(Value::int(v)),
                _ => Err(loci_err!(Internal: "malformed integer literal node").at(node.pos())),
            },
            NodeKind::FloatLit => match node.token.kind {
                TokenKind::FloatLit(v) => Ok(Value::float(v)),
                _ => Err(loci_err!(Internal: "malformed float literal node").at(node.pos())),
            },
            NodeKind::StrLit => match &node.token.kind {
                TokenKind::StrLit(v) => Ok(Value::string(v.clone())),
                _ => Err(loci_err!(Internal: "malformed string literal node").at(node.pos())),
            },
            NodeKind::Ident => {
                let name = node.ident_name().unwrap_or_default();
                self.symbols
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| loci_err!(Name: "undefined identifier '{}'", name).at(node.pos()))
            }
            NodeKind::Add => self.binary(node, ops::add),
            NodeKind::Sub => self.binary(node, ops::subtract),
            NodeKind::Mul => self.binary(node, ops::multiply),
            NodeKind::Div => self.binary(node, ops::divide),
            NodeKind::Mod => self.binary(node, ops::modulo),
            NodeKind::Pow => self.binary(node, ops::power),
            NodeKind::Range => self.binary(node, ops::range),
            NodeKind::And => self.binary(node, ops::and),
            NodeKind::Or => self.binary(node, ops::or),
            NodeKind::Eq => self.comparison(node, CompareOp::Eq),
            NodeKind::NotEq => self.comparison(node, CompareOp::NotEq),
            NodeKind::Lt => self.comparison(node, CompareOp::Lt),
            NodeKind::LtEq => self.comparison(node, CompareOp::LtEq),
            NodeKind::Gt => self.comparison(node, CompareOp::Gt),
            NodeKind::GtEq => self.comparison(node, CompareOp::GtEq),
            NodeKind::Neg => {
                let operand = self.eval(&node.children[0])?;
                ops::negate(&operand).map_err(at(node))
            }
            NodeKind::Pos => {
                let operand = self.eval(&node.children[0])?;
                ops::unary_plus(&operand).map_err(at(node))
            }
            NodeKind::Not => {
                let operand = self.eval(&node.children[0])?;
                ops::not(&operand).map_err(at(node))
            }
            NodeKind::Assign => {
                self.exec_assign(node)?;
                Ok(Value::null().into_invisible())
            }
            NodeKind::Subscript => {
                let base = self.eval(&node.children[0])?;
                let index = self.eval(&node.children[1])?;
                base.subscript(&index).map_err(at(node))
            }
            NodeKind::Member => self.get_property(node),
            NodeKind::Call => self.eval_call(node),
            _ => Err(loci_err!(Internal: "statement node in expression position").at(node.pos())),
        }
    }

    fn binary(
        &mut self,
        node: &AstNode,
        op: fn(&Value, &Value) -> LociResult<Value>,
    ) -> LociResult<Value> {
        let l = self.eval(&node.children[0])?;
        let r = self.eval(&node.children[1])?;
        op(&l, &r).map_err(at(node))
    }

    fn comparison(&mut self, node: &AstNode, op: CompareOp) -> LociResult<Value> {
        let l = self.eval(&node.children[0])?;
        let r = self.eval(&node.children[1])?;
        ops::compare(&l, &r, op).map_err(at(node))
    }

    fn exec_assign(&mut self, node: &AstNode) -> LociResult<()> {
        let target = &node.children[0];
        let value = self.eval(&node.children[1])?;

        match target.kind {
            NodeKind::Ident => {
                let name = target.ident_name().unwrap_or_default();
                self.symbols
                    .assign(name, value)
                    .map_err(at(target))
            }
            NodeKind::Subscript => {
                let base = &target.children[0];
                let name = match base.kind {
                    NodeKind::Ident => base.ident_name().unwrap_or_default().to_string(),
                    _ => {
                        return Err(loci_err!(
                            Type: "subscripted assignment requires a simple variable on the left"
                        )
                        .at(base.pos()));
                    }
                };
                let index = self.eval(&target.children[1])?;
                let slot = self.symbols.lookup_mut(&name).map_err(at(base))?;
                slot.assign_subscript(&index, &value).map_err(at(target))
            }
            NodeKind::Member => {
                let object = self.eval(&target.children[0])?;
                let name = property_name(target);
                let obj = object.as_object().map_err(at(target))?;
                let class = obj.class().ok_or_else(|| {
                    loci_err!(Name: "property '{}' on an object with no element class", name)
                        .at(target.pos())
                })?;
                let spec = class.property(name).ok_or_else(|| {
                    loci_err!(Name: "class {} has no property '{}'", class.name, name)
                        .at(target.pos())
                })?;
                ensure!(
                    !spec.read_only,
                    Name: "property '{}' of class {} is read-only", name, class.name
                );
                ensure!(
                    spec.mask.accepts(value.kind()),
                    Type: "property '{}' of class {} requires {}, but {} was supplied",
                    name, class.name, spec.mask.describe(), value.kind().name()
                );
                self.host.set_property(obj, name, &value).map_err(at(target))
            }
            _ => Err(loci_err!(Parse: "invalid assignment target").at(target.pos())),
        }
    }

    fn get_property(&mut self, node: &AstNode) -> LociResult<Value> {
        let object = self.eval(&node.children[0])?;
        let name = property_name(node);
        let obj = object.as_object().map_err(at(node))?;
        let class = obj.class().ok_or_else(|| {
            loci_err!(Name: "property '{}' on an object with no element class", name).at(node.pos())
        })?;
        let spec = class.property(name).ok_or_else(|| {
            loci_err!(Name: "class {} has no property '{}'", class.name, name).at(node.pos())
        })?;

        let result = self.host.get_property(obj, name).map_err(at(node))?;
        if !spec.mask.accepts(result.kind()) && !result.is_null() {
            return Err(loci_err!(
                Internal: "property '{}' of class {} produced {}, which violates its declared type of {}",
                name, class.name, result.kind().name(), spec.mask.describe()
            )
            .at(node.pos()));
        }
        Ok(result)
    }

    fn eval_call(&mut self, node: &AstNode) -> LociResult<Value> {
        let callee = &node.children[0];

        if callee.kind == NodeKind::Member {
            return self.eval_method_call(node);
        }

        ensure!(
            callee.kind == NodeKind::Ident,
            Type: "expression is not callable"
        );
        let name = callee.ident_name().unwrap_or_default();
        let def = match &node.resolved {
            Some(def) => def.clone(),
            None => self
                .functions
                .get(name)
                .cloned()
                .ok_or_else(|| loci_err!(Name: "unrecognized function name '{}'", name).at(callee.pos()))?,
        };

        let mut args = Vec::with_capacity(node.children.len() - 1);
        for child in &node.children[1..] {
            args.push(self.eval(child)?);
        }

        def.signature.check_args("function", &args).map_err(at(node))?;

        let result = match def.imp {
            FunctionImpl::Builtin(f) => f(self, &args).map_err(at(node))?,
            FunctionImpl::Host => self
                .host
                .call_function(def.signature.name, &args)
                .map_err(at(node))?,
        };
        def.signature.check_return("function", &result).map_err(at(node))?;
        Ok(result)
    }

    fn eval_method_call(&mut self, node: &AstNode) -> LociResult<Value> {
        let callee = &node.children[0];
        let object = self.eval(&callee.children[0])?;
        let name = property_name(callee);

        let mut args = Vec::with_capacity(node.children.len() - 1);
        for child in &node.children[1..] {
            args.push(self.eval(child)?);
        }

        let obj = object.as_object().map_err(at(node))?;
        let class = obj.class().ok_or_else(|| {
            loci_err!(Name: "method '{}' on an object with no element class", name).at(node.pos())
        })?;
        let signature = class
            .find_method(name)
            .ok_or_else(|| {
                loci_err!(Name: "class {} has no method '{}'", class.name, name).at(node.pos())
            })?
            .clone();

        signature.check_args("method", &args).map_err(at(node))?;
        let result = self.host.call_method(obj, name, &args).map_err(at(node))?;
        signature.check_return("method", &result).map_err(at(node))?;
        Ok(result)
    }

    /// Loop and `if` conditions must be singleton and coercible to logical;
    /// non-zero numerics are true and NAN raises.
    pub fn truthy(&self, value: &Value, pos: usize) -> LociResult<bool> {
        if value.count() != 1 {
            return Err(loci_err!(
                Shape: "a condition must be a singleton, but a {} of size {} was supplied",
                value.kind().name(), value.count()
            )
            .at(pos));
        }
        match value.kind() {
            ValueKind::Logical | ValueKind::Int | ValueKind::Float => {
                value.logical_at(0).map_err(|e| e.at(pos))
            }
            kind => Err(loci_err!(Type: "{} cannot be used as a condition", kind.name()).at(pos)),
        }
    }
}

fn property_name(node: &AstNode) -> &'static str {
    if let Some(name) = node.interned {
        return name;
    }
    // Fallback for trees evaluated without an optimize pass.
    let name = node
        .children
        .get(1)
        .and_then(|c| c.ident_name())
        .unwrap_or("");
    crate::ast::intern_name(name)
}

fn at(node: &AstNode) -> impl Fn(LociError) -> LociError + '_ {
    move |e| e.at(node.pos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;

    fn eval_script(source: &str) -> LociResult<Value> {
        let mut symbols = Symbols::new();
        let functions = FunctionRegistry::base();
        let mut host = NoHost;
        Interpreter::new(&mut symbols, &functions, &mut host).run(source)
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval_script("1 + 2 * 3;").unwrap(), Value::int(7));
        assert_eq!(eval_script("(1 + 2) * 3;").unwrap(), Value::int(9));
        assert_eq!(eval_script("2 ^ 3 ^ 2;").unwrap(), Value::float(512.0));
        assert_eq!(eval_script("7 % 3;").unwrap(), Value::float(1.0));
    }

    #[test]
    fn test_variables_and_loops() {
        let v = eval_script("total = 0; for (i in 1:100) total = total + i; total;").unwrap();
        assert_eq!(v, Value::int(5050));

        let v = eval_script(
            "n = 0; while (n < 10) { n = n + 1; if (n == 5) break; } n;",
        )
        .unwrap();
        assert_eq!(v, Value::int(5));

        let v = eval_script(
            "kept = 0; for (i in 1:10) { if (i % 2 == 0) next; kept = kept + i; } kept;",
        )
        .unwrap();
        assert_eq!(v, Value::int(25));

        let v = eval_script("n = 0; do n = n + 1; while (n < 3); n;").unwrap();
        assert_eq!(v, Value::int(3));
    }

    #[test]
    fn test_constants_are_protected() {
        let err = eval_script("T = 1;").unwrap_err();
        assert!(err.message().contains("constant"));
        assert!(eval_script("PI;").unwrap().float_at(0).unwrap() > 3.14);
    }

    #[test]
    fn test_subscript_assignment_scenario() {
        let v = eval_script("x = 1:5; x[x % 2 == 1] = 10; x;").unwrap();
        assert_eq!(v.int_values().unwrap(), vec![10, 2, 10, 4, 10]);
    }

    #[test]
    fn test_broadcast_error_message() {
        let err = eval_script("(15:12) + (0:2);").unwrap_err();
        assert!(err.message().contains("requires that either"));

        let v = eval_script("(15:13) + (0:2);").unwrap();
        assert_eq!(v.int_values().unwrap(), vec![15, 15, 15]);
    }

    #[test]
    fn test_return_unwinds() {
        let v = eval_script("for (i in 1:10) { if (i == 4) return i * 100; } 0;").unwrap();
        assert_eq!(v, Value::int(400));
    }

    #[test]
    fn test_condition_rules() {
        assert_eq!(eval_script("if (3) 1; else 2;").unwrap(), Value::int(1));
        assert!(eval_script("if (NAN) 1;").is_err());
        assert!(eval_script("if (1:3) 1;").is_err());
        assert!(eval_script("if ('yes') 1;").is_err());
    }

    #[test]
    fn test_undefined_identifier() {
        let err = eval_script("undefinedThing + 1;").unwrap_err();
        assert!(err.message().contains("undefined identifier"));
        assert_eq!(err.pos(), Some(0));
    }
}
