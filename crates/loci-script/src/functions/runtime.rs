use super::{FunctionImpl, FunctionRegistry};
use crate::ast::optimize;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::signature::{Signature, TypeMask};
use crate::token::tokenize;
use crate::value::Value;
use loci_error::{LociResult, loci_err};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        Signature::new("print", TypeMask::NULL).arg("x", TypeMask::ANY),
        print,
    );
    registry.register(
        Signature::new("cat", TypeMask::NULL)
            .arg("x", TypeMask::ANY)
            .opt_singleton_arg("sep", TypeMask::STR),
        cat,
    );
    registry.register(
        Signature::new("defineConstant", TypeMask::NULL)
            .singleton_arg("symbol", TypeMask::STR)
            .arg("value", TypeMask::ANY),
        define_constant,
    );
    registry.register(
        Signature::new("rm", TypeMask::NULL)
            .opt_arg("variableNames", TypeMask::STR)
            .opt_singleton_arg("removeConstants", TypeMask::LOGICAL),
        rm,
    );
    registry.register(
        Signature::new("exists", TypeMask::LOGICAL).singleton_arg("symbol", TypeMask::STR),
        exists,
    );
    registry.register(Signature::new("ls", TypeMask::STR), ls);
    registry.register(
        Signature::new("apply", TypeMask::ANY)
            .arg("x", TypeMask::ANY)
            .singleton_arg("lambdaSource", TypeMask::STR),
        apply,
    );
    registry.register(
        Signature::new("executeLambda", TypeMask::ANY)
            .singleton_arg("lambdaSource", TypeMask::STR),
        execute_lambda,
    );
    registry.register(
        Signature::new("doCall", TypeMask::ANY)
            .singleton_arg("functionName", TypeMask::STR)
            .ellipsis(TypeMask::ANY),
        do_call,
    );
    registry.register(
        Signature::new("stop", TypeMask::NULL).opt_singleton_arg("message", TypeMask::STR),
        stop,
    );
}

fn print(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    println!("{}", args[0]);
    Ok(Value::null().into_invisible())
}

fn cat(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let sep = match args.get(1) {
        Some(v) => v.string_at(0)?,
        None => " ".to_string(),
    };
    let parts: Vec<String> = (0..args[0].count())
        .map(|i| args[0].string_at(i))
        .collect::<LociResult<_>>()?;
    print!("{}", parts.join(&sep));
    Ok(Value::null().into_invisible())
}

fn define_constant(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let name = args[0].string_at(0)?;
    interp.symbols.define_constant(&name, args[1].clone())?;
    Ok(Value::null().into_invisible())
}

fn rm(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    // removeConstants is accepted for compatibility; constants always refuse
    // removal regardless.
    let names = match args.first() {
        Some(v) => v.string_values()?,
        None => interp.symbols.defined_names(),
    };
    for name in names {
        interp.symbols.remove(&name)?;
    }
    Ok(Value::null().into_invisible())
}

fn exists(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let name = args[0].string_at(0)?;
    Ok(Value::logical(interp.symbols.is_defined(&name)))
}

fn ls(interp: &mut Interpreter<'_>, _args: &[Value]) -> LociResult<Value> {
    Ok(Value::string_vec(interp.symbols.defined_names()))
}

/// Evaluates the lambda once per element of `x` with `applyValue` bound in a
/// transient scope; results concatenate by the rules of `c()`.
fn apply(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = args[0].clone();
    let source = args[1].string_at(0)?;

    let tokens = tokenize(&source)?;
    let mut statements = Parser::new(tokens).parse_program()?;
    for statement in &mut statements {
        optimize(statement, interp.functions)?;
    }

    let mut parts = Vec::with_capacity(x.count());
    for i in 0..x.count() {
        let element = x.element(i)?;
        interp.symbols.push_scope();
        interp.symbols.set_local("applyValue", element);
        let result = interp.eval_statements(&statements);
        interp.symbols.pop_scope();
        parts.push(result?);
    }
    Value::concat(&parts)
}

fn execute_lambda(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let source = args[0].string_at(0)?;
    interp.run(&source)
}

fn do_call(interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let name = args[0].string_at(0)?;
    let def = interp
        .functions
        .get(&name)
        .cloned()
        .ok_or_else(|| loci_err!(Name: "unrecognized function name '{}'", name))?;

    let rest = &args[1..];
    def.signature.check_args("function", rest)?;
    let result = match def.imp {
        FunctionImpl::Builtin(f) => f(interp, rest)?,
        FunctionImpl::Host => interp.host.call_function(def.signature.name, rest)?,
    };
    def.signature.check_return("function", &result)?;
    Ok(result)
}

fn stop(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let message = match args.first() {
        Some(v) => v.string_at(0)?,
        None => "stop() called".to_string(),
    };
    Err(loci_err!(Simulation: "{}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::NoHost;
    use crate::symbols::Symbols;

    fn eval_in(symbols: &mut Symbols, source: &str) -> LociResult<Value> {
        let functions = FunctionRegistry::base();
        let mut host = NoHost;
        Interpreter::new(symbols, &functions, &mut host).run(source)
    }

    #[test]
    fn test_define_constant_round_trip() {
        let mut symbols = Symbols::new();
        eval_in(&mut symbols, "defineConstant('K', 500);").unwrap();
        assert_eq!(eval_in(&mut symbols, "K;").unwrap(), Value::int(500));

        let err = eval_in(&mut symbols, "K = 1;").unwrap_err();
        assert!(err.message().contains("constant"));
        let err = eval_in(&mut symbols, "defineConstant('K', 2);").unwrap_err();
        assert!(err.message().contains("already defined"));
        let err = eval_in(&mut symbols, "rm('K', T);").unwrap_err();
        assert!(err.message().contains("cannot be removed"));
    }

    #[test]
    fn test_rm_and_exists() {
        let mut symbols = Symbols::new();
        eval_in(&mut symbols, "x = 1; y = 2;").unwrap();
        assert!(eval_in(&mut symbols, "exists('x');").unwrap().logical_at(0).unwrap());
        eval_in(&mut symbols, "rm('x');").unwrap();
        assert!(!eval_in(&mut symbols, "exists('x');").unwrap().logical_at(0).unwrap());
        assert!(eval_in(&mut symbols, "exists('y');").unwrap().logical_at(0).unwrap());
    }

    #[test]
    fn test_apply_binds_apply_value() {
        let mut symbols = Symbols::new();
        let v = eval_in(&mut symbols, "apply(1:4, 'applyValue * 10;');").unwrap();
        assert_eq!(v.int_values().unwrap(), vec![10, 20, 30, 40]);
        // The binding is transient.
        assert!(!eval_in(&mut symbols, "exists('applyValue');").unwrap().logical_at(0).unwrap());
    }

    #[test]
    fn test_execute_lambda_shares_scope() {
        let mut symbols = Symbols::new();
        eval_in(&mut symbols, "x = 5; executeLambda('x = x + 1;');").unwrap();
        assert_eq!(eval_in(&mut symbols, "x;").unwrap(), Value::int(6));
    }

    #[test]
    fn test_do_call() {
        let mut symbols = Symbols::new();
        let v = eval_in(&mut symbols, "doCall('sum', 1:10);").unwrap();
        assert_eq!(v, Value::int(55));

        let err = eval_in(&mut symbols, "doCall('nonsense');").unwrap_err();
        assert!(err.message().contains("unrecognized function name"));
    }

    #[test]
    fn test_stop() {
        let mut symbols = Symbols::new();
        let err = eval_in(&mut symbols, "stop('boom');").unwrap_err();
        assert_eq!(err.message(), "boom");
    }
}
