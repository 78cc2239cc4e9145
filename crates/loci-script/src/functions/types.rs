use super::FunctionRegistry;
use crate::interpreter::Interpreter;
use crate::signature::{Signature, TypeMask};
use crate::value::{Value, ValueKind};
use loci_error::{LociResult, loci_err};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        Signature::new("isNULL", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Null),
    );
    registry.register(
        Signature::new("isLogical", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Logical),
    );
    registry.register(
        Signature::new("isInteger", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Int),
    );
    registry.register(
        Signature::new("isFloat", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Float),
    );
    registry.register(
        Signature::new("isString", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Str),
    );
    registry.register(
        Signature::new("isObject", TypeMask::LOGICAL).arg("x", TypeMask::ANY),
        |i, a| kind_test(i, a, ValueKind::Object),
    );
    registry.register(
        Signature::new("asLogical", TypeMask::LOGICAL).arg("x", TypeMask::BASE),
        as_logical,
    );
    registry.register(
        Signature::new("asInteger", TypeMask::INT).arg("x", TypeMask::BASE),
        as_integer,
    );
    registry.register(
        Signature::new("asFloat", TypeMask::FLOAT).arg("x", TypeMask::BASE),
        as_float,
    );
    registry.register(
        Signature::new("asString", TypeMask::STR).arg("x", TypeMask::NULL | TypeMask::BASE),
        as_string,
    );
    registry.register(
        Signature::new("size", TypeMask::INT).arg("x", TypeMask::ANY),
        |_i, a| Ok(Value::int(a[0].count() as i64)),
    );
    registry.register(
        Signature::new("elementType", TypeMask::STR).arg("x", TypeMask::ANY),
        element_type,
    );
}

fn kind_test(_interp: &mut Interpreter<'_>, args: &[Value], kind: ValueKind) -> LociResult<Value> {
    Ok(Value::logical(args[0].kind() == kind))
}

fn as_logical(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Str {
        let mut out = Vec::with_capacity(x.count());
        for s in x.string_values()? {
            match s.as_str() {
                "T" | "TRUE" | "true" => out.push(true),
                "F" | "FALSE" | "false" => out.push(false),
                other => {
                    return Err(
                        loci_err!(Type: "'{}' cannot be converted to logical", other),
                    );
                }
            }
        }
        return Ok(Value::logical_vec(out));
    }
    Ok(Value::logical_vec(x.logical_values()?))
}

fn as_integer(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Str {
        let mut out = Vec::with_capacity(x.count());
        for s in x.string_values()? {
            let v = s
                .parse::<i64>()
                .map_err(|_| loci_err!(Type: "'{}' cannot be converted to integer", s))?;
            out.push(v);
        }
        return Ok(Value::int_vec(out));
    }
    Ok(Value::int_vec(x.int_values()?))
}

fn as_float(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Str {
        let mut out = Vec::with_capacity(x.count());
        for s in x.string_values()? {
            let v = s
                .parse::<f64>()
                .map_err(|_| loci_err!(Type: "'{}' cannot be converted to float", s))?;
            out.push(v);
        }
        return Ok(Value::float_vec(out));
    }
    Ok(Value::float_vec(x.float_values()?))
}

fn as_string(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.is_null() {
        return Ok(Value::string("NULL"));
    }
    Ok(Value::string_vec(x.string_values()?))
}

fn element_type(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    let name = match x.kind() {
        ValueKind::Object => x
            .as_object()?
            .class()
            .map(|c| c.name)
            .unwrap_or("Object"),
        kind => kind.name(),
    };
    Ok(Value::string(name))
}
