use super::FunctionRegistry;
use crate::interpreter::Interpreter;
use crate::signature::{Signature, TypeMask};
use crate::value::{Value, ValueKind};
use loci_error::{LociResult, loci_bail};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        Signature::new("abs", TypeMask::NUMERIC).arg("x", TypeMask::NUMERIC),
        abs,
    );
    registry.register(
        Signature::new("ceil", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::ceil),
    );
    registry.register(
        Signature::new("floor", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::floor),
    );
    registry.register(
        Signature::new("round", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::round),
    );
    registry.register(
        Signature::new("trunc", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::trunc),
    );
    registry.register(
        Signature::new("exp", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::exp),
    );
    registry.register(
        Signature::new("log", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::ln),
    );
    registry.register(
        Signature::new("log10", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::log10),
    );
    registry.register(
        Signature::new("log2", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::log2),
    );
    registry.register(
        Signature::new("sqrt", TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        |i, a| float_map(i, a, f64::sqrt),
    );
    registry.register(
        Signature::new("sum", TypeMask::NUMERIC)
            .arg("x", TypeMask::LOGICAL | TypeMask::NUMERIC),
        sum,
    );
    registry.register(
        Signature::new("product", TypeMask::NUMERIC).arg("x", TypeMask::NUMERIC),
        product,
    );
    registry.register(
        Signature::new("max", TypeMask::NULL | TypeMask::BASE).arg("x", TypeMask::BASE),
        |i, a| extremum(i, a, true),
    );
    registry.register(
        Signature::new("min", TypeMask::NULL | TypeMask::BASE).arg("x", TypeMask::BASE),
        |i, a| extremum(i, a, false),
    );
    registry.register(
        Signature::new("mean", TypeMask::NULL | TypeMask::FLOAT)
            .arg("x", TypeMask::LOGICAL | TypeMask::NUMERIC),
        mean,
    );
    registry.register(
        Signature::new("sd", TypeMask::NULL | TypeMask::FLOAT).arg("x", TypeMask::NUMERIC),
        sd,
    );
    registry.register(
        Signature::new("isFinite", TypeMask::LOGICAL).arg("x", TypeMask::NUMERIC),
        |i, a| float_test(i, a, |x| x.is_finite()),
    );
    registry.register(
        Signature::new("isInfinite", TypeMask::LOGICAL).arg("x", TypeMask::NUMERIC),
        |i, a| float_test(i, a, |x| x.is_infinite()),
    );
    registry.register(
        Signature::new("isNAN", TypeMask::LOGICAL).arg("x", TypeMask::NUMERIC),
        |i, a| float_test(i, a, |x| x.is_nan()),
    );
}

fn float_map(
    _interp: &mut Interpreter<'_>,
    args: &[Value],
    f: fn(f64) -> f64,
) -> LociResult<Value> {
    let out = args[0]
        .float_values()?
        .into_iter()
        .map(f)
        .collect::<Vec<f64>>();
    Ok(Value::float_vec(out))
}

fn float_test(
    _interp: &mut Interpreter<'_>,
    args: &[Value],
    f: fn(f64) -> bool,
) -> LociResult<Value> {
    let out = args[0]
        .float_values()?
        .into_iter()
        .map(f)
        .collect::<Vec<bool>>();
    Ok(Value::logical_vec(out))
}

fn abs(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Int {
        let mut out = Vec::with_capacity(x.count());
        for v in x.int_values()? {
            match v.checked_abs() {
                Some(a) => out.push(a),
                None => loci_bail!(Numeric: "integer overflow taking abs({})", v),
            }
        }
        return Ok(Value::int_vec(out));
    }
    Ok(Value::float_vec(
        x.float_values()?.into_iter().map(f64::abs).collect(),
    ))
}

fn sum(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Float {
        return Ok(Value::float(x.float_values()?.into_iter().sum()));
    }
    let mut total = 0i64;
    for v in x.int_values()? {
        total = match total.checked_add(v) {
            Some(t) => t,
            None => loci_bail!(Numeric: "integer overflow in sum()"),
        };
    }
    Ok(Value::int(total))
}

fn product(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.kind() == ValueKind::Float {
        return Ok(Value::float(x.float_values()?.into_iter().product()));
    }
    let mut total = 1i64;
    for v in x.int_values()? {
        total = match total.checked_mul(v) {
            Some(t) => t,
            None => loci_bail!(Numeric: "integer overflow in product()"),
        };
    }
    Ok(Value::int(total))
}

fn extremum(_interp: &mut Interpreter<'_>, args: &[Value], want_max: bool) -> LociResult<Value> {
    let x = &args[0];
    if x.count() == 0 {
        return Ok(Value::null());
    }

    match x.kind() {
        ValueKind::Str => {
            let values = x.string_values()?;
            let best = if want_max {
                values.into_iter().max()
            } else {
                values.into_iter().min()
            };
            Ok(Value::string(best.unwrap()))
        }
        ValueKind::Float => {
            let values = x.float_values()?;
            let best = values
                .into_iter()
                .reduce(|a, b| {
                    if (want_max && b > a) || (!want_max && b < a) { b } else { a }
                })
                .unwrap();
            Ok(Value::float(best))
        }
        _ => {
            let values = x.int_values()?;
            let best = if want_max {
                values.into_iter().max()
            } else {
                values.into_iter().min()
            };
            if x.kind() == ValueKind::Logical {
                Ok(Value::logical(best.unwrap() != 0))
            } else {
                Ok(Value::int(best.unwrap()))
            }
        }
    }
}

fn mean(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.count() == 0 {
        return Ok(Value::null());
    }
    let values = x.float_values()?;
    Ok(Value::float(
        values.iter().sum::<f64>() / values.len() as f64,
    ))
}

fn sd(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.count() < 2 {
        return Ok(Value::null());
    }
    let values = x.float_values()?;
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
        / (values.len() - 1) as f64;
    Ok(Value::float(variance.sqrt()))
}
