//! Element-wise operator kernels over [Value] operands: numeric promotion,
//! broadcasting, checked integer arithmetic, and the comparison/logical/range
//! semantics of the language.

use super::{Value, ValueKind};
use loci_error::{LociResult, ensure, loci_bail, loci_err};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Vector-vector operations require equal lengths or one singleton side.
fn broadcast(op: &str, l: usize, r: usize) -> LociResult<usize> {
    if l == r {
        Ok(l)
    } else if l == 1 {
        Ok(r)
    } else if r == 1 {
        Ok(l)
    } else {
        Err(loci_err!(
            Shape: "the '{}' operator requires that either both operands have the same size, or that one operand is a singleton ({} vs {})",
            op, l, r
        ))
    }
}

#[inline]
fn pick(index: usize, len: usize) -> usize {
    if len == 1 { 0 } else { index }
}

fn reject_null(op: &str, l: &Value, r: &Value) -> LociResult<()> {
    ensure!(
        !l.is_null() && !r.is_null(),
        Type: "NULL is not a valid operand for the '{}' operator", op
    );
    Ok(())
}

fn numeric_operand(op: &str, v: &Value) -> LociResult<()> {
    match v.kind() {
        ValueKind::Int | ValueKind::Float => Ok(()),
        kind => Err(loci_err!(
            Type: "the '{}' operator cannot operate on an operand of type {}", op, kind.name()
        )),
    }
}

pub fn add(l: &Value, r: &Value) -> LociResult<Value> {
    reject_null("+", l, r)?;

    // String + anything concatenates, stringifying the other side.
    if l.kind() == ValueKind::Str || r.kind() == ValueKind::Str {
        ensure!(
            l.kind().is_base() && r.kind().is_base(),
            Type: "the '+' operator cannot concatenate an object operand"
        );
        let n = broadcast("+", l.count(), r.count())?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let a = l.string_at(pick(i, l.count()))?;
            let b = r.string_at(pick(i, r.count()))?;
            out.push(format!("{}{}", a, b));
        }
        return Ok(Value::string_vec(out));
    }

    int_preserving(l, r, "+", i64::checked_add, |a, b| a + b)
}

pub fn subtract(l: &Value, r: &Value) -> LociResult<Value> {
    reject_null("-", l, r)?;
    int_preserving(l, r, "-", i64::checked_sub, |a, b| a - b)
}

pub fn multiply(l: &Value, r: &Value) -> LociResult<Value> {
    reject_null("*", l, r)?;
    int_preserving(l, r, "*", i64::checked_mul, |a, b| a * b)
}

/// Integer `+ - *` stay integer and raise on overflow; a float on either side
/// promotes the whole operation to float.
fn int_preserving(
    l: &Value,
    r: &Value,
    op: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> LociResult<Value> {
    numeric_operand(op, l)?;
    numeric_operand(op, r)?;
    let n = broadcast(op, l.count(), r.count())?;

    if l.kind() == ValueKind::Float || r.kind() == ValueKind::Float {
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let a = l.float_at(pick(i, l.count()))?;
            let b = r.float_at(pick(i, r.count()))?;
            out.push(float_op(a, b));
        }
        return Ok(Value::float_vec(out));
    }

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let a = l.int_at(pick(i, l.count()))?;
        let b = r.int_at(pick(i, r.count()))?;
        match int_op(a, b) {
            Some(v) => out.push(v),
            None => loci_bail!(
                Numeric: "integer overflow in the '{}' operator with operands {} and {}", op, a, b
            ),
        }
    }
    Ok(Value::int_vec(out))
}

/// Division always produces float, so `x/0` is ±INF and `0/0` is NAN.
pub fn divide(l: &Value, r: &Value) -> LociResult<Value> {
    float_binary(l, r, "/", |a, b| a / b)
}

pub fn modulo(l: &Value, r: &Value) -> LociResult<Value> {
    float_binary(l, r, "%", |a, b| a % b)
}

pub fn power(l: &Value, r: &Value) -> LociResult<Value> {
    float_binary(l, r, "^", f64::powf)
}

fn float_binary(l: &Value, r: &Value, op: &str, f: fn(f64, f64) -> f64) -> LociResult<Value> {
    reject_null(op, l, r)?;
    numeric_operand(op, l)?;
    numeric_operand(op, r)?;
    let n = broadcast(op, l.count(), r.count())?;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let a = l.float_at(pick(i, l.count()))?;
        let b = r.float_at(pick(i, r.count()))?;
        out.push(f(a, b));
    }
    Ok(Value::float_vec(out))
}

pub fn negate(v: &Value) -> LociResult<Value> {
    ensure!(!v.is_null(), Type: "NULL is not a valid operand for the unary '-' operator");
    match v.kind() {
        ValueKind::Int => {
            let mut out = Vec::with_capacity(v.count());
            for i in 0..v.count() {
                let a = v.int_at(i)?;
                match a.checked_neg() {
                    Some(n) => out.push(n),
                    None => loci_bail!(Numeric: "integer overflow negating {}", a),
                }
            }
            Ok(Value::int_vec(out))
        }
        ValueKind::Float => {
            let out = (0..v.count())
                .map(|i| v.float_at(i).map(|x| -x))
                .collect::<LociResult<Vec<f64>>>()?;
            Ok(Value::float_vec(out))
        }
        kind => Err(loci_err!(
            Type: "the unary '-' operator cannot operate on an operand of type {}", kind.name()
        )),
    }
}

pub fn unary_plus(v: &Value) -> LociResult<Value> {
    ensure!(!v.is_null(), Type: "NULL is not a valid operand for the unary '+' operator");
    numeric_operand("+", v)?;
    Ok(v.clone())
}

pub fn not(v: &Value) -> LociResult<Value> {
    ensure!(!v.is_null(), Type: "NULL is not a valid operand for the '!' operator");
    let out = (0..v.count())
        .map(|i| v.logical_at(i).map(|b| !b))
        .collect::<LociResult<Vec<bool>>>()?;
    Ok(Value::logical_vec(out))
}

pub fn and(l: &Value, r: &Value) -> LociResult<Value> {
    logical_binary(l, r, "&", |a, b| a && b)
}

pub fn or(l: &Value, r: &Value) -> LociResult<Value> {
    logical_binary(l, r, "|", |a, b| a || b)
}

fn logical_binary(l: &Value, r: &Value, op: &str, f: fn(bool, bool) -> bool) -> LociResult<Value> {
    reject_null(op, l, r)?;
    for v in [l, r] {
        match v.kind() {
            ValueKind::Logical | ValueKind::Int | ValueKind::Float => {}
            kind => loci_bail!(
                Type: "the '{}' operator cannot operate on an operand of type {}", op, kind.name()
            ),
        }
    }
    let n = broadcast(op, l.count(), r.count())?;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let a = l.logical_at(pick(i, l.count()))?;
        let b = r.logical_at(pick(i, r.count()))?;
        out.push(f(a, b));
    }
    Ok(Value::logical_vec(out))
}

/// Comparisons coerce to the highest base type present; objects compare only
/// with objects, and only for identity. NAN compares unequal to everything,
/// itself included.
pub fn compare(l: &Value, r: &Value, op: CompareOp) -> LociResult<Value> {
    ensure!(
        !l.is_null() && !r.is_null(),
        Type: "testing NULL with the '{}' operator is an error", op.symbol()
    );

    let l_obj = l.kind() == ValueKind::Object;
    let r_obj = r.kind() == ValueKind::Object;
    if l_obj || r_obj {
        ensure!(
            l_obj && r_obj,
            Type: "the '{}' operator cannot compare object and non-object operands", op.symbol()
        );
        ensure!(
            matches!(op, CompareOp::Eq | CompareOp::NotEq),
            Type: "the '{}' operator cannot order object operands", op.symbol()
        );
        let n = broadcast(op.symbol(), l.count(), r.count())?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let a = l.object_at(pick(i, l.count()))?;
            let b = r.object_at(pick(i, r.count()))?;
            let eq = a.ptr_eq(b);
            out.push(if op == CompareOp::Eq { eq } else { !eq });
        }
        return Ok(Value::logical_vec(out));
    }

    let rank = l
        .kind()
        .promotion_rank()
        .unwrap_or(0)
        .max(r.kind().promotion_rank().unwrap_or(0));
    let n = broadcast(op.symbol(), l.count(), r.count())?;
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let li = pick(i, l.count());
        let ri = pick(i, r.count());
        let result = match rank {
            4 => {
                let a = l.string_at(li)?;
                let b = r.string_at(ri)?;
                apply_ordering(op, a.cmp(&b))
            }
            3 => {
                let a = l.float_at(li)?;
                let b = r.float_at(ri)?;
                match a.partial_cmp(&b) {
                    Some(ordering) => apply_ordering(op, ordering),
                    None => op == CompareOp::NotEq,
                }
            }
            _ => {
                let a = l.int_at(li)?;
                let b = r.int_at(ri)?;
                apply_ordering(op, a.cmp(&b))
            }
        };
        out.push(result);
    }

    Ok(Value::logical_vec(out))
}

fn apply_ordering(op: CompareOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Eq => ordering == Equal,
        CompareOp::NotEq => ordering != Equal,
        CompareOp::Lt => ordering == Less,
        CompareOp::LtEq => ordering != Greater,
        CompareOp::Gt => ordering == Greater,
        CompareOp::GtEq => ordering != Less,
    }
}

const MAX_RANGE_LEN: i64 = 100_000_000;

/// `a:b` over singleton numeric endpoints. Integer endpoints give a
/// contiguous int vector, ascending or descending; float endpoints step by
/// ±1.0. NAN or infinite endpoints raise.
pub fn range(l: &Value, r: &Value) -> LociResult<Value> {
    reject_null(":", l, r)?;
    numeric_operand(":", l)?;
    numeric_operand(":", r)?;
    ensure!(
        l.count() == 1 && r.count() == 1,
        Shape: "the ':' operator requires singleton operands"
    );

    if l.kind() == ValueKind::Int && r.kind() == ValueKind::Int {
        let a = l.int_at(0)?;
        let b = r.int_at(0)?;
        let span = (b as i128 - a as i128).abs();
        ensure!(span < MAX_RANGE_LEN as i128, Numeric: "the ':' operator range is too large");
        let out: Vec<i64> = if a <= b {
            (a..=b).collect()
        } else {
            (b..=a).rev().collect()
        };
        return Ok(Value::int_vec(out));
    }

    let a = l.float_at(0)?;
    let b = r.float_at(0)?;
    ensure!(
        a.is_finite() && b.is_finite(),
        Numeric: "the ':' operator cannot accept NAN or INF endpoints"
    );
    let count = (b - a).abs().floor() as i64 + 1;
    ensure!(count < MAX_RANGE_LEN, Numeric: "the ':' operator range is too large");
    let step = if a <= b { 1.0 } else { -1.0 };
    let out: Vec<f64> = (0..count).map(|i| a + i as f64 * step).collect();
    Ok(Value::float_vec(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_error::ErrorCode;

    #[test]
    fn test_broadcast_add() {
        let l = Value::int_vec(vec![15, 14, 13]);
        let r = Value::int_vec(vec![0, 1, 2]);
        assert_eq!(add(&l, &r).unwrap().int_values().unwrap(), vec![15, 15, 15]);

        let l = Value::int_vec(vec![15, 14, 13, 12]);
        let err = add(&l, &r).unwrap_err();
        assert!(err.message().contains("requires that either"));
        assert_eq!(err.code(), ErrorCode::Shape);

        let one = Value::int(10);
        assert_eq!(
            add(&one, &r).unwrap().int_values().unwrap(),
            vec![10, 11, 12]
        );
    }

    #[test]
    fn test_promotion_and_division() {
        let v = add(&Value::int(1), &Value::float(0.5)).unwrap();
        assert_eq!(v.kind(), ValueKind::Float);

        let v = divide(&Value::int(7), &Value::int(2)).unwrap();
        assert_eq!(v.kind(), ValueKind::Float);
        assert_eq!(v.float_at(0).unwrap(), 3.5);

        let v = divide(&Value::int(1), &Value::int(0)).unwrap();
        assert!(v.float_at(0).unwrap().is_infinite());

        let v = divide(&Value::int(0), &Value::int(0)).unwrap();
        assert!(v.float_at(0).unwrap().is_nan());
    }

    #[test]
    fn test_string_concat() {
        let v = add(&Value::string("x"), &Value::int_vec(vec![1, 2])).unwrap();
        assert_eq!(v.string_values().unwrap(), vec!["x1", "x2"]);
        assert!(add(&Value::string("x"), &Value::null()).is_err());
    }

    #[test]
    fn test_integer_overflow() {
        let err = add(&Value::int(i64::MAX), &Value::int(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Numeric);

        let err = negate(&Value::int(i64::MIN)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Numeric);
    }

    #[test]
    fn test_comparisons() {
        let v = compare(&Value::int(2), &Value::float(2.0), CompareOp::Eq).unwrap();
        assert!(v.logical_at(0).unwrap());

        let v = compare(&Value::string("abc"), &Value::string("abd"), CompareOp::Lt).unwrap();
        assert!(v.logical_at(0).unwrap());

        let nan = Value::float(f64::NAN);
        assert!(!compare(&nan, &nan, CompareOp::Eq).unwrap().logical_at(0).unwrap());
        assert!(compare(&nan, &nan, CompareOp::NotEq).unwrap().logical_at(0).unwrap());

        let err = compare(&Value::null(), &Value::int(1), CompareOp::Eq).unwrap_err();
        assert!(err.message().contains("testing NULL"));

        let err = compare(&Value::int(1), &Value::string("1"), CompareOp::Eq);
        assert!(err.unwrap().logical_at(0).unwrap(), "coerces via string");
    }

    #[test]
    fn test_range() {
        let v = range(&Value::int(15), &Value::int(13)).unwrap();
        assert_eq!(v.int_values().unwrap(), vec![15, 14, 13]);

        let v = range(&Value::float(1.5), &Value::float(3.0)).unwrap();
        assert_eq!(v.float_values().unwrap(), vec![1.5, 2.5]);

        assert!(range(&Value::float(f64::NAN), &Value::float(1.0)).is_err());
        assert!(range(&Value::float(f64::INFINITY), &Value::float(1.0)).is_err());
    }

    #[test]
    fn test_logical_ops() {
        let v = and(
            &Value::logical_vec(vec![true, true]),
            &Value::int_vec(vec![1, 0]),
        )
        .unwrap();
        assert_eq!(v.logical_values().unwrap(), vec![true, false]);

        let err = and(&Value::logical(true), &Value::float(f64::NAN)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Numeric);
    }
}
