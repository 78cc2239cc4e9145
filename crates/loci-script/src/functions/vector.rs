use super::FunctionRegistry;
use crate::interpreter::Interpreter;
use crate::signature::{Signature, TypeMask};
use crate::value::{Value, ValueKind};
use loci_error::{LociResult, ensure, loci_bail};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        Signature::new("c", TypeMask::ANY).ellipsis(TypeMask::ANY),
        |_i, a| Value::concat(a),
    );
    registry.register(
        Signature::new("rep", TypeMask::ANY)
            .arg("x", TypeMask::ANY)
            .singleton_arg("count", TypeMask::INT),
        rep,
    );
    registry.register(
        Signature::new("repEach", TypeMask::ANY)
            .arg("x", TypeMask::ANY)
            .arg("count", TypeMask::INT),
        rep_each,
    );
    registry.register(
        Signature::new("seq", TypeMask::NUMERIC)
            .singleton_arg("from", TypeMask::NUMERIC)
            .singleton_arg("to", TypeMask::NUMERIC)
            .opt_singleton_arg("by", TypeMask::NUMERIC),
        seq,
    );
    registry.register(
        Signature::new("rev", TypeMask::ANY).arg("x", TypeMask::ANY),
        rev,
    );
    registry.register(
        Signature::new("sort", TypeMask::BASE)
            .arg("x", TypeMask::BASE)
            .opt_singleton_arg("ascending", TypeMask::LOGICAL),
        sort,
    );
    registry.register(
        Signature::new("unique", TypeMask::ANY).arg("x", TypeMask::ANY),
        unique,
    );
    registry.register(
        Signature::new("which", TypeMask::INT).arg("x", TypeMask::LOGICAL),
        which,
    );
    registry.register(
        Signature::new("whichMax", TypeMask::NULL | TypeMask::INT)
            .arg("x", TypeMask::LOGICAL | TypeMask::NUMERIC),
        |i, a| which_extremum(i, a, true),
    );
    registry.register(
        Signature::new("whichMin", TypeMask::NULL | TypeMask::INT)
            .arg("x", TypeMask::LOGICAL | TypeMask::NUMERIC),
        |i, a| which_extremum(i, a, false),
    );
    registry.register(
        Signature::new("match", TypeMask::INT)
            .arg("x", TypeMask::BASE | TypeMask::OBJECT)
            .arg("table", TypeMask::BASE | TypeMask::OBJECT),
        match_fn,
    );
    registry.register(
        Signature::new("any", TypeMask::LOGICAL).arg("x", TypeMask::LOGICAL),
        |_i, a| Ok(Value::logical(a[0].logical_values()?.into_iter().any(|b| b))),
    );
    registry.register(
        Signature::new("all", TypeMask::LOGICAL).arg("x", TypeMask::LOGICAL),
        |_i, a| Ok(Value::logical(a[0].logical_values()?.into_iter().all(|b| b))),
    );
    registry.register(
        Signature::new("identical", TypeMask::LOGICAL)
            .arg("x", TypeMask::ANY)
            .arg("y", TypeMask::ANY),
        |_i, a| Ok(Value::logical(values_identical(&a[0], &a[1])?)),
    );
    registry.register(
        Signature::new("ifelse", TypeMask::BASE)
            .arg("test", TypeMask::LOGICAL)
            .arg("trueValues", TypeMask::BASE)
            .arg("falseValues", TypeMask::BASE),
        ifelse,
    );
    registry.register(
        Signature::new("paste", TypeMask::STR)
            .arg("x", TypeMask::NULL | TypeMask::BASE)
            .opt_singleton_arg("sep", TypeMask::STR),
        paste,
    );
    registry.register(
        Signature::new("nchar", TypeMask::INT).arg("x", TypeMask::STR),
        |_i, a| {
            let out = a[0]
                .string_values()?
                .into_iter()
                .map(|s| s.chars().count() as i64)
                .collect();
            Ok(Value::int_vec(out))
        },
    );
}

fn rep(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let count = args[1].int_at(0)?;
    ensure!(count >= 0, Domain: "rep() requires a non-negative count, not {}", count);
    if count == 0 {
        return args[0].subscript(&Value::int_vec(Vec::new()));
    }
    let parts = vec![args[0].clone(); count as usize];
    Value::concat(&parts)
}

fn rep_each(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    let count = &args[1];
    ensure!(
        count.count() == 1 || count.count() == x.count(),
        Shape: "repEach() requires count to be a singleton or to match the size of x ({} vs {})",
        count.count(),
        x.count()
    );

    let mut indices = Vec::new();
    for i in 0..x.count() {
        let k = count.int_at(if count.count() == 1 { 0 } else { i })?;
        ensure!(k >= 0, Domain: "repEach() requires non-negative counts, not {}", k);
        for _ in 0..k {
            indices.push(i as i64);
        }
    }
    x.subscript(&Value::int_vec(indices))
}

fn seq(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let from = &args[0];
    let to = &args[1];
    let by = args.get(2);

    let int_result = from.kind() == ValueKind::Int
        && to.kind() == ValueKind::Int
        && by.map(|b| b.kind() == ValueKind::Int).unwrap_or(true);

    if int_result {
        let a = from.int_at(0)?;
        let b = to.int_at(0)?;
        let step = match by {
            Some(v) => v.int_at(0)?,
            None => {
                if a <= b {
                    1
                } else {
                    -1
                }
            }
        };
        ensure!(step != 0, Domain: "seq() requires a non-zero step");
        ensure!(
            (step > 0) == (a <= b),
            Domain: "seq() step has the wrong sign for the requested range"
        );
        let mut out = Vec::new();
        let mut v = a;
        while (step > 0 && v <= b) || (step < 0 && v >= b) {
            out.push(v);
            v = match v.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        return Ok(Value::int_vec(out));
    }

    let a = from.float_at(0)?;
    let b = to.float_at(0)?;
    ensure!(
        a.is_finite() && b.is_finite(),
        Numeric: "seq() cannot accept NAN or INF endpoints"
    );
    let step = match by {
        Some(v) => v.float_at(0)?,
        None => {
            if a <= b {
                1.0
            } else {
                -1.0
            }
        }
    };
    ensure!(step != 0.0 && step.is_finite(), Domain: "seq() requires a finite non-zero step");
    ensure!(
        (step > 0.0) == (a <= b),
        Domain: "seq() step has the wrong sign for the requested range"
    );
    let n = ((b - a) / step).floor() as i64 + 1;
    let out: Vec<f64> = (0..n).map(|i| a + i as f64 * step).collect();
    Ok(Value::float_vec(out))
}

fn rev(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.is_null() {
        return Ok(Value::null());
    }
    let indices: Vec<i64> = (0..x.count() as i64).rev().collect();
    x.subscript(&Value::int_vec(indices))
}

fn sort(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    let ascending = match args.get(1) {
        Some(v) => v.logical_at(0)?,
        None => true,
    };

    let mut out = match x.kind() {
        ValueKind::Str => {
            let mut v = x.string_values()?;
            v.sort();
            Value::string_vec(v)
        }
        ValueKind::Float => {
            let mut v = x.float_values()?;
            v.sort_by(f64::total_cmp);
            Value::float_vec(v)
        }
        ValueKind::Logical => {
            let mut v = x.logical_values()?;
            v.sort();
            Value::logical_vec(v)
        }
        _ => {
            let mut v = x.int_values()?;
            v.sort();
            Value::int_vec(v)
        }
    };

    if !ascending {
        let indices: Vec<i64> = (0..out.count() as i64).rev().collect();
        out = out.subscript(&Value::int_vec(indices))?;
    }
    Ok(out)
}

fn unique(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.is_null() {
        return Ok(Value::null());
    }

    let mut keep: Vec<i64> = Vec::new();
    for i in 0..x.count() {
        let mut seen = false;
        for &j in &keep {
            if element_equal(x, i, x, j as usize)? {
                seen = true;
                break;
            }
        }
        if !seen {
            keep.push(i as i64);
        }
    }
    x.subscript(&Value::int_vec(keep))
}

fn which(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let mut out = Vec::new();
    for (i, b) in args[0].logical_values()?.into_iter().enumerate() {
        if b {
            out.push(i as i64);
        }
    }
    Ok(Value::int_vec(out))
}

fn which_extremum(
    _interp: &mut Interpreter<'_>,
    args: &[Value],
    want_max: bool,
) -> LociResult<Value> {
    let x = &args[0];
    if x.count() == 0 {
        return Ok(Value::null());
    }
    let values = x.float_values()?;
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.into_iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            None => best = Some((i, v)),
            Some((_, current)) => {
                if (want_max && v > current) || (!want_max && v < current) {
                    best = Some((i, v));
                }
            }
        }
    }
    match best {
        Some((i, _)) => Ok(Value::int(i as i64)),
        None => Ok(Value::null()),
    }
}

/// 0-based first-match positions of `x` elements in `table`, -1 for misses.
fn match_fn(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    let table = &args[1];

    let mut out = Vec::with_capacity(x.count());
    for i in 0..x.count() {
        let mut found = -1i64;
        for j in 0..table.count() {
            if element_equal(x, i, table, j)? {
                found = j as i64;
                break;
            }
        }
        out.push(found);
    }
    Ok(Value::int_vec(out))
}

fn ifelse(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let test = &args[0];
    let yes = &args[1];
    let no = &args[2];

    ensure!(
        yes.kind() == no.kind(),
        Type: "ifelse() requires trueValues and falseValues of the same type ({} vs {})",
        yes.kind().name(),
        no.kind().name()
    );
    for (name, v) in [("trueValues", yes), ("falseValues", no)] {
        ensure!(
            v.count() == 1 || v.count() == test.count(),
            Shape: "ifelse() requires {} to be a singleton or to match the size of test", name
        );
    }

    let mut indices = Vec::with_capacity(test.count());
    let mut sources = Vec::with_capacity(test.count());
    for i in 0..test.count() {
        let pick_yes = test.logical_at(i)?;
        let source = if pick_yes { yes } else { no };
        sources.push(source);
        indices.push(if source.count() == 1 { 0 } else { i });
    }

    let parts: Vec<Value> = sources
        .iter()
        .zip(&indices)
        .map(|(source, &i)| source.element(i))
        .collect::<LociResult<_>>()?;
    Value::concat(&parts)
}

fn paste(_interp: &mut Interpreter<'_>, args: &[Value]) -> LociResult<Value> {
    let x = &args[0];
    if x.is_null() {
        return Ok(Value::string(""));
    }
    let sep = match args.get(1) {
        Some(v) => v.string_at(0)?,
        None => " ".to_string(),
    };
    Ok(Value::string(x.string_values()?.join(&sep)))
}

/// Element equality under the promotion order; objects compare by identity
/// and never equal base elements.
pub(super) fn element_equal(a: &Value, i: usize, b: &Value, j: usize) -> LociResult<bool> {
    let a_obj = a.kind() == ValueKind::Object;
    let b_obj = b.kind() == ValueKind::Object;
    if a_obj || b_obj {
        if !(a_obj && b_obj) {
            loci_bail!(Type: "object and non-object values cannot be compared");
        }
        return Ok(a.object_at(i)?.ptr_eq(b.object_at(j)?));
    }

    let rank = a
        .kind()
        .promotion_rank()
        .unwrap_or(0)
        .max(b.kind().promotion_rank().unwrap_or(0));
    Ok(match rank {
        4 => a.string_at(i)? == b.string_at(j)?,
        3 => a.float_at(i)? == b.float_at(j)?,
        _ => a.int_at(i)? == b.int_at(j)?,
    })
}

pub(super) fn values_identical(a: &Value, b: &Value) -> LociResult<bool> {
    if a.kind() != b.kind() || a.count() != b.count() {
        return Ok(false);
    }
    for i in 0..a.count() {
        let equal = match a.kind() {
            ValueKind::Null => true,
            ValueKind::Float => {
                let x = a.float_at(i)?;
                let y = b.float_at(i)?;
                x == y || (x.is_nan() && y.is_nan())
            }
            ValueKind::Object => a.object_at(i)?.ptr_eq(b.object_at(i)?),
            ValueKind::Str => a.string_at(i)? == b.string_at(i)?,
            _ => a.int_at(i)? == b.int_at(i)?,
        };
        if !equal {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::interpreter::{Interpreter, NoHost};
    use crate::symbols::Symbols;

    fn eval(source: &str) -> Value {
        let mut symbols = Symbols::new();
        let functions = FunctionRegistry::base();
        let mut host = NoHost;
        Interpreter::new(&mut symbols, &functions, &mut host)
            .run(source)
            .unwrap()
    }

    #[test]
    fn test_rep_and_rep_each() {
        assert_eq!(
            eval("rep(c(3, 7), 2);").int_values().unwrap(),
            vec![3, 7, 3, 7]
        );
        assert_eq!(
            eval("repEach(c(3, 7), c(2, 3));").int_values().unwrap(),
            vec![3, 3, 7, 7, 7]
        );
    }

    #[test]
    fn test_seq() {
        assert_eq!(
            eval("seq(1, 10, 2);").int_values().unwrap(),
            vec![1, 3, 5, 7, 9]
        );
        assert_eq!(eval("seq(3, 1);").int_values().unwrap(), vec![3, 2, 1]);
        assert_eq!(
            eval("seq(0.5, 2.5, 0.5);").float_values().unwrap(),
            vec![0.5, 1.0, 1.5, 2.0, 2.5]
        );
    }

    #[test]
    fn test_match_scenario() {
        assert_eq!(
            eval("match(c(1, 2, 2, 9, 5, 1), c(5, 1, 9));")
                .int_values()
                .unwrap(),
            vec![1, -1, -1, 2, 0, 1]
        );
    }

    #[test]
    fn test_sort_unique_which() {
        assert_eq!(
            eval("sort(c(3, 1, 2), F);").int_values().unwrap(),
            vec![3, 2, 1]
        );
        assert_eq!(
            eval("unique(c(2, 1, 2, 3, 1));").int_values().unwrap(),
            vec![2, 1, 3]
        );
        assert_eq!(
            eval("which(c(T, F, T, T));").int_values().unwrap(),
            vec![0, 2, 3]
        );
        assert_eq!(eval("whichMax(c(1.0, 9.0, 3.0));").int_at(0).unwrap(), 1);
    }

    #[test]
    fn test_ifelse_and_paste() {
        assert_eq!(
            eval("ifelse(c(T, F, T), 1, c(10, 20, 30));")
                .int_values()
                .unwrap(),
            vec![1, 20, 1]
        );
        assert_eq!(
            eval("paste(c(1, 2, 3), '-');").string_at(0).unwrap(),
            "1-2-3"
        );
    }

    #[test]
    fn test_identical() {
        assert!(eval("identical(1:3, c(1, 2, 3));").logical_at(0).unwrap());
        assert!(!eval("identical(1:3, c(1.0, 2.0, 3.0));").logical_at(0).unwrap());
        assert!(!eval("identical(1, c(1, 1));").logical_at(0).unwrap());
    }
}
