pub mod object;
pub mod ops;

use loci_error::{LociResult, ensure, loci_bail, loci_err};
use self::object::{ElementClass, ObjElem, ObjectValue};

/// The element type of a [Value]. Every value is a vector over exactly one of
/// these; the type is fixed for the lifetime of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    Null,
    Logical,
    Int,
    Float,
    Str,
    Object,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Logical => "logical",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::Object => "object",
        }
    }

    pub fn is_base(&self) -> bool {
        !matches!(self, ValueKind::Object)
    }

    /// Rank in the promotion order logical < integer < float < string.
    /// NULL and object do not participate in promotion.
    pub fn promotion_rank(&self) -> Option<u8> {
        match self {
            ValueKind::Logical => Some(1),
            ValueKind::Int => Some(2),
            ValueKind::Float => Some(3),
            ValueKind::Str => Some(4),
            ValueKind::Null | ValueKind::Object => None,
        }
    }
}

/// Storage for one vector of elements. Singletons get a compact immutable
/// representation; any in-place write has to promote to the vector form
/// first via [Payload::make_vec].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    Singleton(T),
    Vector(Vec<T>),
}

impl<T: Clone> Payload<T> {
    pub fn len(&self) -> usize {
        match self {
            Payload::Singleton(_) => 1,
            Payload::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Payload::Singleton(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Payload::Singleton(v) => std::slice::from_ref(v),
            Payload::Vector(v) => v.as_slice(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Promotes the singleton representation to a mutable vector. This is the
    /// only route to in-place element mutation.
    pub fn make_vec(&mut self) -> &mut Vec<T> {
        if let Payload::Singleton(v) = self {
            *self = Payload::Vector(vec![v.clone()]);
        }
        match self {
            Payload::Vector(v) => v,
            Payload::Singleton(_) => unreachable!(),
        }
    }
}

impl<T> From<Vec<T>> for Payload<T> {
    fn from(v: Vec<T>) -> Self {
        Payload::Vector(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueData {
    Null,
    Logical(Payload<bool>),
    Int(Payload<i64>),
    Float(Payload<f64>),
    Str(Payload<String>),
    Object(ObjectValue),
}

/// A dynamically typed vector value. See [ValueKind] for the element types.
///
/// The `invisible` flag suppresses auto-display of a result at the outermost
/// level; it is deliberately not inherited by copies ([Value::clone] clears
/// it), use [Value::clone_invisible] to carry it across.
#[derive(Debug)]
pub struct Value {
    pub(crate) data: ValueData,
    invisible: bool,
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Value {
            data: self.data.clone(),
            invisible: false,
        }
    }
}

// Equality is element-wise; the singleton/vector representation split is
// invisible to it.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (ValueData::Null, ValueData::Null) => true,
            (ValueData::Logical(a), ValueData::Logical(b)) => a.as_slice() == b.as_slice(),
            (ValueData::Int(a), ValueData::Int(b)) => a.as_slice() == b.as_slice(),
            (ValueData::Float(a), ValueData::Float(b)) => a.as_slice() == b.as_slice(),
            (ValueData::Str(a), ValueData::Str(b)) => a.as_slice() == b.as_slice(),
            (ValueData::Object(a), ValueData::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn null() -> Self {
        Value {
            data: ValueData::Null,
            invisible: false,
        }
    }

    pub fn logical(v: bool) -> Self {
        Value {
            data: ValueData::Logical(Payload::Singleton(v)),
            invisible: false,
        }
    }

    pub fn int(v: i64) -> Self {
        Value {
            data: ValueData::Int(Payload::Singleton(v)),
            invisible: false,
        }
    }

    pub fn float(v: f64) -> Self {
        Value {
            data: ValueData::Float(Payload::Singleton(v)),
            invisible: false,
        }
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value {
            data: ValueData::Str(Payload::Singleton(v.into())),
            invisible: false,
        }
    }

    pub fn logical_vec(v: Vec<bool>) -> Self {
        Value {
            data: ValueData::Logical(v.into()),
            invisible: false,
        }
    }

    pub fn int_vec(v: Vec<i64>) -> Self {
        Value {
            data: ValueData::Int(v.into()),
            invisible: false,
        }
    }

    pub fn float_vec(v: Vec<f64>) -> Self {
        Value {
            data: ValueData::Float(v.into()),
            invisible: false,
        }
    }

    pub fn string_vec(v: Vec<String>) -> Self {
        Value {
            data: ValueData::Str(v.into()),
            invisible: false,
        }
    }

    pub fn object(v: ObjectValue) -> Self {
        Value {
            data: ValueData::Object(v),
            invisible: false,
        }
    }

    pub fn object_elem(elem: ObjElem) -> Self {
        Value::object(ObjectValue::single(elem))
    }

    pub fn object_empty(class: &'static ElementClass) -> Self {
        Value::object(ObjectValue::new(class))
    }

    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Null => Value::null(),
            ValueKind::Logical => Value::logical_vec(Vec::new()),
            ValueKind::Int => Value::int_vec(Vec::new()),
            ValueKind::Float => Value::float_vec(Vec::new()),
            ValueKind::Str => Value::string_vec(Vec::new()),
            ValueKind::Object => Value {
                data: ValueData::Object(ObjectValue::untyped_empty()),
                invisible: false,
            },
        }
    }

    pub fn kind(&self) -> ValueKind {
        match &self.data {
            ValueData::Null => ValueKind::Null,
            ValueData::Logical(_) => ValueKind::Logical,
            ValueData::Int(_) => ValueKind::Int,
            ValueData::Float(_) => ValueKind::Float,
            ValueData::Str(_) => ValueKind::Str,
            ValueData::Object(_) => ValueKind::Object,
        }
    }

    pub fn count(&self) -> usize {
        match &self.data {
            ValueData::Null => 0,
            ValueData::Logical(p) => p.len(),
            ValueData::Int(p) => p.len(),
            ValueData::Float(p) => p.len(),
            ValueData::Str(p) => p.len(),
            ValueData::Object(o) => o.len(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, ValueData::Null)
    }

    pub fn is_singleton(&self) -> bool {
        self.count() == 1
    }

    pub fn invisible(&self) -> bool {
        self.invisible
    }

    pub fn into_invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    pub fn clone_invisible(&self) -> Self {
        Value {
            data: self.data.clone(),
            invisible: self.invisible,
        }
    }

    pub fn as_object(&self) -> LociResult<&ObjectValue> {
        match &self.data {
            ValueData::Object(o) => Ok(o),
            _ => Err(loci_err!(Type: "expected an object value, not {}", self.kind().name())),
        }
    }

    pub fn logical_at(&self, index: usize) -> LociResult<bool> {
        self.check_index(index)?;
        match &self.data {
            ValueData::Logical(p) => Ok(p.as_slice()[index]),
            ValueData::Int(p) => Ok(p.as_slice()[index] != 0),
            ValueData::Float(p) => {
                let v = p.as_slice()[index];
                ensure!(!v.is_nan(), Numeric: "NAN cannot be converted to logical");
                Ok(v != 0.0)
            }
            _ => Err(loci_err!(Type: "{} cannot be converted to logical", self.kind().name())),
        }
    }

    pub fn int_at(&self, index: usize) -> LociResult<i64> {
        self.check_index(index)?;
        match &self.data {
            ValueData::Logical(p) => Ok(p.as_slice()[index] as i64),
            ValueData::Int(p) => Ok(p.as_slice()[index]),
            ValueData::Float(p) => {
                let v = p.as_slice()[index];
                ensure!(v.is_finite(), Numeric: "{} cannot be converted to integer", format_float(v));
                ensure!(
                    (i64::MIN as f64..=i64::MAX as f64).contains(&v),
                    Numeric: "float value {} is out of integer range", format_float(v)
                );
                Ok(v.trunc() as i64)
            }
            _ => Err(loci_err!(Type: "{} cannot be converted to integer", self.kind().name())),
        }
    }

    pub fn float_at(&self, index: usize) -> LociResult<f64> {
        self.check_index(index)?;
        match &self.data {
            ValueData::Logical(p) => Ok(p.as_slice()[index] as i64 as f64),
            ValueData::Int(p) => Ok(p.as_slice()[index] as f64),
            ValueData::Float(p) => Ok(p.as_slice()[index]),
            _ => Err(loci_err!(Type: "{} cannot be converted to float", self.kind().name())),
        }
    }

    pub fn string_at(&self, index: usize) -> LociResult<String> {
        self.check_index(index)?;
        match &self.data {
            ValueData::Logical(p) => Ok(if p.as_slice()[index] { "T" } else { "F" }.to_string()),
            ValueData::Int(p) => Ok(p.as_slice()[index].to_string()),
            ValueData::Float(p) => Ok(format_float(p.as_slice()[index])),
            ValueData::Str(p) => Ok(p.as_slice()[index].clone()),
            _ => Err(loci_err!(Type: "{} cannot be converted to string", self.kind().name())),
        }
    }

    pub fn object_at(&self, index: usize) -> LociResult<&ObjElem> {
        self.check_index(index)?;
        match &self.data {
            ValueData::Object(o) => Ok(&o.elems()[index]),
            _ => Err(loci_err!(Type: "expected an object value, not {}", self.kind().name())),
        }
    }

    /// Extracts element `index` as a singleton value of the same type.
    pub fn element(&self, index: usize) -> LociResult<Value> {
        self.check_index(index)?;
        Ok(match &self.data {
            ValueData::Null => Value::null(),
            ValueData::Logical(p) => Value::logical(p.as_slice()[index]),
            ValueData::Int(p) => Value::int(p.as_slice()[index]),
            ValueData::Float(p) => Value::float(p.as_slice()[index]),
            ValueData::Str(p) => Value::string(p.as_slice()[index].clone()),
            ValueData::Object(o) => Value::object_elem(o.elems()[index].clone()),
        })
    }

    fn check_index(&self, index: usize) -> LociResult<()> {
        ensure!(
            index < self.count(),
            Shape: "subscript {} is out of range for a vector of size {}", index, self.count()
        );
        Ok(())
    }

    /// Coerced whole-vector accessors for builtin implementations.
    pub fn logical_values(&self) -> LociResult<Vec<bool>> {
        (0..self.count()).map(|i| self.logical_at(i)).collect()
    }

    pub fn int_values(&self) -> LociResult<Vec<i64>> {
        (0..self.count()).map(|i| self.int_at(i)).collect()
    }

    pub fn float_values(&self) -> LociResult<Vec<f64>> {
        (0..self.count()).map(|i| self.float_at(i)).collect()
    }

    pub fn string_values(&self) -> LociResult<Vec<String>> {
        (0..self.count()).map(|i| self.string_at(i)).collect()
    }

    /// Concatenation by the rules of `c()`: NULLs vanish, base types promote
    /// to the highest type present, objects only concatenate with objects of
    /// the same element class.
    pub fn concat(parts: &[Value]) -> LociResult<Value> {
        let mut has_object = false;
        let mut rank = 0u8;
        let mut all_null = true;

        for part in parts {
            match part.kind() {
                ValueKind::Null => {}
                ValueKind::Object => {
                    has_object = true;
                    all_null = false;
                }
                kind => {
                    all_null = false;
                    rank = rank.max(kind.promotion_rank().unwrap_or(0));
                }
            }
        }

        if all_null {
            return Ok(Value::null());
        }

        if has_object {
            ensure!(
                rank == 0,
                Type: "object and non-object values cannot be mixed by c()"
            );
            let mut out: Option<ObjectValue> = None;
            for part in parts {
                if part.is_null() {
                    continue;
                }
                let obj = part.as_object()?;
                match &mut out {
                    None => out = Some(obj.clone()),
                    Some(acc) => acc.extend(obj)?,
                }
            }
            return Ok(Value::object(out.unwrap_or_else(ObjectValue::untyped_empty)));
        }

        let live = parts.iter().filter(|p| !p.is_null());
        match rank {
            1 => {
                let mut out = Vec::new();
                for part in live {
                    out.extend(part.logical_values()?);
                }
                Ok(Value::logical_vec(out))
            }
            2 => {
                let mut out = Vec::new();
                for part in live {
                    out.extend(part.int_values()?);
                }
                Ok(Value::int_vec(out))
            }
            3 => {
                let mut out = Vec::new();
                for part in live {
                    out.extend(part.float_values()?);
                }
                Ok(Value::float_vec(out))
            }
            _ => {
                let mut out = Vec::new();
                for part in live {
                    out.extend(part.string_values()?);
                }
                Ok(Value::string_vec(out))
            }
        }
    }

    /// `x[index]` per the subscript rules: int or float (truncated) indices,
    /// or a logical mask of the full length. Out-of-range raises; an empty
    /// index yields an empty value of the same type; NULL indexes only NULL.
    pub fn subscript(&self, index: &Value) -> LociResult<Value> {
        if index.is_null() {
            if self.is_null() {
                return Ok(Value::null());
            }
            loci_bail!(Type: "NULL cannot be used as a subscript index");
        }

        let indices = resolve_indices(index, self.count())?;

        Ok(match &self.data {
            ValueData::Null => Value::null(),
            ValueData::Logical(p) => {
                Value::logical_vec(indices.iter().map(|&i| p.as_slice()[i]).collect())
            }
            ValueData::Int(p) => {
                Value::int_vec(indices.iter().map(|&i| p.as_slice()[i]).collect())
            }
            ValueData::Float(p) => {
                Value::float_vec(indices.iter().map(|&i| p.as_slice()[i]).collect())
            }
            ValueData::Str(p) => {
                Value::string_vec(indices.iter().map(|&i| p.as_slice()[i].clone()).collect())
            }
            ValueData::Object(o) => {
                let mut out = match o.class() {
                    Some(class) => ObjectValue::new(class),
                    None => ObjectValue::untyped_empty(),
                };
                for &i in &indices {
                    out.push(o.elems()[i].clone())?;
                }
                Value::object(out)
            }
        })
    }

    /// `x[index] = rhs`. The replacement must be a singleton or match the
    /// index count; int widens to float when the target is float; NULL never
    /// assigns.
    pub fn assign_subscript(&mut self, index: &Value, rhs: &Value) -> LociResult<()> {
        ensure!(!rhs.is_null(), Type: "NULL cannot be assigned into a vector");
        ensure!(
            !index.is_null(),
            Type: "NULL cannot be used as a subscript index"
        );

        let indices = resolve_indices(index, self.count())?;
        ensure!(
            rhs.count() == 1 || rhs.count() == indices.len(),
            Shape: "assignment requires the replacement to be a singleton or to match the {} selected positions, but it has size {}",
            indices.len(),
            rhs.count()
        );

        let target_kind = self.kind();
        let rhs_kind = rhs.kind();
        let compatible = target_kind == rhs_kind
            || (target_kind == ValueKind::Float && rhs_kind == ValueKind::Int);
        ensure!(
            compatible,
            Type: "{} values cannot be assigned into a {} vector",
            rhs_kind.name(),
            target_kind.name()
        );

        for (j, &i) in indices.iter().enumerate() {
            let src = if rhs.count() == 1 { 0 } else { j };
            match &mut self.data {
                ValueData::Logical(p) => p.make_vec()[i] = rhs.logical_at(src)?,
                ValueData::Int(p) => p.make_vec()[i] = rhs.int_at(src)?,
                ValueData::Float(p) => p.make_vec()[i] = rhs.float_at(src)?,
                ValueData::Str(p) => p.make_vec()[i] = rhs.string_at(src)?,
                ValueData::Object(o) => o.set(i, rhs.object_at(src)?.clone())?,
                ValueData::Null => loci_bail!(Type: "NULL cannot be assigned into"),
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ValueData::Null => write!(f, "NULL"),
            ValueData::Object(o) => {
                let class = o.class().map(|c| c.name).unwrap_or("Object");
                write!(f, "<{}>[{}]", class, o.len())
            }
            _ => {
                let parts: Vec<String> = (0..self.count())
                    .map(|i| self.string_at(i).unwrap_or_default())
                    .collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        "NAN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else {
        format!("{}", x)
    }
}

/// Resolves a subscript index value to concrete positions in `0..len`.
fn resolve_indices(index: &Value, len: usize) -> LociResult<Vec<usize>> {
    match index.kind() {
        ValueKind::Logical => {
            ensure!(
                index.count() == len,
                Shape: "a logical subscript must match the size of the subscripted vector ({} vs {})",
                index.count(),
                len
            );
            let mut out = Vec::new();
            for i in 0..index.count() {
                if index.logical_at(i)? {
                    out.push(i);
                }
            }
            Ok(out)
        }
        ValueKind::Int | ValueKind::Float => {
            let mut out = Vec::with_capacity(index.count());
            for i in 0..index.count() {
                let idx = index.int_at(i)?;
                ensure!(
                    idx >= 0 && (idx as usize) < len,
                    Shape: "subscript {} is out of range for a vector of size {}", idx, len
                );
                out.push(idx as usize);
            }
            Ok(out)
        }
        kind => Err(loci_err!(Type: "{} cannot be used as a subscript index", kind.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_kinds() {
        assert_eq!(Value::null().count(), 0);
        assert_eq!(Value::int(3).count(), 1);
        assert_eq!(Value::float_vec(vec![1.0, 2.0]).count(), 2);
        assert_eq!(Value::int(3).kind(), ValueKind::Int);
    }

    #[test]
    fn test_clone_clears_invisible() {
        let v = Value::int(1).into_invisible();
        assert!(v.invisible());
        assert!(!v.clone().invisible());
        assert!(v.clone_invisible().invisible());
    }

    #[test]
    fn test_singleton_promotes_on_write() {
        let mut p = Payload::Singleton(5i64);
        assert!(p.is_scalar());
        p.make_vec()[0] = 7;
        assert!(!p.is_scalar());
        assert_eq!(p.as_slice(), &[7]);
    }

    #[test]
    fn test_concat_promotion() {
        let v = Value::concat(&[Value::int(1), Value::float(2.5)]).unwrap();
        assert_eq!(v.kind(), ValueKind::Float);
        assert_eq!(v.float_values().unwrap(), vec![1.0, 2.5]);

        let v = Value::concat(&[Value::logical(true), Value::int(2)]).unwrap();
        assert_eq!(v.kind(), ValueKind::Int);
        assert_eq!(v.int_values().unwrap(), vec![1, 2]);

        let v = Value::concat(&[Value::null(), Value::null()]).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn test_subscript_rules() {
        let v = Value::int_vec(vec![10, 20, 30]);

        let picked = v.subscript(&Value::int_vec(vec![2, 0])).unwrap();
        assert_eq!(picked.int_values().unwrap(), vec![30, 10]);

        let masked = v
            .subscript(&Value::logical_vec(vec![true, false, true]))
            .unwrap();
        assert_eq!(masked.int_values().unwrap(), vec![10, 30]);

        let empty = v.subscript(&Value::int_vec(vec![])).unwrap();
        assert_eq!(empty.kind(), ValueKind::Int);
        assert_eq!(empty.count(), 0);

        assert!(v.subscript(&Value::int(3)).is_err());
        assert!(v.subscript(&Value::null()).is_err());
        assert!(Value::null().subscript(&Value::null()).unwrap().is_null());
    }

    #[test]
    fn test_assign_subscript() {
        let mut v = Value::int_vec(vec![1, 2, 3, 4, 5]);
        v.assign_subscript(&Value::int_vec(vec![0, 2, 4]), &Value::int(10))
            .unwrap();
        assert_eq!(v.int_values().unwrap(), vec![10, 2, 10, 4, 10]);

        let mut f = Value::float_vec(vec![1.0, 2.0]);
        f.assign_subscript(&Value::int(1), &Value::int(9)).unwrap();
        assert_eq!(f.float_values().unwrap(), vec![1.0, 9.0]);

        let mut i = Value::int_vec(vec![1, 2]);
        assert!(i.assign_subscript(&Value::int(0), &Value::float(1.5)).is_err());
        assert!(i.assign_subscript(&Value::int(0), &Value::null()).is_err());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(f64::INFINITY), "INF");
        assert_eq!(format_float(f64::NEG_INFINITY), "-INF");
        assert_eq!(format_float(f64::NAN), "NAN");
    }
}
