use crate::value::{Value, ValueKind};
use loci_error::{LociResult, ensure, loci_bail};

/// A bitfield over the six element types, used to describe the types a
/// function argument, return value, or object property may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const NULL: TypeMask = TypeMask(1 << 0);
    pub const LOGICAL: TypeMask = TypeMask(1 << 1);
    pub const INT: TypeMask = TypeMask(1 << 2);
    pub const FLOAT: TypeMask = TypeMask(1 << 3);
    pub const STR: TypeMask = TypeMask(1 << 4);
    pub const OBJECT: TypeMask = TypeMask(1 << 5);

    pub const NUMERIC: TypeMask = TypeMask(Self::INT.0 | Self::FLOAT.0);
    pub const BASE: TypeMask =
        TypeMask(Self::LOGICAL.0 | Self::INT.0 | Self::FLOAT.0 | Self::STR.0);
    pub const ANY: TypeMask = TypeMask(
        Self::NULL.0 | Self::LOGICAL.0 | Self::INT.0 | Self::FLOAT.0 | Self::STR.0 | Self::OBJECT.0,
    );

    pub fn accepts(&self, kind: ValueKind) -> bool {
        let bit = match kind {
            ValueKind::Null => Self::NULL.0,
            ValueKind::Logical => Self::LOGICAL.0,
            ValueKind::Int => Self::INT.0,
            ValueKind::Float => Self::FLOAT.0,
            ValueKind::Str => Self::STR.0,
            ValueKind::Object => Self::OBJECT.0,
        };
        self.0 & bit != 0
    }

    pub fn describe(&self) -> String {
        let mut names = Vec::new();
        for (bit, name) in [
            (Self::NULL.0, "NULL"),
            (Self::LOGICAL.0, "logical"),
            (Self::INT.0, "integer"),
            (Self::FLOAT.0, "float"),
            (Self::STR.0, "string"),
            (Self::OBJECT.0, "object"),
        ] {
            if self.0 & bit != 0 {
                names.push(name);
            }
        }
        names.join(" or ")
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = TypeMask;
    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub mask: TypeMask,
    pub singleton: bool,
    pub optional: bool,
}

/// The declared shape of a callable: a return mask and an ordered run of
/// argument masks. Optional arguments must form a trailing run; an ellipsis
/// accepts any further arguments matching its own mask.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: &'static str,
    pub returns: TypeMask,
    pub args: Vec<ArgSpec>,
    pub ellipsis: Option<TypeMask>,
}

impl Signature {
    pub fn new(name: &'static str, returns: TypeMask) -> Self {
        Signature {
            name,
            returns,
            args: Vec::new(),
            ellipsis: None,
        }
    }

    pub fn arg(mut self, name: &'static str, mask: TypeMask) -> Self {
        debug_assert!(
            self.args.iter().all(|a| !a.optional),
            "required argument after optional"
        );
        self.args.push(ArgSpec {
            name,
            mask,
            singleton: false,
            optional: false,
        });
        self
    }

    pub fn singleton_arg(mut self, name: &'static str, mask: TypeMask) -> Self {
        debug_assert!(self.args.iter().all(|a| !a.optional));
        self.args.push(ArgSpec {
            name,
            mask,
            singleton: true,
            optional: false,
        });
        self
    }

    pub fn opt_arg(mut self, name: &'static str, mask: TypeMask) -> Self {
        self.args.push(ArgSpec {
            name,
            mask,
            singleton: false,
            optional: true,
        });
        self
    }

    pub fn opt_singleton_arg(mut self, name: &'static str, mask: TypeMask) -> Self {
        self.args.push(ArgSpec {
            name,
            mask,
            singleton: true,
            optional: true,
        });
        self
    }

    pub fn ellipsis(mut self, mask: TypeMask) -> Self {
        self.ellipsis = Some(mask);
        self
    }

    pub fn required_count(&self) -> usize {
        self.args.iter().filter(|a| !a.optional).count()
    }

    /// Verifies argument count, per-argument element type, then per-argument
    /// singleton constraints, in that order. `call_kind` is "function" or
    /// "method" for the error message.
    pub fn check_args(&self, call_kind: &str, args: &[Value]) -> LociResult<()> {
        let required = self.required_count();
        ensure!(
            args.len() >= required,
            Shape: "{} {}() requires at least {} argument(s), but {} were supplied",
            call_kind, self.name, required, args.len()
        );
        if self.ellipsis.is_none() {
            ensure!(
                args.len() <= self.args.len(),
                Shape: "{} {}() requires at most {} argument(s), but {} were supplied",
                call_kind, self.name, self.args.len(), args.len()
            );
        }

        for (i, arg) in args.iter().enumerate() {
            let (mask, singleton, name) = match self.args.get(i) {
                Some(spec) => (spec.mask, spec.singleton, spec.name),
                None => (self.ellipsis.unwrap(), false, "..."),
            };
            ensure!(
                mask.accepts(arg.kind()),
                Type: "argument {} ({}) of {} {}() requires {}, but {} was supplied",
                i + 1, name, call_kind, self.name, mask.describe(), arg.kind().name()
            );
            if singleton {
                ensure!(
                    arg.count() == 1,
                    Shape: "argument {} ({}) of {} {}() must be a singleton, but a vector of size {} was supplied",
                    i + 1, name, call_kind, self.name, arg.count()
                );
            }
        }

        Ok(())
    }

    /// Verifies the return value against the declared mask. A violation here
    /// is a bug in the callee, so it is reported as an internal error.
    pub fn check_return(&self, call_kind: &str, value: &Value) -> LociResult<()> {
        if !self.returns.accepts(value.kind()) {
            loci_bail!(
                Internal: "return value of {} {}() has type {}, which violates its declared return type of {}",
                call_kind, self.name, value.kind().name(), self.returns.describe()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_error::ErrorCode;

    fn sig() -> Signature {
        Signature::new("addSubpop", TypeMask::OBJECT)
            .singleton_arg("subpopID", TypeMask::INT | TypeMask::STR)
            .singleton_arg("size", TypeMask::INT)
            .opt_singleton_arg("selfingRate", TypeMask::NUMERIC)
    }

    #[test]
    fn test_mask_accepts() {
        assert!(TypeMask::NUMERIC.accepts(ValueKind::Int));
        assert!(TypeMask::NUMERIC.accepts(ValueKind::Float));
        assert!(!TypeMask::NUMERIC.accepts(ValueKind::Str));
        assert_eq!(TypeMask::NUMERIC.describe(), "integer or float");
    }

    #[test]
    fn test_argument_count() {
        let s = sig();
        let err = s.check_args("method", &[Value::int(1)]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Shape);
        assert!(err.message().contains("at least 2"));

        let too_many = vec![Value::int(1); 4];
        assert!(s.check_args("method", &too_many).is_err());
    }

    #[test]
    fn test_argument_type_and_singleton() {
        let s = sig();
        let err = s
            .check_args("method", &[Value::int(1), Value::string("many")])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Type);
        assert!(err.message().contains("argument 2 (size)"));

        let err = s
            .check_args("method", &[Value::int(1), Value::int_vec(vec![1, 2])])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Shape);
        assert!(err.message().contains("singleton"));

        assert!(
            s.check_args("method", &[Value::string("p1"), Value::int(100)])
                .is_ok()
        );
    }

    #[test]
    fn test_ellipsis_accepts_tail() {
        let s = Signature::new("c", TypeMask::ANY).ellipsis(TypeMask::ANY);
        assert!(s.check_args("function", &[]).is_ok());
        assert!(
            s.check_args("function", &[Value::int(1), Value::string("x")])
                .is_ok()
        );
    }

    #[test]
    fn test_return_violation_is_internal() {
        let s = sig();
        let err = s.check_return("method", &Value::int(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }
}
