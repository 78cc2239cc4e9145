mod math;
mod random;
mod runtime;
mod types;
mod vector;

use crate::interpreter::Interpreter;
use crate::signature::Signature;
use crate::value::Value;
use hashbrown::{HashMap, HashSet};
use loci_error::LociResult;
use std::sync::Arc;

pub type BuiltinFn = fn(&mut Interpreter<'_>, &[Value]) -> LociResult<Value>;

pub enum FunctionImpl {
    /// Implemented in this crate against the interpreter.
    Builtin(BuiltinFn),
    /// Dispatched to the interpreter's [crate::interpreter::Host].
    Host,
}

impl std::fmt::Debug for FunctionImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionImpl::Builtin(_) => write!(f, "Builtin"),
            FunctionImpl::Host => write!(f, "Host"),
        }
    }
}

#[derive(Debug)]
pub struct FunctionDef {
    pub signature: Signature,
    pub imp: FunctionImpl,
}

/// The function table the interpreter and the tree optimizer resolve call
/// names against. Hosts extend [FunctionRegistry::base] with their own
/// entries before any script is parsed.
pub struct FunctionRegistry {
    map: HashMap<&'static str, Arc<FunctionDef>>,
    deferred: HashSet<&'static str>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        FunctionRegistry {
            map: HashMap::new(),
            deferred: HashSet::new(),
        }
    }

    /// The full builtin library.
    pub fn base() -> Self {
        let mut registry = FunctionRegistry::empty();
        math::register(&mut registry);
        types::register(&mut registry);
        vector::register(&mut registry);
        random::register(&mut registry);
        runtime::register(&mut registry);
        registry
    }

    pub fn register(&mut self, signature: Signature, f: BuiltinFn) {
        self.map.insert(
            signature.name,
            Arc::new(FunctionDef {
                signature,
                imp: FunctionImpl::Builtin(f),
            }),
        );
    }

    pub fn register_host(&mut self, signature: Signature) {
        self.map.insert(
            signature.name,
            Arc::new(FunctionDef {
                signature,
                imp: FunctionImpl::Host,
            }),
        );
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.map.get(name)
    }

    /// Marks a name as resolvable only at call time; the tree optimizer will
    /// not reject calls to it.
    pub fn defer(&mut self, name: &'static str) {
        self.deferred.insert(name);
    }

    pub fn allows_late(&self, name: &str) -> bool {
        self.deferred.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.map.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::TypeMask;

    #[test]
    fn test_base_registry_has_core_functions() {
        let registry = FunctionRegistry::base();
        for name in [
            "c", "sum", "product", "rep", "repEach", "seq", "match", "sample", "setSeed",
            "getSeed", "defineConstant", "rm", "apply", "executeLambda", "doCall",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin {}", name);
        }
    }

    #[test]
    fn test_deferred_names() {
        let mut registry = FunctionRegistry::empty();
        assert!(!registry.allows_late("initializeGhost"));
        registry.defer("initializeGhost");
        assert!(registry.allows_late("initializeGhost"));
    }

    #[test]
    fn test_host_registration() {
        let mut registry = FunctionRegistry::empty();
        registry.register_host(
            Signature::new("addSubpop", TypeMask::OBJECT)
                .singleton_arg("subpopID", TypeMask::INT | TypeMask::STR)
                .singleton_arg("size", TypeMask::INT),
        );
        assert!(matches!(
            registry.get("addSubpop").unwrap().imp,
            FunctionImpl::Host
        ));
    }
}
