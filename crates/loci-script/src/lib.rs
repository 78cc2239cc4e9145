pub mod ast;
pub mod functions;
pub mod interpreter;
pub mod parser;
pub mod random_provider;
pub mod signature;
pub mod symbols;
pub mod token;
pub mod value;

pub use ast::{AstNode, NodeKind, intern_name, optimize};
pub use functions::{BuiltinFn, FunctionDef, FunctionImpl, FunctionRegistry};
pub use interpreter::{Host, Interpreter, NoHost};
pub use parser::Parser;
pub use signature::{ArgSpec, Signature, TypeMask};
pub use symbols::{SymbolTable, Symbols};
pub use token::{Token, TokenKind, tokenize};
pub use value::object::{ElementClass, ObjElem, ObjectValue, PropertySpec};
pub use value::{Value, ValueKind};

pub mod prelude {
    pub use super::interpreter::{Host, Interpreter, NoHost};
    pub use super::random_provider;
    pub use super::signature::{Signature, TypeMask};
    pub use super::symbols::Symbols;
    pub use super::value::object::{ElementClass, ObjElem, ObjectValue};
    pub use super::value::{Value, ValueKind};
    pub use super::{FunctionRegistry, Parser, tokenize};
}
