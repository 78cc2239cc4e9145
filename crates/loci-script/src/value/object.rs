use crate::signature::{Signature, TypeMask};
use loci_error::{LociResult, ensure};
use std::any::Any;
use std::rc::Rc;

/// A property declared by an [ElementClass].
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: &'static str,
    pub mask: TypeMask,
    pub read_only: bool,
}

/// The class of a host object element: a name, the properties it exposes, and
/// the signatures of its methods. Classes are built once by the host and
/// shared as `&'static` references, so identity comparison is pointer
/// comparison.
#[derive(Debug)]
pub struct ElementClass {
    pub name: &'static str,
    properties: Vec<PropertySpec>,
    methods: Vec<Signature>,
}

impl ElementClass {
    pub fn new(name: &'static str) -> Self {
        ElementClass {
            name,
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn read_only(mut self, name: &'static str, mask: TypeMask) -> Self {
        self.properties.push(PropertySpec {
            name,
            mask,
            read_only: true,
        });
        self
    }

    pub fn read_write(mut self, name: &'static str, mask: TypeMask) -> Self {
        self.properties.push(PropertySpec {
            name,
            mask,
            read_only: false,
        });
        self
    }

    pub fn method(mut self, signature: Signature) -> Self {
        self.methods.push(signature);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn find_method(&self, name: &str) -> Option<&Signature> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }
}

/// One element of an object value: a class tag plus a shared handle to the
/// underlying entity. Identity is handle identity.
#[derive(Clone)]
pub struct ObjElem {
    class: &'static ElementClass,
    handle: Rc<dyn Any>,
}

impl ObjElem {
    pub fn new(class: &'static ElementClass, handle: Rc<dyn Any>) -> Self {
        ObjElem { class, handle }
    }

    pub fn class(&self) -> &'static ElementClass {
        self.class
    }

    pub fn handle(&self) -> &Rc<dyn Any> {
        &self.handle
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.handle).downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &ObjElem) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }
}

impl std::fmt::Debug for ObjElem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.class.name)
    }
}

impl PartialEq for ObjElem {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A vector of object elements sharing one element class.
#[derive(Debug, Clone)]
pub struct ObjectValue {
    class: Option<&'static ElementClass>,
    elems: Vec<ObjElem>,
}

impl ObjectValue {
    pub fn new(class: &'static ElementClass) -> Self {
        ObjectValue {
            class: Some(class),
            elems: Vec::new(),
        }
    }

    /// An empty object vector with no element class yet; the class is adopted
    /// from the first element pushed.
    pub fn untyped_empty() -> Self {
        ObjectValue {
            class: None,
            elems: Vec::new(),
        }
    }

    pub fn single(elem: ObjElem) -> Self {
        ObjectValue {
            class: Some(elem.class()),
            elems: vec![elem],
        }
    }

    pub fn from_elems(elems: Vec<ObjElem>) -> LociResult<Self> {
        let mut out = ObjectValue::untyped_empty();
        for elem in elems {
            out.push(elem)?;
        }
        Ok(out)
    }

    pub fn class(&self) -> Option<&'static ElementClass> {
        self.class
    }

    pub fn elems(&self) -> &[ObjElem] {
        &self.elems
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn push(&mut self, elem: ObjElem) -> LociResult<()> {
        match self.class {
            None => self.class = Some(elem.class()),
            Some(class) => {
                ensure!(
                    std::ptr::eq(class, elem.class()),
                    Type: "object elements of class {} cannot be mixed with class {}",
                    elem.class().name, class.name
                );
            }
        }
        self.elems.push(elem);
        Ok(())
    }

    pub fn set(&mut self, index: usize, elem: ObjElem) -> LociResult<()> {
        if let Some(class) = self.class {
            ensure!(
                std::ptr::eq(class, elem.class()),
                Type: "object elements of class {} cannot be mixed with class {}",
                elem.class().name, class.name
            );
        }
        self.elems[index] = elem;
        Ok(())
    }

    pub fn extend(&mut self, other: &ObjectValue) -> LociResult<()> {
        for elem in other.elems() {
            self.push(elem.clone())?;
        }
        Ok(())
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.elems == other.elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static TEST_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
        ElementClass::new("Widget")
            .read_only("id", TypeMask::INT)
            .read_write("label", TypeMask::STR)
            .method(Signature::new("poke", TypeMask::NULL))
    });

    static OTHER_CLASS: LazyLock<ElementClass> =
        LazyLock::new(|| ElementClass::new("Gadget").read_only("id", TypeMask::INT));

    #[test]
    fn test_class_lookup() {
        assert!(TEST_CLASS.property("id").unwrap().read_only);
        assert!(!TEST_CLASS.property("label").unwrap().read_only);
        assert!(TEST_CLASS.property("missing").is_none());
        assert!(TEST_CLASS.find_method("poke").is_some());
    }

    #[test]
    fn test_identity_and_downcast() {
        let handle: Rc<dyn Any> = Rc::new(42i64);
        let a = ObjElem::new(&TEST_CLASS, Rc::clone(&handle));
        let b = ObjElem::new(&TEST_CLASS, handle);
        let c = ObjElem::new(&TEST_CLASS, Rc::new(42i64));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(*a.downcast::<i64>().unwrap(), 42);
        assert!(a.downcast::<String>().is_none());
    }

    #[test]
    fn test_mixed_classes_rejected() {
        let mut obj = ObjectValue::single(ObjElem::new(&TEST_CLASS, Rc::new(1i64)));
        let err = obj
            .push(ObjElem::new(&OTHER_CLASS, Rc::new(2i64)))
            .unwrap_err();
        assert!(err.message().contains("cannot be mixed"));
    }
}
