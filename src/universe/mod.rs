//! The type universe: resolution of types outside the current compilation
//!
//! The compiler consumes this as an abstract, injectable query capability
//! instead of reaching for live runtime reflection, which keeps symbol
//! resolution testable against fixtures.

pub mod builtins;

use std::collections::HashMap;

use crate::program::{PropertyKind, ProgramTable};

/// A method as seen through the universe
#[derive(Debug, Clone)]
pub struct MethodDesc {
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    /// Exposed for direct static-dispatch inlining at import sites
    pub inline: bool,
    /// Property accessor marker with the property type descriptor
    pub property: Option<(PropertyKind, String)>,
}

impl MethodDesc {
    pub fn arity(&self) -> usize {
        crate::compiler::types::descriptor_arity(&self.descriptor)
    }
}

/// A field as seen through the universe
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub inline: bool,
}

/// A type as seen through the universe
#[derive(Debug, Clone)]
pub struct ClassDesc {
    /// Internal name, e.g. `java/lang/String`
    pub name: String,
    pub super_name: Option<String>,
    pub is_interface: bool,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodDesc>,
    pub fields: Vec<FieldDesc>,
}

impl ClassDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: Some("java/lang/Object".to_string()),
            is_interface: false,
            fields: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut desc = Self::new(name);
        desc.is_interface = true;
        desc
    }

    pub fn extending(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    pub fn implementing(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
            inline: false,
            property: None,
        });
        self
    }

    pub fn static_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
            inline: false,
            property: None,
        });
        self
    }

    pub fn inline_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
            inline: true,
            property: None,
        });
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
            inline: false,
        });
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
            inline: false,
        });
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_method(&self, name: &str, arity: usize) -> Option<&MethodDesc> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.arity() == arity)
    }
}

/// Query capability over already-compiled or host-provided types.
///
/// Primitive and array types are first-class: `exists` answers for them
/// even when `class` has no structural entry to hand out.
pub trait TypeUniverse {
    fn class(&self, internal_name: &str) -> Option<&ClassDesc>;

    fn exists(&self, internal_name: &str) -> bool {
        if let Some(elem) = internal_name.strip_prefix('[') {
            let elem = elem.strip_prefix('L').and_then(|e| e.strip_suffix(';')).unwrap_or(elem);
            return self.exists(elem);
        }
        if matches!(
            internal_name,
            "void" | "boolean" | "char" | "byte" | "short" | "int" | "float" | "long" | "double"
                | "V" | "Z" | "C" | "B" | "S" | "I" | "F" | "J" | "D"
        ) {
            return true;
        }
        self.class(internal_name).is_some()
    }
}

/// Whether `internal_name` is (transitively) a subtype of `target`
pub fn is_subtype_of(universe: &dyn TypeUniverse, internal_name: &str, target: &str) -> bool {
    if internal_name == target {
        return true;
    }
    let Some(desc) = universe.class(internal_name) else {
        return false;
    };
    if desc.interfaces.iter().any(|i| is_subtype_of(universe, i, target)) {
        return true;
    }
    match &desc.super_name {
        Some(super_name) => is_subtype_of(universe, super_name, target),
        None => false,
    }
}

/// A plain map-backed universe, used both for host fixtures and for
/// classes defined by the ephemeral loader.
#[derive(Debug, Default)]
pub struct HostUniverse {
    classes: HashMap<String, ClassDesc>,
}

impl HostUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, desc: ClassDesc) {
        self.classes.insert(desc.name.clone(), desc);
    }
}

impl TypeUniverse for HostUniverse {
    fn class(&self, internal_name: &str) -> Option<&ClassDesc> {
        self.classes.get(internal_name)
    }
}

/// Two universes tried in order; lookups prefer the first
pub struct ChainedUniverse<'a> {
    pub first: &'a dyn TypeUniverse,
    pub second: &'a dyn TypeUniverse,
}

impl TypeUniverse for ChainedUniverse<'_> {
    fn class(&self, internal_name: &str) -> Option<&ClassDesc> {
        self.first
            .class(internal_name)
            .or_else(|| self.second.class(internal_name))
    }
}

/// Derive universe descriptors from compiled units so one run's output is
/// resolvable by the next.
pub fn describe_program(table: &ProgramTable) -> HostUniverse {
    let mut universe = HostUniverse::new();
    for unit in table.iter() {
        let mut desc = ClassDesc::new(unit.name.clone()).extending(unit.super_name.clone());
        for field in &unit.fields {
            desc.fields.push(FieldDesc {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                is_static: field.is_static(),
                inline: field.inline,
            });
        }
        for method in &unit.methods {
            desc.methods.push(MethodDesc {
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                is_static: method.is_static(),
                inline: method.markers.inline,
                property: method.markers.property.clone(),
            });
        }
        universe.insert(desc);
    }
    universe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_lookup_prefers_first() {
        let mut a = HostUniverse::new();
        a.insert(ClassDesc::new("p/A").method("only_in_a", "()V"));
        let mut b = HostUniverse::new();
        b.insert(ClassDesc::new("p/A"));
        b.insert(ClassDesc::new("p/B"));

        let chained = ChainedUniverse { first: &a, second: &b };
        assert!(chained.class("p/A").unwrap().find_method("only_in_a", 0).is_some());
        assert!(chained.class("p/B").is_some());
    }

    #[test]
    fn primitives_and_arrays_exist() {
        let universe = HostUniverse::new();
        assert!(universe.exists("int"));
        assert!(universe.exists("[I"));
        assert!(!universe.exists("com/example/Missing"));
    }

    #[test]
    fn subtype_walks_interfaces_and_supers() {
        let mut universe = HostUniverse::new();
        universe.insert(ClassDesc::interface("java/lang/Iterable"));
        universe.insert(
            ClassDesc::interface("java/util/Collection").implementing("java/lang/Iterable"),
        );
        universe.insert(
            ClassDesc::new("java/util/ArrayList").implementing("java/util/Collection"),
        );
        assert!(is_subtype_of(&universe, "java/util/ArrayList", "java/lang/Iterable"));
        assert!(!is_subtype_of(&universe, "java/lang/Iterable", "java/util/ArrayList"));
    }
}
