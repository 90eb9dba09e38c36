//! Constant pool for generated class files
//!
//! Indices are 1-based and `Long`/`Double` entries occupy two slots, per
//! the class-file format. Entries are deduplicated so repeated interning
//! returns the original index.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
}

impl Constant {
    pub fn to_bytes(&self) -> Vec<u8> {
        use constant_tags::*;
        let mut bytes = Vec::new();
        match self {
            Constant::Utf8(value) => {
                bytes.push(CONSTANT_UTF8);
                let utf8 = value.as_bytes();
                bytes.extend_from_slice(&(utf8.len() as u16).to_be_bytes());
                bytes.extend_from_slice(utf8);
            }
            Constant::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Class(name_index) => {
                bytes.push(CONSTANT_CLASS);
                bytes.extend_from_slice(&name_index.to_be_bytes());
            }
            Constant::String(string_index) => {
                bytes.push(CONSTANT_STRING);
                bytes.extend_from_slice(&string_index.to_be_bytes());
            }
            Constant::FieldRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_FIELDREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::MethodRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_METHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::InterfaceMethodRef(class_index, name_and_type_index) => {
                bytes.push(CONSTANT_INTERFACEMETHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&name_and_type_index.to_be_bytes());
            }
            Constant::NameAndType(name_index, descriptor_index) => {
                bytes.push(CONSTANT_NAMEANDTYPE);
                bytes.extend_from_slice(&name_index.to_be_bytes());
                bytes.extend_from_slice(&descriptor_index.to_be_bytes());
            }
        }
        bytes
    }
}

/// Dedup key; float and double are keyed by their bit patterns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

#[derive(Debug, Default)]
pub struct ConstantPool {
    /// `None` marks the unusable slot following a long/double entry
    entries: Vec<Option<Constant>>,
    index: HashMap<ConstKey, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, key: ConstKey, constant: Constant) -> u16 {
        if let Some(existing) = self.index.get(&key) {
            return *existing;
        }
        let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
        let index = (self.entries.len() + 1) as u16;
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        self.index.insert(key, index);
        index
    }

    pub fn add_utf8(&mut self, value: &str) -> u16 {
        self.add(
            ConstKey::Utf8(value.to_string()),
            Constant::Utf8(value.to_string()),
        )
    }

    pub fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.add(ConstKey::Class(name_index), Constant::Class(name_index))
    }

    pub fn add_string(&mut self, value: &str) -> u16 {
        let utf8_index = self.add_utf8(value);
        self.add(ConstKey::String(utf8_index), Constant::String(utf8_index))
    }

    pub fn add_integer(&mut self, value: i32) -> u16 {
        self.add(ConstKey::Integer(value), Constant::Integer(value))
    }

    pub fn add_float(&mut self, value: f32) -> u16 {
        self.add(ConstKey::Float(value.to_bits()), Constant::Float(value))
    }

    pub fn add_long(&mut self, value: i64) -> u16 {
        self.add(ConstKey::Long(value), Constant::Long(value))
    }

    pub fn add_double(&mut self, value: f64) -> u16 {
        self.add(ConstKey::Double(value.to_bits()), Constant::Double(value))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.add(
            ConstKey::NameAndType(name_index, descriptor_index),
            Constant::NameAndType(name_index, descriptor_index),
        )
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.add(
            ConstKey::FieldRef(class_index, nat_index),
            Constant::FieldRef(class_index, nat_index),
        )
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.add(
            ConstKey::MethodRef(class_index, nat_index),
            Constant::MethodRef(class_index, nat_index),
        )
    }

    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.add(
            ConstKey::InterfaceMethodRef(class_index, nat_index),
            Constant::InterfaceMethodRef(class_index, nat_index),
        )
    }

    /// Number of pool slots, including the phantom slots after wide entries
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        for entry in self.entries.iter().flatten() {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.add_utf8("hello");
        let b = pool.add_utf8("hello");
        assert_eq!(a, b);
        let c = pool.add_class("java/lang/Object");
        let d = pool.add_class("java/lang/Object");
        assert_eq!(c, d);
    }

    #[test]
    fn indices_are_one_based() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.add_utf8("first"), 1);
        assert_eq!(pool.add_utf8("second"), 2);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let l = pool.add_long(42);
        assert_eq!(l, 1);
        // the slot after a long is unusable; the next entry lands past it
        assert_eq!(pool.add_utf8("after"), 3);
        assert_eq!(pool.slot_count(), 3);
    }

    #[test]
    fn header_counts_slots_plus_one() {
        let mut pool = ConstantPool::new();
        pool.add_double(1.5);
        pool.add_integer(7);
        let bytes = pool.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 4);
    }
}
