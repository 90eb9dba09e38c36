//! Attribute structures for generated class files

use super::constpool::ConstantPool;
use crate::program::{AnnotationDef, AnnotationValue};

#[derive(Debug)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.info);
        bytes
    }
}

/// Build the Code attribute wrapping assembled bytecode
pub fn make_code_attribute(
    pool: &mut ConstantPool,
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
    inner: Vec<AttributeInfo>,
) -> AttributeInfo {
    let name_index = pool.add_utf8("Code");
    let mut info = Vec::new();
    info.extend_from_slice(&max_stack.to_be_bytes());
    info.extend_from_slice(&max_locals.to_be_bytes());
    info.extend_from_slice(&(code.len() as u32).to_be_bytes());
    info.extend_from_slice(code);
    info.extend_from_slice(&0u16.to_be_bytes()); // exception_table_length
    info.extend_from_slice(&(inner.len() as u16).to_be_bytes());
    for attribute in inner {
        info.extend_from_slice(&attribute.to_bytes());
    }
    AttributeInfo::new(name_index, info)
}

/// One resolved LocalVariableTable row
#[derive(Debug)]
pub struct LocalVariableRow {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

pub fn make_local_variable_table(
    pool: &mut ConstantPool,
    rows: &[LocalVariableRow],
) -> AttributeInfo {
    let name_index = pool.add_utf8("LocalVariableTable");
    let mut info = Vec::new();
    info.extend_from_slice(&(rows.len() as u16).to_be_bytes());
    for row in rows {
        info.extend_from_slice(&row.start_pc.to_be_bytes());
        info.extend_from_slice(&row.length.to_be_bytes());
        info.extend_from_slice(&pool.add_utf8(&row.name).to_be_bytes());
        info.extend_from_slice(&pool.add_utf8(&row.descriptor).to_be_bytes());
        info.extend_from_slice(&row.index.to_be_bytes());
    }
    AttributeInfo::new(name_index, info)
}

/// One InnerClasses table row
#[derive(Debug)]
pub struct InnerClassRow {
    pub inner: String,
    pub outer: String,
    pub inner_simple: String,
    pub access: u16,
}

pub fn make_inner_classes(pool: &mut ConstantPool, rows: &[InnerClassRow]) -> AttributeInfo {
    let name_index = pool.add_utf8("InnerClasses");
    let mut info = Vec::new();
    info.extend_from_slice(&(rows.len() as u16).to_be_bytes());
    for row in rows {
        info.extend_from_slice(&pool.add_class(&row.inner).to_be_bytes());
        info.extend_from_slice(&pool.add_class(&row.outer).to_be_bytes());
        info.extend_from_slice(&pool.add_utf8(&row.inner_simple).to_be_bytes());
        info.extend_from_slice(&row.access.to_be_bytes());
    }
    AttributeInfo::new(name_index, info)
}

fn annotation_element_value(pool: &mut ConstantPool, value: &AnnotationValue) -> Vec<u8> {
    let mut bytes = Vec::new();
    match value {
        AnnotationValue::Int(v) => {
            bytes.push(b'I');
            bytes.extend_from_slice(&pool.add_integer(*v).to_be_bytes());
        }
        AnnotationValue::Long(v) => {
            bytes.push(b'J');
            bytes.extend_from_slice(&pool.add_long(*v).to_be_bytes());
        }
        AnnotationValue::Float(v) => {
            bytes.push(b'F');
            bytes.extend_from_slice(&pool.add_float(*v).to_be_bytes());
        }
        AnnotationValue::Double(v) => {
            bytes.push(b'D');
            bytes.extend_from_slice(&pool.add_double(*v).to_be_bytes());
        }
        AnnotationValue::Str(v) => {
            bytes.push(b's');
            bytes.extend_from_slice(&pool.add_utf8(v).to_be_bytes());
        }
    }
    bytes
}

pub fn make_runtime_visible_annotations(
    pool: &mut ConstantPool,
    annotations: &[AnnotationDef],
) -> AttributeInfo {
    let name_index = pool.add_utf8("RuntimeVisibleAnnotations");
    let mut info = Vec::new();
    info.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        info.extend_from_slice(&pool.add_utf8(&annotation.descriptor).to_be_bytes());
        info.extend_from_slice(&(annotation.values.len() as u16).to_be_bytes());
        for (name, value) in &annotation.values {
            info.extend_from_slice(&pool.add_utf8(name).to_be_bytes());
            info.extend_from_slice(&annotation_element_value(pool, value));
        }
    }
    AttributeInfo::new(name_index, info)
}

/// Signature attribute for members carrying generic information
pub fn make_signature(pool: &mut ConstantPool, signature: &str) -> AttributeInfo {
    let name_index = pool.add_utf8("Signature");
    let info = pool.add_utf8(signature).to_be_bytes().to_vec();
    AttributeInfo::new(name_index, info)
}
