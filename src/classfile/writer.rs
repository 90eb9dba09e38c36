//! Serialization of a [`Unit`] into class-file bytes
//!
//! The instruction encoding, descriptor grammar and constant-pool entry
//! kinds follow the class-file format exactly; the output is fed to the
//! consuming virtual machine's loader with no further transformation.
//! Files are emitted at major version 49 so the loader's inference
//! verifier applies and no stack-map frames are required.

use super::attribute::{
    make_code_attribute, make_inner_classes, make_local_variable_table,
    make_runtime_visible_annotations, make_signature, AttributeInfo, InnerClassRow,
    LocalVariableRow,
};
use super::code::assemble;
use super::constpool::ConstantPool;
use crate::error::Result;
use crate::program::{AnnotationDef, Unit};

pub const MAGIC: u32 = 0xCAFE_BABE;
pub const MAJOR_VERSION: u16 = 49;
pub const MINOR_VERSION: u16 = 0;

const INLINE_ANNOTATION: &str = "Lbasalt/lang/Inline;";
const NULLABLE_ANNOTATION: &str = "Lbasalt/lang/Nullable;";
const NONNULL_ANNOTATION: &str = "Lbasalt/lang/NotNull;";

/// Serialize one unit to class-file bytes
pub fn unit_to_bytes(unit: &Unit) -> Result<Vec<u8>> {
    let mut pool = ConstantPool::new();

    let this_class = pool.add_class(&unit.name);
    let super_class = pool.add_class(&unit.super_name);

    let mut field_bytes = Vec::new();
    for field in &unit.fields {
        let name_index = pool.add_utf8(&field.name);
        let descriptor_index = pool.add_utf8(&field.descriptor);

        let mut attributes: Vec<AttributeInfo> = Vec::new();
        let mut annotations: Vec<AnnotationDef> = field.annotations.clone();
        if field.inline {
            annotations.push(AnnotationDef::marker(INLINE_ANNOTATION));
        }
        annotations.push(AnnotationDef::marker(if field.nullable {
            NULLABLE_ANNOTATION
        } else {
            NONNULL_ANNOTATION
        }));
        attributes.push(make_runtime_visible_annotations(&mut pool, &annotations));
        if let Some(signature) = &field.signature {
            attributes.push(make_signature(&mut pool, signature));
        }

        field_bytes.extend_from_slice(&field.access.to_be_bytes());
        field_bytes.extend_from_slice(&name_index.to_be_bytes());
        field_bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        field_bytes.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            field_bytes.extend_from_slice(&attribute.to_bytes());
        }
    }

    let mut method_bytes = Vec::new();
    for method in &unit.methods {
        let name_index = pool.add_utf8(&method.name);
        let descriptor_index = pool.add_utf8(&method.descriptor);

        let assembled = assemble(&method.code, &mut pool)?;

        let mut code_inner = Vec::new();
        if !method.local_vars.is_empty() {
            let code_len = assembled.bytes.len() as u16;
            let rows: Vec<LocalVariableRow> = method
                .local_vars
                .iter()
                .filter_map(|entry| {
                    let start_pc = *assembled.label_offsets.get(&entry.start)?;
                    let end_pc = assembled
                        .label_offsets
                        .get(&entry.end)
                        .copied()
                        .unwrap_or(code_len);
                    Some(LocalVariableRow {
                        start_pc,
                        length: end_pc.saturating_sub(start_pc),
                        name: entry.name.clone(),
                        descriptor: entry.descriptor.clone(),
                        index: entry.slot,
                    })
                })
                .collect();
            code_inner.push(make_local_variable_table(&mut pool, &rows));
        }

        let mut attributes = vec![make_code_attribute(
            &mut pool,
            assembled.max_stack,
            method.max_locals,
            &assembled.bytes,
            code_inner,
        )];

        let mut annotations = method.annotations.clone();
        if method.markers.inline {
            annotations.push(AnnotationDef::marker(INLINE_ANNOTATION));
        }
        if !annotations.is_empty() {
            attributes.push(make_runtime_visible_annotations(&mut pool, &annotations));
        }
        if let Some(signature) = &method.signature {
            attributes.push(make_signature(&mut pool, signature));
        }

        method_bytes.extend_from_slice(&method.access.to_be_bytes());
        method_bytes.extend_from_slice(&name_index.to_be_bytes());
        method_bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        method_bytes.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            method_bytes.extend_from_slice(&attribute.to_bytes());
        }
    }

    let mut class_attributes: Vec<AttributeInfo> = Vec::new();
    if !unit.annotations.is_empty() {
        class_attributes.push(make_runtime_visible_annotations(&mut pool, &unit.annotations));
    }
    if !unit.nested.is_empty() || unit.outer.is_some() {
        let mut rows = Vec::new();
        for inner in &unit.nested {
            rows.push(inner_class_row(inner, &unit.name));
        }
        if let Some(outer) = &unit.outer {
            rows.push(inner_class_row(&unit.name, outer));
        }
        class_attributes.push(make_inner_classes(&mut pool, &rows));
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC.to_be_bytes());
    bytes.extend_from_slice(&MINOR_VERSION.to_be_bytes());
    bytes.extend_from_slice(&MAJOR_VERSION.to_be_bytes());
    bytes.extend_from_slice(&pool.to_bytes());
    bytes.extend_from_slice(&unit.access.to_be_bytes());
    bytes.extend_from_slice(&this_class.to_be_bytes());
    bytes.extend_from_slice(&super_class.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
    bytes.extend_from_slice(&(unit.fields.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&field_bytes);
    bytes.extend_from_slice(&(unit.methods.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&method_bytes);
    bytes.extend_from_slice(&(class_attributes.len() as u16).to_be_bytes());
    for attribute in class_attributes {
        bytes.extend_from_slice(&attribute.to_bytes());
    }

    Ok(bytes)
}

fn inner_class_row(inner: &str, outer: &str) -> InnerClassRow {
    let simple = inner.rsplit(['/', '$']).next().unwrap_or(inner).to_string();
    InnerClassRow {
        inner: inner.to_string(),
        outer: outer.to_string(),
        inner_simple: simple,
        access: crate::program::access::ACC_PUBLIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::code::{Const, Insn};
    use crate::classfile::opcodes as op;
    use crate::program::{access, MethodDef, Unit};

    fn sample_unit() -> Unit {
        let mut unit = Unit::new("demo/Main", access::ACC_PUBLIC | access::ACC_SUPER);
        let mut method = MethodDef::new(
            access::ACC_PUBLIC | access::ACC_STATIC,
            "answer",
            "()I",
        );
        method.code = vec![Insn::Push(Const::Int(42)), Insn::Simple(op::IRETURN)];
        method.max_locals = 0;
        unit.methods.push(method);
        unit
    }

    #[test]
    fn header_magic_and_version() {
        let bytes = unit_to_bytes(&sample_unit()).unwrap();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), MINOR_VERSION);
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), MAJOR_VERSION);
    }

    #[test]
    fn serializes_without_error_for_branching_code() {
        let mut unit = sample_unit();
        let method = &mut unit.methods[0];
        method.code = vec![
            Insn::Push(Const::Int(1)),
            Insn::Jump { op: op::IFEQ, target: 0 },
            Insn::Push(Const::Int(2)),
            Insn::Label(0),
            Insn::Push(Const::Int(3)),
            Insn::Simple(op::IRETURN),
        ];
        assert!(unit_to_bytes(&unit).is_ok());
    }
}
