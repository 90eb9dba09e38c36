//! Ephemeral load/execute harness
//!
//! Takes a finished program table, serializes every unit, and exposes the
//! define/invoke contract: defined units become a type universe for later
//! compilations, class files can be written out, and an entry point can
//! be invoked on the host `java` runtime. Failures carry a disassembly of
//! the offending unit for diagnostics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::classfile::{disasm, writer};
use crate::error::{Error, Result};
use crate::program::ProgramTable;
use crate::universe::{describe_program, ClassDesc, HostUniverse, TypeUniverse};

static INVOCATION_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Units defined into a runnable, resolvable form
pub struct EphemeralLoader {
    /// (internal name, class-file bytes) in declaration order
    classes: Vec<(String, Vec<u8>)>,
    universe: HostUniverse,
    /// Pre-rendered disassemblies for failure diagnostics
    dumps: HashMap<String, String>,
}

impl EphemeralLoader {
    /// Serialize and index every unit of a finished compilation
    pub fn define(table: &ProgramTable) -> Result<Self> {
        let mut classes = Vec::with_capacity(table.len());
        let mut dumps = HashMap::new();
        for unit in table.iter() {
            let bytes = writer::unit_to_bytes(unit).map_err(|e| {
                Error::codegen_error(format!(
                    "defining {} failed: {}\n{}",
                    unit.name,
                    e,
                    disasm::disassemble_unit(unit)
                ))
            })?;
            dumps.insert(unit.name.clone(), disasm::disassemble_unit(unit));
            classes.push((unit.name.clone(), bytes));
        }
        Ok(Self {
            classes,
            universe: describe_program(table),
            dumps,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.classes.iter().map(|(n, b)| (n.as_str(), b.as_slice()))
    }

    /// Human-readable dump of a defined unit
    pub fn disassemble(&self, internal_name: &str) -> Option<&str> {
        self.dumps.get(internal_name).map(|s| s.as_str())
    }

    /// Write `.class` files under `dir`, creating package directories
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        for (name, bytes) in &self.classes {
            let path = dir.join(format!("{}.class", name));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(())
    }

    /// Invoke `main(String[])` of the entry unit on the host runtime.
    /// Returns the process exit code.
    pub fn invoke(&self, entry: &str, args: &[String]) -> Result<i32> {
        let sequence = INVOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir: PathBuf = std::env::temp_dir().join(format!(
            "basaltc-{}-{}",
            std::process::id(),
            sequence
        ));
        std::fs::create_dir_all(&dir)?;
        self.write_to(&dir)?;

        let entry_dotted = entry.replace('/', ".");
        let status = Command::new("java")
            .arg("-cp")
            .arg(&dir)
            .arg(&entry_dotted)
            .args(args)
            .status()
            .map_err(|e| Error::Invoke {
                message: format!(
                    "could not launch java for {}: {}\n{}",
                    entry_dotted,
                    e,
                    self.disassemble(entry).unwrap_or("<unknown unit>")
                ),
            })?;

        let _ = std::fs::remove_dir_all(&dir);

        match status.code() {
            Some(code) => Ok(code),
            None => Err(Error::Invoke {
                message: format!(
                    "{} terminated abnormally\n{}",
                    entry_dotted,
                    self.disassemble(entry).unwrap_or("<unknown unit>")
                ),
            }),
        }
    }
}

impl TypeUniverse for EphemeralLoader {
    fn class(&self, internal_name: &str) -> Option<&ClassDesc> {
        self.universe.class(internal_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::code::{Const, Insn};
    use crate::classfile::opcodes as op;
    use crate::program::{access, MethodDef, Unit};

    fn table_with_unit() -> ProgramTable {
        let mut unit = Unit::new("demo/Main", access::ACC_PUBLIC | access::ACC_SUPER);
        let mut method =
            MethodDef::new(access::ACC_PUBLIC | access::ACC_STATIC, "answer", "()I");
        method.code = vec![Insn::Push(Const::Int(42)), Insn::Simple(op::IRETURN)];
        unit.methods.push(method);
        let mut table = ProgramTable::new();
        table.declare(unit);
        table
    }

    #[test]
    fn define_serializes_and_indexes() {
        let loader = EphemeralLoader::define(&table_with_unit()).unwrap();
        let classes: Vec<&str> = loader.classes().map(|(n, _)| n).collect();
        assert_eq!(classes, vec!["demo/Main"]);
        // defined units resolve as a type universe for later runs
        let desc = loader.class("demo/Main").unwrap();
        assert!(desc.find_method("answer", 0).is_some());
        assert!(loader.disassemble("demo/Main").unwrap().contains("ireturn"));
    }

    #[test]
    fn write_to_creates_package_directories() {
        let loader = EphemeralLoader::define(&table_with_unit()).unwrap();
        let dir = std::env::temp_dir().join(format!("basaltc-test-{}", std::process::id()));
        loader.write_to(&dir).unwrap();
        assert!(dir.join("demo/Main.class").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
