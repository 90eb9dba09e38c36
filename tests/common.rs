// Common test utilities

use basaltc::classfile::code::Insn;
use basaltc::program::ProgramTable;
use basaltc::Config;

/// Compile one source file as demo/Main with the standard universe
pub fn compile(source: &str) -> ProgramTable {
    basaltc::compile_source(source, "demo", "Main", &Config::default())
        .expect("compilation failed")
}

/// Compile a source expected to fail, returning the error
pub fn compile_err(source: &str) -> basaltc::Error {
    basaltc::compile_source(source, "demo", "Main", &Config::default())
        .err()
        .expect("compilation unexpectedly succeeded")
}

/// Instruction sequence of a method, labels filtered out
pub fn method_insns(program: &ProgramTable, unit: &str, method: &str) -> Vec<Insn> {
    let unit = program
        .unit(unit)
        .unwrap_or_else(|| panic!("unit {} missing from program table", unit));
    let def = unit
        .methods
        .iter()
        .find(|m| m.name == method)
        .unwrap_or_else(|| panic!("method {} missing from {}", method, unit.name));
    def.code
        .iter()
        .filter(|insn| !matches!(insn, Insn::Label(_)))
        .cloned()
        .collect()
}

/// Whether any instruction of a method satisfies the predicate
pub fn method_has(
    program: &ProgramTable,
    unit: &str,
    method: &str,
    predicate: impl Fn(&Insn) -> bool,
) -> bool {
    method_insns(program, unit, method).iter().any(predicate)
}
