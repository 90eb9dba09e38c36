//! Basalt language compiler (basaltc)
//!
//! Compiles Basalt source files to JVM class files in a single pass: the
//! scanner feeds a Pratt parser whose parse actions emit bytecode
//! directly, tracking a shadow of the runtime operand stack for type
//! inference and implicit conversions.
//!
//! ## Architecture
//!
//! - **parser**: scanner (token stream) and parser state
//! - **compiler**: the compilation context — precedence-driven parsing,
//!   type/value stack discipline, delayed branch instructions, symbol
//!   resolution against the program table and the type universe
//! - **classfile**: constant pool, instruction assembly and class-file
//!   serialization
//! - **universe**: the injectable type-resolution capability for
//!   host-provided classes
//! - **rt**: the ephemeral define/invoke harness
//!
//! ## Compilation flow
//!
//! ```text
//! Basalt source → Scanner → Pratt parser ⇄ Compiler → Unit table → class files
//! ```

pub mod classfile;
pub mod compiler;
pub mod config;
pub mod error;
pub mod parser;
pub mod program;
pub mod rt;
pub mod universe;

pub use config::Config;
pub use error::{Error, Result};
pub use program::ProgramTable;

use compiler::Compiler;

/// Compile one source file into an existing program table, resolving
/// against the standard universe. Returns the implicit file unit's
/// internal name.
pub fn compile_into(
    source: &str,
    file_package: &str,
    file_stem: &str,
    config: &Config,
    program: &mut ProgramTable,
) -> Result<String> {
    let universe = universe::builtins::standard_universe();
    Compiler::new(source, file_package, file_stem, config.clone(), universe, program).compile()
}

/// Compile one source file into a fresh program table
pub fn compile_source(
    source: &str,
    file_package: &str,
    file_stem: &str,
    config: &Config,
) -> Result<ProgramTable> {
    let mut program = ProgramTable::new();
    compile_into(source, file_package, file_stem, config, &mut program)?;
    Ok(program)
}

/// Compile with an explicit type universe, for callers that bring their
/// own host types (tests, embedders, chained ephemeral runs).
pub fn compile_with_universe(
    source: &str,
    file_package: &str,
    file_stem: &str,
    config: &Config,
    universe: &dyn universe::TypeUniverse,
    program: &mut ProgramTable,
) -> Result<String> {
    Compiler::new(source, file_package, file_stem, config.clone(), universe, program).compile()
}
