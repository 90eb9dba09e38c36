/// Configuration settings for the compiler
#[derive(Debug, Clone)]
pub struct Config {
    /// Print scanned tokens and extra diagnostics to stderr
    pub debug: bool,
    /// Emit LocalVariableTable debug ranges into generated class files
    pub emit_locals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            emit_locals: true,
        }
    }
}
