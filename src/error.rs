use thiserror::Error;

/// Result type for basaltc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the basaltc compiler
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lexical error: {message}")]
    Lexical { message: String },

    #[error("Parse error in {file} at line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Semantic error: {message}")]
    Semantic { message: String },

    #[error("Code generation error: {message}")]
    CodeGen { message: String },

    #[error("Unresolved symbol: {message}")]
    Resolution { message: String },

    #[error("Invocation failed: {message}")]
    Invoke { message: String },
}

impl Error {
    /// Create a parse error with location information
    pub fn parse_error(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a lexical error
    pub fn lexical_error(message: impl Into<String>) -> Self {
        Self::Lexical { message: message.into() }
    }

    /// Create a semantic error
    pub fn semantic_error(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into() }
    }

    /// Create a code generation error
    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodeGen { message: message.into() }
    }

    /// Create a resolution error
    pub fn resolution_error(message: impl Into<String>) -> Self {
        Self::Resolution { message: message.into() }
    }
}
