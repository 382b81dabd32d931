use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("stray ')' at line {line}, column {column}")]
    StrayCloseParen { line: u32, column: u32 },

    #[error("stray ']' at line {line}, column {column}")]
    StrayCloseBracket { line: u32, column: u32 },

    #[error("mismatched delimiter: expected '{expected}', found '{found}' at line {line}")]
    MismatchedDelimiter { expected: char, found: char, line: u32 },

    #[error("unclosed list starting at line {line}, column {column}")]
    UnclosedList { line: u32, column: u32 },

    #[error("unterminated string starting at line {line}, column {column}")]
    UnclosedString { line: u32, column: u32 },

    #[error("token longer than {max} bytes at line {line}, column {column}")]
    TokenTooLong { max: usize, line: u32, column: u32 },

    #[error("invalid number literal '{text}' at line {line}")]
    InvalidNumber { text: String, line: u32 },

    #[error(transparent)]
    Heap(#[from] scmc_heap::HeapError),
}

pub type Result<T> = std::result::Result<T, ReadError>;
