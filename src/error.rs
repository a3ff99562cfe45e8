#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    #[error("ERR {0}")]
    Generic(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("OUTOFRANGE {0}")]
    OutOfRange(String),

    #[error("ERR {0}")]
    Json(String),
}

impl KeelError {
    pub fn generic(msg: impl Into<String>) -> Self {
        KeelError::Generic(msg.into())
    }

    pub fn arity(cmd: &str) -> Self {
        KeelError::WrongArgCount(cmd.to_lowercase())
    }
}

pub type KeelResult<T> = Result<T, KeelError>;
