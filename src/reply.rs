use std::fmt;

/// The typed result of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(String),
    Integer(i64),
    BulkString(Vec<u8>),
    Array(Vec<Reply>),
    Nil,
    Double(f64),
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        Reply::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        Reply::BulkString(data.into())
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(items)
    }

    pub fn double(d: f64) -> Self {
        Reply::Double(d)
    }

    pub fn from_optional_bytes(data: Option<impl Into<Vec<u8>>>) -> Self {
        match data {
            Some(d) => Reply::BulkString(d.into()),
            None => Reply::Nil,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::BulkString(b) => Some(b),
            Reply::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::SimpleString(s) => write!(f, "{s}"),
            Reply::Error(e) => write!(f, "(error) {e}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::Double(d) => write!(f, "(double) {}", format_double(*d)),
            Reply::Nil => write!(f, "(nil)"),
            Reply::BulkString(data) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                let width = items.len().to_string().len();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "")?;
                    }
                    write!(f, "{:>width$}) ", i + 1)?;
                    item.write_indented(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders in the same shape `redis-cli` prints replies.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Format a double the way Redis does: integral values without a fraction,
/// everything else with the shortest representation that round-trips.
pub fn format_double(d: f64) -> String {
    if d.is_infinite() {
        return if d > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if d.is_nan() {
        return "nan".to_string();
    }
    if d == d.trunc() && d.abs() < 1e17 {
        return format!("{}", d as i64);
    }
    format!("{d}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(-0.0), "0");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_display_nested_array() {
        let reply = Reply::array(vec![
            Reply::bulk_string("a"),
            Reply::array(vec![Reply::integer(1), Reply::Nil]),
        ]);
        assert_eq!(reply.to_string(), "1) \"a\"\n2) 1) (integer) 1\n   2) (nil)");
    }

    #[test]
    fn test_display_empty_array() {
        assert_eq!(Reply::array(vec![]).to_string(), "(empty array)");
    }
}
