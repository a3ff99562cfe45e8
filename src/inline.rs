//! Splitting of shell input lines into command words.
//!
//! Words are separated by whitespace. A double-quoted word understands the
//! escapes `\"`, `\\`, `\n`, `\r`, `\t` and `\xHH`; a single-quoted word is
//! taken literally apart from `\'`.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InlineError {
    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,
    #[error("closing quote must be followed by a space")]
    TrailingQuote,
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

pub fn split_words(line: &[u8]) -> Result<Vec<Bytes>, InlineError> {
    let mut words = Vec::new();
    let mut i = 0;

    loop {
        while i < line.len() && line[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == line.len() {
            return Ok(words);
        }

        let mut word = Vec::new();
        match line[i] {
            b'"' => {
                i += 1;
                loop {
                    let Some(&c) = line.get(i) else {
                        return Err(InlineError::UnbalancedQuotes);
                    };
                    match c {
                        b'"' => break,
                        b'\\' if i + 1 < line.len() => {
                            let next = line[i + 1];
                            let hex = (next == b'x')
                                .then(|| Some(hex_digit(*line.get(i + 2)?)? << 4 | hex_digit(*line.get(i + 3)?)?))
                                .flatten();
                            if let Some(byte) = hex {
                                word.push(byte);
                                i += 4;
                                continue;
                            }
                            word.push(match next {
                                b'n' => b'\n',
                                b'r' => b'\r',
                                b't' => b'\t',
                                other => other,
                            });
                            i += 2;
                            continue;
                        }
                        _ => word.push(c),
                    }
                    i += 1;
                }
                i += 1;
            }
            b'\'' => {
                i += 1;
                loop {
                    let Some(&c) = line.get(i) else {
                        return Err(InlineError::UnbalancedQuotes);
                    };
                    match c {
                        b'\'' => break,
                        b'\\' if line.get(i + 1) == Some(&b'\'') => {
                            word.push(b'\'');
                            i += 2;
                            continue;
                        }
                        _ => word.push(c),
                    }
                    i += 1;
                }
                i += 1;
            }
            _ => {
                while i < line.len() && !line[i].is_ascii_whitespace() {
                    word.push(line[i]);
                    i += 1;
                }
                words.push(Bytes::from(word));
                continue;
            }
        }

        if line.get(i).is_some_and(|c| !c.is_ascii_whitespace()) {
            return Err(InlineError::TrailingQuote);
        }
        words.push(Bytes::from(word));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        split_words(line.as_bytes())
            .unwrap()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(words("  SET  key   value "), vec!["SET", "key", "value"]);
        assert!(words("   ").is_empty());
    }

    #[test]
    fn test_quoted_words() {
        assert_eq!(
            words(r#"JSON.SET doc $ '{"a":[1,2]}'"#),
            vec!["JSON.SET", "doc", "$", r#"{"a":[1,2]}"#]
        );
        assert_eq!(words(r#"SET k "hello world""#), vec!["SET", "k", "hello world"]);
        assert_eq!(words(r#"SET k "a\"b\n""#), vec!["SET", "k", "a\"b\n"]);
        assert_eq!(words(r#"SET k """#), vec!["SET", "k", ""]);
    }

    #[test]
    fn test_hex_escape() {
        let parsed = split_words(br#"SET k "\xff\x00z""#).unwrap();
        assert_eq!(&parsed[2][..], &[0xff, 0x00, b'z']);
    }

    #[test]
    fn test_quote_errors() {
        assert_eq!(split_words(br#"SET k "open"#), Err(InlineError::UnbalancedQuotes));
        assert_eq!(split_words(b"SET k 'open"), Err(InlineError::UnbalancedQuotes));
        assert_eq!(split_words(br#"SET k "a"b"#), Err(InlineError::TrailingQuote));
    }
}
