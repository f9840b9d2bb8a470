//! Command-line splitting for incoming IRC commands.
//!
//! Command arguments are split shell-style: whitespace separates words,
//! single or double quotes group them, and a backslash escapes the next
//! character outside single quotes. An unterminated quote is reported to
//! the user rather than silently mangled.

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("Missing closing quotation mark")]
    UnterminatedQuote,
}

/// Split a command line into words.
pub fn split_args(input: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' => match chars.next() {
                    Some(next) => current.push(next),
                    None => return Err(SplitError::UnterminatedQuote),
                },
                _ => current.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(SplitError::UnterminatedQuote);
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            split_args("dice -c 3 -s 20").unwrap(),
            vec!["dice", "-c", "3", "-s", "20"]
        );
        assert_eq!(split_args("  echo   hi  ").unwrap(), vec!["echo", "hi"]);
        assert!(split_args("").unwrap().is_empty());
        assert!(split_args("   ").unwrap().is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            split_args("echo \"two words\" tail").unwrap(),
            vec!["echo", "two words", "tail"]
        );
        assert_eq!(
            split_args("echo 'don\"t split'").unwrap(),
            vec!["echo", "don\"t split"]
        );
    }

    #[test]
    fn empty_quotes_produce_an_empty_word() {
        assert_eq!(split_args("echo \"\"").unwrap(), vec!["echo", ""]);
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(split_args(r#"echo a\ b"#).unwrap(), vec!["echo", "a b"]);
        assert_eq!(split_args(r#"echo "a \" b""#).unwrap(), vec!["echo", "a \" b"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(split_args("echo \"oops"), Err(SplitError::UnterminatedQuote));
        assert_eq!(split_args("echo 'oops"), Err(SplitError::UnterminatedQuote));
    }
}
