//! Text encoding for LS8 programs
//!
//! A program is a list of lines, each holding one byte written in base 2:
//!
//! ```text
//! # print8.ls8
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! ```
//!
//! Anything after a `#` is a comment, and blank lines are skipped.
use alloc::{string::String, vec::Vec};
use thiserror::Error;

/// Error produced when a line isn't a valid byte
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("line {line}: {text:?} is not a binary byte")]
pub struct ParseError {
    /// Line number, starting at 1
    pub line: usize,
    /// Line contents, with comments and whitespace removed
    pub text: String,
}

/// Strips the comment and surrounding whitespace from a line
pub fn sanitize(line: &str) -> &str {
    let end = line.find(['#', '\n']).unwrap_or(line.len());
    line[..end].trim()
}

/// Parses a program into the bytes to be loaded into RAM
pub fn parse(text: &str) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let s = sanitize(line);
        if s.is_empty() {
            continue;
        }
        let b = u8::from_str_radix(s, 2).map_err(|_| ParseError {
            line: i + 1,
            text: s.into(),
        })?;
        out.push(b);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sanitize_lines() {
        assert_eq!(sanitize("10000010 # LDI R0,8\n"), "10000010");
        assert_eq!(sanitize("  00000001  "), "00000001");
        assert_eq!(sanitize("# just a comment"), "");
        assert_eq!(sanitize("\n"), "");
        assert_eq!(sanitize("01000111#PRN"), "01000111");
    }

    #[test]
    fn parse_program() {
        const PRINT8: &str = "
# print8.ls8: Print the number 8 on the screen

10000010 # LDI R0,8
00000000
00001000
01000111 # PRN R0
00000000
00000001 # HLT
";
        assert_eq!(parse(PRINT8), Ok(vec![0x82, 0x00, 0x08, 0x47, 0x00, 0x01]));
        assert_eq!(parse(""), Ok(vec![]));
        assert_eq!(parse("# nothing\n\n   \n"), Ok(vec![]));
        assert_eq!(parse("1\r\n10\r\n"), Ok(vec![1, 2]));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            parse("00000001\n\n0000002 # oops\n"),
            Err(ParseError {
                line: 3,
                text: "0000002".to_owned()
            })
        );
        let err = parse("100000000").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(
            err.to_string(),
            "line 1: \"100000000\" is not a binary byte"
        );
        assert!(parse("LDI").is_err());
    }
}
