//! Byte-level tokenizer for HTTP header field values.
//!
//! The outer pass classifies bytes into quoted strings (with `\`-escapes),
//! whitespace runs, and token runs; the fine pass additionally breaks token
//! runs on the single-byte delimiters relevant to the grammar being parsed
//! (`,;=` for the generic value grammar, `,=` for credentials).

use super::HeaderParseError;

/// One lexical element of a header field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    /// A grammar delimiter byte.
    Delim(u8),
    /// A run of token bytes.
    Word(String),
    /// A quoted-string with escapes resolved.
    Quoted(String),
    /// A run of SP / HTAB.
    Space,
}

fn is_ctl(b: u8) -> bool {
    (b < 0x20 && b != b'\t') || b == 0x7f
}

/// Tokenize `input`, splitting token runs on `delims`.
///
/// Rejects control bytes (other than HTAB) and unterminated or truncated
/// quoted strings. Bytes 0x80–0xFF are token bytes.
pub(crate) fn tokenize(input: &str, delims: &[u8]) -> Result<Vec<Tok>, HeaderParseError> {
    let bytes = input.as_bytes();
    let mut toks = Vec::new();
    let mut word = String::new();
    let mut i = 0usize;

    let flush = |word: &mut String, toks: &mut Vec<Tok>| {
        if !word.is_empty() {
            toks.push(Tok::Word(std::mem::take(word)));
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' {
            flush(&mut word, &mut toks);
            let (quoted, next) = scan_quoted(input, i)?;
            toks.push(Tok::Quoted(quoted));
            i = next;
        } else if b == b' ' || b == b'\t' {
            flush(&mut word, &mut toks);
            while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
                i += 1;
            }
            toks.push(Tok::Space);
        } else if is_ctl(b) {
            return Err(HeaderParseError::ControlByte(b));
        } else if delims.contains(&b) {
            flush(&mut word, &mut toks);
            toks.push(Tok::Delim(b));
            i += 1;
        } else {
            // Consume the full UTF-8 scalar so multi-byte text stays intact.
            let ch = input[i..].chars().next().unwrap_or('\u{fffd}');
            word.push(ch);
            i += ch.len_utf8();
        }
    }
    flush(&mut word, &mut toks);
    Ok(toks)
}

/// Scan a quoted-string starting at the opening `"` at byte offset `start`.
/// Returns the unescaped content and the offset just past the closing `"`.
fn scan_quoted(input: &str, start: usize) -> Result<(String, usize), HeaderParseError> {
    let bytes = input.as_bytes();
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Ok((out, i + 1)),
            b'\\' => {
                i += 1;
                let ch = input
                    .get(i..)
                    .and_then(|s| s.chars().next())
                    .ok_or(HeaderParseError::UnterminatedQuote)?;
                out.push(ch);
                i += ch.len_utf8();
            }
            b if is_ctl(b) => return Err(HeaderParseError::ControlByte(b)),
            _ => {
                let ch = input[i..].chars().next().unwrap_or('\u{fffd}');
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    Err(HeaderParseError::UnterminatedQuote)
}

/// Delimiters of the generic value-with-parameters grammar.
pub(crate) const GENERIC_DELIMS: &[u8] = &[b',', b';', b'='];

/// Delimiters of the credentials grammar. Auth-params use only `,` between
/// them and SP between scheme and token, so `;` is an ordinary token byte.
pub(crate) const CREDENTIALS_DELIMS: &[u8] = &[b',', b'='];
