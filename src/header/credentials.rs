//! State machine for the credentials grammar of RFC 7235:
//!
//! ```text
//! credentials = auth-scheme [ 1*SP ( token68 / #auth-param ) ]
//! token68     = 1*( ALPHA / DIGIT / "-" / "." / "_" / "~" / "+" / "/" ) *"="
//! ```
//!
//! and its list form `#credentials` as used by `WWW-Authenticate`.
//!
//! The emitted descriptor's `value` is the scheme, lowercased; its params
//! carry either the bare `token68` or the individual auth-params
//! (lowercased names, quoted-strings decoded). The scheme is additionally
//! stored under the synthetic `scheme` key so downstream code can select a
//! protocol without special-casing the value slot.
//!
//! The classic `#credentials` ambiguity — after a comma, a bare word may
//! open a new challenge or name another auth-param — is resolved by
//! lookahead: a word followed by `=` and a value continues the current
//! credentials, anything else starts a new one.

use super::tokenizer::{tokenize, Tok, CREDENTIALS_DELIMS};
use super::{HeaderDescriptor, HeaderParseError};

/// Synthetic parameter key carrying the (lowercased) scheme.
pub const SCHEME_PARAM: &str = "scheme";

/// Parameter key for bare token68 credentials.
pub const TOKEN68_PARAM: &str = "token68";

fn is_token68_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/')
}

fn validate_token68(word: &str) -> Result<(), HeaderParseError> {
    if word.is_empty() || !word.bytes().all(is_token68_byte) {
        return Err(HeaderParseError::MalformedToken68(word.to_string()));
    }
    Ok(())
}

struct Cursor<'t> {
    toks: &'t [Tok],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Tok> {
        let tok = self.toks.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(Tok::Space)) {
            self.pos += 1;
        }
    }

    /// Position of the next non-space token at or after `from`.
    fn next_solid(&self, from: usize) -> Option<(usize, &'t Tok)> {
        let mut i = from;
        while let Some(tok) = self.toks.get(i) {
            if *tok != Tok::Space {
                return Some((i, tok));
            }
            i += 1;
        }
        None
    }

    /// True when the word at the current position opens an auth-param,
    /// i.e. it is followed by `=` and a token or quoted-string.
    fn looks_like_auth_param(&self) -> bool {
        let Some((eq_pos, tok)) = self.next_solid(self.pos + 1) else {
            return false;
        };
        if *tok != Tok::Delim(b'=') {
            return false;
        }
        matches!(
            self.next_solid(eq_pos + 1),
            Some((_, Tok::Word(_))) | Some((_, Tok::Quoted(_)))
        )
    }
}

fn unexpected(tok: &Tok) -> HeaderParseError {
    let text = match tok {
        Tok::Delim(b) => (*b as char).to_string(),
        Tok::Word(w) => w.clone(),
        Tok::Quoted(q) => format!("{q:?}"),
        Tok::Space => " ".to_string(),
    };
    HeaderParseError::UnexpectedToken(text)
}

/// Parse the list form `#credentials` (e.g. `WWW-Authenticate`).
pub(crate) fn parse_credentials_list(
    input: &str,
) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    let toks = tokenize(input, CREDENTIALS_DELIMS)?;
    let mut cur = Cursor {
        toks: &toks,
        pos: 0,
    };
    let mut out = Vec::new();

    loop {
        // Skip list separators and empty elements.
        cur.skip_space();
        while matches!(cur.peek(), Some(Tok::Delim(b','))) {
            cur.bump();
            cur.skip_space();
        }
        let Some(tok) = cur.peek() else { break };

        let scheme = match tok {
            Tok::Word(w) => w.clone(),
            other => return Err(unexpected(other)),
        };
        cur.bump();

        let mut descriptor = HeaderDescriptor::new(scheme.to_ascii_lowercase());
        descriptor
            .params
            .insert(SCHEME_PARAM.to_string(), scheme.to_ascii_lowercase());

        let had_space = matches!(cur.peek(), Some(Tok::Space));
        cur.skip_space();

        match cur.peek() {
            None | Some(Tok::Delim(b',')) => {
                // Scheme-only credentials.
                out.push(descriptor);
                continue;
            }
            Some(Tok::Word(_)) if had_space => {
                if cur.looks_like_auth_param() {
                    parse_auth_params(&mut cur, &mut descriptor)?;
                } else {
                    parse_token68(&mut cur, &mut descriptor)?;
                }
                out.push(descriptor);
            }
            Some(other) => return Err(unexpected(other)),
        }
    }

    Ok(out)
}

/// Parse exactly one credentials production (e.g. `Authorization`).
pub(crate) fn parse_credentials(input: &str) -> Result<HeaderDescriptor, HeaderParseError> {
    let mut list = parse_credentials_list(input)?;
    match list.len() {
        0 => Err(HeaderParseError::UnexpectedEnd),
        1 => Ok(list.remove(0)),
        _ => Err(HeaderParseError::UnexpectedToken(",".to_string())),
    }
}

fn parse_token68(
    cur: &mut Cursor<'_>,
    descriptor: &mut HeaderDescriptor,
) -> Result<(), HeaderParseError> {
    let mut token = match cur.bump() {
        Some(Tok::Word(w)) => {
            validate_token68(w)?;
            w.clone()
        }
        Some(other) => return Err(unexpected(other)),
        None => return Err(HeaderParseError::UnexpectedEnd),
    };
    // Trailing '=' padding binds to the token without intervening space.
    while matches!(cur.peek(), Some(Tok::Delim(b'='))) {
        cur.bump();
        token.push('=');
    }

    descriptor
        .params
        .insert(TOKEN68_PARAM.to_string(), token);

    cur.skip_space();
    match cur.peek() {
        None | Some(Tok::Delim(b',')) => Ok(()),
        Some(other) => Err(unexpected(other)),
    }
}

fn parse_auth_params(
    cur: &mut Cursor<'_>,
    descriptor: &mut HeaderDescriptor,
) -> Result<(), HeaderParseError> {
    loop {
        let name = match cur.bump() {
            Some(Tok::Word(w)) => w.to_ascii_lowercase(),
            Some(other) => return Err(unexpected(other)),
            None => return Err(HeaderParseError::UnexpectedEnd),
        };
        cur.skip_space();
        match cur.bump() {
            Some(Tok::Delim(b'=')) => {}
            Some(other) => return Err(unexpected(other)),
            None => return Err(HeaderParseError::UnexpectedEnd),
        }
        cur.skip_space();
        let value = match cur.bump() {
            Some(Tok::Word(w)) => w.clone(),
            Some(Tok::Quoted(q)) => q.clone(),
            Some(other) => return Err(unexpected(other)),
            None => return Err(HeaderParseError::UnexpectedEnd),
        };
        descriptor.params.insert(name, value);

        cur.skip_space();
        match cur.peek() {
            None => return Ok(()),
            Some(Tok::Delim(b',')) => {
                // Another auth-param, or the next credentials in the list.
                let after_comma = cur.pos + 1;
                let Some((solid, tok)) = cur.next_solid(after_comma) else {
                    // Trailing comma: an empty final list element.
                    cur.pos = after_comma;
                    return Ok(());
                };
                let continues = matches!(tok, Tok::Word(_)) && {
                    let probe = Cursor {
                        toks: cur.toks,
                        pos: solid,
                    };
                    probe.looks_like_auth_param()
                };
                if continues {
                    cur.pos = solid;
                } else {
                    // Leave the comma for the list loop; a new credentials
                    // production starts here.
                    return Ok(());
                }
            }
            Some(other) => return Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_with_token68() {
        let d = parse_credentials("Bearer dXNlcjpwYXNz").unwrap();
        assert_eq!(d.value, "bearer");
        assert_eq!(d.params.get(SCHEME_PARAM), Some(&"bearer".to_string()));
        assert_eq!(
            d.params.get(TOKEN68_PARAM),
            Some(&"dXNlcjpwYXNz".to_string())
        );
    }

    #[test]
    fn test_token68_with_padding() {
        let d = parse_credentials("Basic QWxhZGRpbg==").unwrap();
        assert_eq!(
            d.params.get(TOKEN68_PARAM),
            Some(&"QWxhZGRpbg==".to_string())
        );
    }

    #[test]
    fn test_scheme_with_auth_params() {
        let d = parse_credentials(
            r#"Digest username="mia", realm="api", nonce="abc123", uri="/res", response="d41d8cd9""#,
        )
        .unwrap();
        assert_eq!(d.value, "digest");
        assert_eq!(d.params.get("username"), Some(&"mia".to_string()));
        assert_eq!(d.params.get("realm"), Some(&"api".to_string()));
        assert_eq!(d.params.get("response"), Some(&"d41d8cd9".to_string()));
    }

    #[test]
    fn test_param_names_lowercased_values_decoded() {
        let d = parse_credentials(r#"Digest USERNAME="a \"b\"""#).unwrap();
        assert_eq!(d.params.get("username"), Some(&r#"a "b""#.to_string()));
    }

    #[test]
    fn test_scheme_only() {
        let list = parse_credentials_list("Negotiate").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].value, "negotiate");
        assert!(!list[0].params.contains_key(TOKEN68_PARAM));
    }

    #[test]
    fn test_challenge_list() {
        let list =
            parse_credentials_list(r#"Basic realm="files", Digest realm="api", qop="auth""#)
                .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].value, "basic");
        assert_eq!(list[0].params.get("realm"), Some(&"files".to_string()));
        assert_eq!(list[1].value, "digest");
        assert_eq!(list[1].params.get("realm"), Some(&"api".to_string()));
        assert_eq!(list[1].params.get("qop"), Some(&"auth".to_string()));
    }

    #[test]
    fn test_list_with_token68_then_challenge() {
        let list = parse_credentials_list("Bearer abc123, Basic realm=\"x\"").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].params.get(TOKEN68_PARAM), Some(&"abc123".to_string()));
        assert_eq!(list[1].value, "basic");
    }

    #[test]
    fn test_authorization_rejects_list() {
        assert!(parse_credentials("Basic abc, Bearer xyz").is_err());
    }

    #[test]
    fn test_empty_input_rejected_for_single() {
        assert_eq!(
            parse_credentials("").unwrap_err(),
            HeaderParseError::UnexpectedEnd
        );
    }

    #[test]
    fn test_malformed_token68() {
        assert!(matches!(
            parse_credentials("Bearer a:b"),
            Err(HeaderParseError::MalformedToken68(_))
        ));
    }

    #[test]
    fn test_missing_space_before_params_is_error() {
        // `Digest=x` reads as a word followed by '=', not a scheme.
        assert!(parse_credentials_list("Digest=x").is_err());
    }
}
