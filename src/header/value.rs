//! State machine for the generic value-with-parameters grammar:
//!
//! ```text
//! 1#( field-value *( OWS ";" OWS name "=" value ) )
//! ```
//!
//! where `value` is a token or a quoted-string. Empty list elements are
//! skipped, per the usual leniency for `#rule` receivers; everything else
//! that deviates from the grammar is a fatal syntax error.

use super::tokenizer::{tokenize, Tok, GENERIC_DELIMS};
use super::{HeaderDescriptor, HeaderParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Collecting the main value fragments.
    Value,
    /// After `;`, expecting a parameter name.
    ParamName,
    /// After a parameter name, expecting `=`.
    ParamEq,
    /// After `=`, expecting the parameter value.
    ParamValue,
    /// After a complete parameter, expecting `;`, `,`, or end.
    ParamDone,
}

struct Builder {
    descriptor: HeaderDescriptor,
    pending_space: bool,
    param_name: String,
}

impl Builder {
    fn new() -> Self {
        Self {
            descriptor: HeaderDescriptor::default(),
            pending_space: false,
            param_name: String::new(),
        }
    }

    fn append_fragment(&mut self, fragment: &str) {
        if self.pending_space && !self.descriptor.value.is_empty() {
            self.descriptor.value.push(' ');
        }
        self.descriptor.value.push_str(fragment);
        self.pending_space = false;
    }

    fn is_empty(&self) -> bool {
        self.descriptor.value.is_empty() && self.descriptor.params.is_empty()
    }

    fn emit(&mut self, out: &mut Vec<HeaderDescriptor>) {
        if !self.is_empty() {
            out.push(std::mem::take(&mut self.descriptor));
        }
        self.pending_space = false;
        self.param_name.clear();
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

/// Parse a header field value into its comma-separated descriptors.
pub(crate) fn parse_value_list(input: &str) -> Result<Vec<HeaderDescriptor>, HeaderParseError> {
    let toks = tokenize(input, GENERIC_DELIMS)?;
    let mut out = Vec::new();
    let mut state = State::Value;
    let mut builder = Builder::new();

    for tok in &toks {
        state = match (state, tok) {
            (State::Value, Tok::Word(w)) => {
                builder.append_fragment(w);
                State::Value
            }
            (State::Value, Tok::Quoted(q)) => {
                builder.append_fragment(q);
                State::Value
            }
            (State::Value, Tok::Space) => {
                builder.pending_space = true;
                State::Value
            }
            (State::Value, Tok::Delim(b';')) => {
                if builder.descriptor.value.is_empty() {
                    return Err(unexpected(tok));
                }
                State::ParamName
            }
            (State::Value, Tok::Delim(b',')) => {
                builder.emit(&mut out);
                State::Value
            }
            // '=' only separates names from values inside parameters; in
            // value position (`Cookie: a=b`, `Range: bytes=0-9`) it is part
            // of the value.
            (State::Value, Tok::Delim(b'=')) => {
                builder.append_fragment("=");
                State::Value
            }

            (State::ParamName, Tok::Space) => State::ParamName,
            (State::ParamName, Tok::Word(w)) => {
                builder.param_name = w.to_ascii_lowercase();
                State::ParamEq
            }

            (State::ParamEq, Tok::Space) => State::ParamEq,
            (State::ParamEq, Tok::Delim(b'=')) => State::ParamValue,

            (State::ParamValue, Tok::Space) => State::ParamValue,
            (State::ParamValue, Tok::Word(w)) => {
                let name = std::mem::take(&mut builder.param_name);
                builder.descriptor.params.insert(name, w.clone());
                State::ParamDone
            }
            (State::ParamValue, Tok::Quoted(q)) => {
                let name = std::mem::take(&mut builder.param_name);
                builder.descriptor.params.insert(name, q.clone());
                State::ParamDone
            }

            (State::ParamDone, Tok::Space) => State::ParamDone,
            (State::ParamDone, Tok::Delim(b';')) => State::ParamName,
            (State::ParamDone, Tok::Delim(b',')) => {
                builder.emit(&mut out);
                State::Value
            }

            (_, tok) => return Err(unexpected(tok)),
        };
    }

    match state {
        State::Value | State::ParamDone => builder.emit(&mut out),
        State::ParamName | State::ParamEq | State::ParamValue => {
            return Err(HeaderParseError::UnexpectedEnd)
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<HeaderDescriptor> {
        parse_value_list(input).unwrap()
    }

    #[test]
    fn test_single_value() {
        let list = parse("application/json");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].value, "application/json");
        assert!(list[0].params.is_empty());
    }

    #[test]
    fn test_value_with_params() {
        let list = parse("multipart/form-data; boundary=XyZ; charset=utf-8");
        assert_eq!(list[0].value, "multipart/form-data");
        assert_eq!(list[0].params.get("boundary"), Some(&"XyZ".to_string()));
        assert_eq!(list[0].params.get("charset"), Some(&"utf-8".to_string()));
    }

    #[test]
    fn test_param_names_lowercased() {
        let list = parse("text/plain; CHARSET=UTF-8");
        assert_eq!(list[0].params.get("charset"), Some(&"UTF-8".to_string()));
    }

    #[test]
    fn test_quoted_param_values_unescaped() {
        let list = parse(r#"form-data; name="file \"x\".txt""#);
        assert_eq!(
            list[0].params.get("name"),
            Some(&r#"file "x".txt"#.to_string())
        );
    }

    #[test]
    fn test_comma_separated_list() {
        let list = parse("text/html;q=0.9, application/json;q=0.8, */*;q=0.1");
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].value, "application/json");
        assert_eq!(list[2].params.get("q"), Some(&"0.1".to_string()));
    }

    #[test]
    fn test_empty_list_elements_skipped() {
        let list = parse("a, , b");
        let values: Vec<&str> = list.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_value_fragments_joined_by_space() {
        let list = parse("no-cache maxage");
        assert_eq!(list[0].value, "no-cache maxage");
    }

    #[test]
    fn test_equals_in_value_position() {
        let list = parse("a=b; c=d");
        assert_eq!(list[0].value, "a=b");
        assert_eq!(list[0].params.get("c"), Some(&"d".to_string()));

        let list = parse("bytes=0-99");
        assert_eq!(list[0].value, "bytes=0-99");
    }

    #[test]
    fn test_param_without_value_is_error() {
        assert!(parse_value_list("text/html; q").is_err());
        assert!(parse_value_list("text/html; q;").is_err());
    }

    #[test]
    fn test_leading_semicolon_is_error() {
        assert_eq!(
            parse_value_list("; q=1").unwrap_err(),
            HeaderParseError::UnexpectedToken(";".into())
        );
    }

    #[test]
    fn test_dangling_equals_is_error() {
        assert!(parse_value_list("a; b=").is_err());
    }
}
