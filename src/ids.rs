use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Correlation id for one handled request, backed by a ULID.
///
/// Clients may carry their own id in `X-Request-Id`; the request parser
/// adopts it when it is a well-formed ULID and mints a fresh one
/// otherwise, so every log event of a request shares one id that the
/// caller can also know.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Adopt the id from an inbound header value, or mint a fresh one when
    /// the header is absent or not a ULID.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}
