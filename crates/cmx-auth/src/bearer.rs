/// Why an `Authorization` header did not yield a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    Missing,
    Malformed,
}

impl std::fmt::Display for BearerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BearerError::Missing => f.write_str("missing bearer token"),
            BearerError::Malformed => f.write_str("malformed authorization header"),
        }
    }
}

impl std::error::Error for BearerError {}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(header: Option<&str>) -> Result<&str, BearerError> {
    let value = header.map(str::trim).filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Err(BearerError::Missing);
    };

    let (scheme, token) = value.split_once(' ').ok_or(BearerError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::Malformed);
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(BearerError::Malformed);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_scheme_any_case() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(Some("bearer   xyz ")), Ok("xyz"));
    }

    #[test]
    fn missing_and_malformed() {
        assert_eq!(bearer_token(None), Err(BearerError::Missing));
        assert_eq!(bearer_token(Some("   ")), Err(BearerError::Missing));
        assert_eq!(bearer_token(Some("Basic dXNlcg==")), Err(BearerError::Malformed));
        assert_eq!(bearer_token(Some("Bearer")), Err(BearerError::Malformed));
        assert_eq!(bearer_token(Some("Bearer a b")), Err(BearerError::Malformed));
    }
}
