use cmx_db::StoreError;

/// Errors surfaced by desk operations.
///
/// None of these are transient. Callers report them verbatim and never retry.
#[derive(Debug)]
pub enum DeskError {
    NotFound(String),
    /// Authorization failure or lifecycle-invariant violation. Callers see
    /// the same kind for both.
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    Store(StoreError),
}

impl DeskError {
    /// Stable machine-readable kind for API bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DeskError::NotFound(_) => "not_found",
            DeskError::Forbidden(_) => "forbidden",
            DeskError::Conflict(_) => "conflict",
            DeskError::BadRequest(_) => "bad_request",
            DeskError::Store(_) => "internal",
        }
    }

    pub(crate) fn not_found(entity: &str) -> Self {
        DeskError::NotFound(format!("{entity} not found"))
    }
}

impl std::fmt::Display for DeskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeskError::NotFound(m)
            | DeskError::Forbidden(m)
            | DeskError::Conflict(m)
            | DeskError::BadRequest(m) => f.write_str(m),
            DeskError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DeskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeskError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DeskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { constraint } => {
                DeskError::Conflict(format!("unique constraint violated: {constraint}"))
            }
            other => DeskError::Store(other),
        }
    }
}
