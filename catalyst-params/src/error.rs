use catalyst_core::TransformError;

/// Error type for query-parameter encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("container visited twice at {path}")]
    Cycle { path: String },
    #[error("cannot encode {kind} at {path}")]
    Unsupported { path: String, kind: &'static str },
    #[error("root value must be an object or an array")]
    RootNotContainer,
    #[error("round trip mismatch: encoded {expected}, decoded {actual}")]
    RoundTrip { expected: String, actual: String },
}

pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(".")
    }
}
