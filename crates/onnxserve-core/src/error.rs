/// Everything that can fail while serving one request.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("sample should be a dict containing {}", describe_keys(.expected))]
    MissingField { expected: Vec<String> },

    #[error("unsupported tensor type: {0}")]
    UnsupportedDType(String),

    #[error("cannot reshape {numel} element(s) into shape {shape:?}")]
    ShapeMismatch { numel: usize, shape: Vec<usize> },

    #[error("invalid value for input `{input}`: {reason}")]
    InvalidValue { input: String, reason: String },

    #[error("request handler failed: {0:#}")]
    UserHook(anyhow::Error),

    #[error("model execution failed: {0:#}")]
    EngineExecution(anyhow::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl ServeError {
    pub fn missing_field(expected: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::MissingField {
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    pub fn invalid_value(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

fn describe_keys(keys: &[String]) -> String {
    match keys {
        [single] => format!("key: {single}"),
        many => format!("keys: {}", many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_every_key() {
        let single = ServeError::missing_field(["x"]);
        assert_eq!(single.to_string(), "sample should be a dict containing key: x");

        let many = ServeError::missing_field(["a", "b"]);
        assert_eq!(many.to_string(), "sample should be a dict containing keys: a, b");
    }
}
