use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid assignment '{0}'. Expected KEY=VALUE.")]
    MissingEquals(String),

    #[error("Key cannot be empty in '{0}'.")]
    EmptyKey(String),

    #[error("Invalid key '{key}': segment {index} is empty.")]
    EmptySegment { key: String, index: usize },
}

/// Splits `KEY=VALUE` at the first `=`. Surrounding whitespace is trimmed
/// from the key only.
pub fn parse_assignment(text: &str) -> Result<(String, String), ParseError> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| ParseError::MissingEquals(text.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyKey(text.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Splits a dotted configuration key such as `dynamics.temperature`.
pub fn parse_key_path(key: &str) -> Result<Vec<&str>, ParseError> {
    let segments: Vec<&str> = key.split('.').collect();
    if let Some(index) = segments.iter().position(|s| s.is_empty()) {
        return Err(ParseError::EmptySegment {
            key: key.to_string(),
            index,
        });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_at_first_equals() {
        assert_eq!(
            parse_assignment("platform.properties.Precision=mixed").unwrap(),
            ("platform.properties.Precision".to_string(), "mixed".to_string())
        );
        assert_eq!(
            parse_assignment(" a = b=c").unwrap(),
            ("a".to_string(), " b=c".to_string())
        );
    }

    #[test]
    fn assignment_without_equals_or_key_is_rejected() {
        assert_eq!(
            parse_assignment("temperature"),
            Err(ParseError::MissingEquals("temperature".to_string()))
        );
        assert_eq!(
            parse_assignment("=300"),
            Err(ParseError::EmptyKey("=300".to_string()))
        );
    }

    #[test]
    fn key_paths_reject_empty_segments() {
        let path = parse_key_path("run.blocks").unwrap();
        assert_eq!(path, vec!["run", "blocks"]);
        assert_eq!(
            parse_key_path("run..blocks"),
            Err(ParseError::EmptySegment {
                key: "run..blocks".to_string(),
                index: 1
            })
        );
    }
}
