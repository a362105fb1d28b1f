use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Parsing helpers for values the runner hands over as strings.
pub struct StringUtil;

impl StringUtil {
    /// Parse `json` into `T`, naming the target type on failure.
    pub fn convert_from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
        serde_json::from_str(json)
            .with_context(|| format!("Invalid JSON for {}", std::any::type_name::<T>()))
    }

    /// Interpret a runner-style boolean (`1`/`true`/`$true`,
    /// `0`/`false`/`$false`), ignoring case and surrounding whitespace.
    /// Anything else is `None`.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        let value = value.trim();
        if ["1", "true", "$true"].iter().any(|t| value.eq_ignore_ascii_case(t)) {
            Some(true)
        } else if ["0", "false", "$false"].iter().any(|f| value.eq_ignore_ascii_case(f)) {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Endpoint {
        name: String,
        url: String,
    }

    #[test]
    fn json_parses_and_names_type_on_error() {
        let parsed: Endpoint =
            StringUtil::convert_from_json(r#"{"name":"SystemVssConnection","url":"https://x"}"#)
                .unwrap();
        assert_eq!(parsed.name, "SystemVssConnection");

        let err = StringUtil::convert_from_json::<Endpoint>("{").unwrap_err();
        assert!(err.to_string().contains("Endpoint"));
    }

    #[test]
    fn step_debug_spellings() {
        for raw in ["1", "true", "TRUE", "$True", " true "] {
            assert_eq!(StringUtil::convert_to_bool(raw), Some(true), "{raw:?}");
        }
        for raw in ["0", "False", "$false"] {
            assert_eq!(StringUtil::convert_to_bool(raw), Some(false), "{raw:?}");
        }
        for raw in ["", "  ", "yes", "on", "2"] {
            assert_eq!(StringUtil::convert_to_bool(raw), None, "{raw:?}");
        }
    }
}
