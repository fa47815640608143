//! Extraction of location ids from the discovery endpoint's payload.
//!
//! The endpoint returns sample code for downloading the requested area, as
//! JSON of the form `{"outputs": {"script": "..."}}`. Somewhere in that script
//! is a line `POINTS = [ 123, 456, ... ]` listing the archive's location ids.

use crate::archive::error::ArchiveError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static POINTS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)POINTS\s*=\s*\[(.*?)\]").expect("valid regex"));
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Pulls the location id list out of a decoded discovery response.
pub fn location_ids_from_response(response: &Value) -> Result<Vec<u64>, ArchiveError> {
    let script = response
        .get("outputs")
        .and_then(|outputs| outputs.get("script"))
        .and_then(Value::as_str)
        .ok_or_else(|| ArchiveError::DiscoveryFormat {
            reason: "response has no 'outputs.script' field".to_string(),
        })?;
    location_ids_from_script(script)
}

/// Parses the bracketed `POINTS = [...]` list out of a discovery script.
pub fn location_ids_from_script(script: &str) -> Result<Vec<u64>, ArchiveError> {
    let block = POINTS_BLOCK
        .captures(script)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| ArchiveError::DiscoveryFormat {
            reason: "POINTS block not found in the script".to_string(),
        })?;

    let ids = INTEGER
        .find_iter(block.as_str())
        .map(|m| {
            m.as_str()
                .parse::<u64>()
                .map_err(|e| ArchiveError::DiscoveryFormat {
                    reason: format!("location id '{}' is not a number: {e}", m.as_str()),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(ArchiveError::DiscoveryFormat {
            reason: "POINTS block lists no locations".to_string(),
        });
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCRIPT: &str = r#"
import requests
API_KEY = "..."
POINTS = [
'1127013',
'1127014'
]
def main():
    pass
"#;

    #[test]
    fn test_extracts_ids_in_order() {
        assert_eq!(
            location_ids_from_script(SCRIPT).unwrap(),
            vec![1_127_013, 1_127_014]
        );
        assert_eq!(
            location_ids_from_script("POINTS = [42]").unwrap(),
            vec![42]
        );
    }

    #[test]
    fn test_missing_points_block() {
        let err = location_ids_from_script("print('hello')").unwrap_err();
        assert!(err.is_discovery_format());
        assert!(err.to_string().contains("POINTS block not found"));
    }

    #[test]
    fn test_empty_points_block() {
        let err = location_ids_from_script("POINTS = []").unwrap_err();
        assert!(err.is_discovery_format());
    }

    #[test]
    fn test_response_without_outputs() {
        let response = json!({"errors": ["API key is invalid"]});
        let err = location_ids_from_response(&response).unwrap_err();
        assert!(err.is_discovery_format());
        assert!(err.to_string().contains("outputs.script"));

        let response = json!({"outputs": {"script": SCRIPT}});
        assert_eq!(location_ids_from_response(&response).unwrap().len(), 2);
    }
}
