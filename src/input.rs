use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Possible errors to occur while reading an inventory document
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to open `{path}`")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{path}` is not a valid {document} document")]
    Parse {
        path: PathBuf,
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON document, like the output of an AWS describe call, from a file
///
/// `document` names the expected content in error messages.
pub fn read_json<T: DeserializeOwned>(path: &Path, document: &'static str) -> Result<T, InputError> {
    let file = File::open(path).map_err(|source| InputError::Open {
        path: path.to_owned(),
        source,
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| InputError::Parse {
        path: path.to_owned(),
        document,
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use super::*;

    #[test]
    fn read_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, r#"{"a": 1}"#).unwrap();

        let doc: HashMap<String, u32> = read_json(&path, "test").unwrap();
        assert_eq!(doc["a"], 1);
    }

    #[test]
    fn invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "not json").unwrap();

        let error = read_json::<HashMap<String, u32>>(&path, "test").unwrap_err();
        assert!(matches!(error, InputError::Parse { document: "test", .. }));
        assert!(error.to_string().ends_with("is not a valid test document"));
    }

    #[test]
    fn missing_document() {
        let result = read_json::<HashMap<String, u32>>(Path::new("does-not-exist.json"), "test");
        assert!(matches!(result, Err(InputError::Open { .. })));
    }
}
