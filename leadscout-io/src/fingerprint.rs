//! Derives an [`InputFingerprint`] from a file on disk: a function of
//! the input's stable identifier (path + content hash).

use std::path::Path;

use leadscout_core::error::{Error, Result};
use leadscout_core::InputFingerprint;

/// Reads `path` and computes its fingerprint. Kept as a standalone
/// function rather than a method on the source types below, since the
/// CLI needs a fingerprint before it has decided which adapter to
/// construct — `begin_job` happens before the source is wired into the
/// runner.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<InputFingerprint> {
    let path = path.as_ref();
    let content = std::fs::read(path).map_err(|e| Error::invalid_input(format!("cannot read {}: {e}", path.display())))?;
    let path_str = path.to_string_lossy();
    Ok(InputFingerprint::compute(&path_str, &content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_changes_when_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        std::fs::write(&path, "director_name\nBongani Nkosi\n").unwrap();
        let first = fingerprint_file(&path).unwrap();

        std::fs::write(&path, "director_name\nBongani Nkosi\nAndreas van der Merwe\n").unwrap();
        let second = fingerprint_file(&path).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn fingerprint_is_stable_for_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        std::fs::write(&path, "director_name\nBongani Nkosi\n").unwrap();

        let first = fingerprint_file(&path).unwrap();
        let second = fingerprint_file(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_an_invalid_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        assert!(fingerprint_file(&path).is_err());
    }
}
