//! Side-file persistence for pending corrections.
//!
//! The side file lives next to the source document so a later `apply` can
//! find it without extra arguments. Writes go through a temp file in the same
//! directory and a rename, so readers never see a half-written array.
use crate::error::ProofreadError;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One proposed literal substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub old: String,
    pub new: String,
    pub reason: String,
}

/// Resolve `<directory of source>/<file_name>`, or `<default_dir>/<file_name>`
/// when the text did not come from a file.
pub fn side_file_path(source: Option<&Path>, default_dir: &Path, file_name: &str) -> PathBuf {
    let dir = match source.map(Path::parent) {
        Some(Some(parent)) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => default_dir,
    };
    dir.join(file_name)
}

/// Persist `json_array` verbatim, replacing any previous content.
pub fn write_corrections(path: &Path, json_array: &str) -> Result<()> {
    write_atomic(path, json_array.as_bytes())
}

/// Load the correction list. An empty array is a valid, empty result.
pub fn read_corrections(path: &Path) -> Result<Vec<Correction>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ProofreadError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", path.display()));
        }
    };
    serde_json::from_str(&text).map_err(|source| {
        ProofreadError::Parse {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Replace `path` with `bytes` via a sibling temp file and rename.
///
/// An existing target keeps its permissions, and a symlink keeps pointing at
/// the rewritten file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let (target, existing) = match fs::canonicalize(path) {
        Ok(resolved) => {
            let metadata = fs::metadata(&resolved)
                .with_context(|| format!("stat {}", resolved.display()))?;
            (resolved, Some(metadata.permissions()))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => (path.to_path_buf(), None),
        Err(err) => return Err(err).with_context(|| format!("resolve {}", path.display())),
    };
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    if let Some(permissions) = existing {
        tmp.as_file()
            .set_permissions(permissions)
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", path.display()))?;
    tmp.persist(&target)
        .map_err(|err| anyhow!("publish {}: {}", path.display(), err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_file_sits_next_to_source() {
        let default_dir = Path::new("/var/default");
        assert_eq!(
            side_file_path(
                Some(Path::new("/docs/novel/ch1.txt")),
                default_dir,
                "replacements.json"
            ),
            PathBuf::from("/docs/novel/replacements.json")
        );
        assert_eq!(
            side_file_path(Some(Path::new("ch1.txt")), default_dir, "fixes.json"),
            PathBuf::from("./fixes.json")
        );
        assert_eq!(
            side_file_path(None, default_dir, "replacements.json"),
            PathBuf::from("/var/default/replacements.json")
        );
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_corrections(&dir.path().join("replacements.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProofreadError>(),
            Some(ProofreadError::FileNotFound { .. })
        ));
    }

    #[test]
    fn empty_array_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        write_corrections(&path, "[]").unwrap();
        assert!(read_corrections(&path).unwrap().is_empty());
    }

    #[test]
    fn write_is_verbatim_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        fs::write(&path, "stale content that is longer than the new one").unwrap();

        let json = "[ {\"old\":\"teh\", \"new\":\"the\", \"reason\":\"typo\"} ]";
        write_corrections(&path, json).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), json);

        let corrections = read_corrections(&path).unwrap();
        assert_eq!(
            corrections,
            vec![Correction {
                old: "teh".to_string(),
                new: "the".to_string(),
                reason: "typo".to_string(),
            }]
        );
    }

    #[test]
    fn malformed_or_wrong_shape_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        for body in ["[{\"old\":", "{\"old\":\"a\"}", "[{\"old\":\"a\",\"new\":1,\"reason\":\"r\"}]"] {
            fs::write(&path, body).unwrap();
            let err = read_corrections(&path).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<ProofreadError>(),
                    Some(ProofreadError::Parse { .. })
                ),
                "expected parse error for {body}"
            );
        }
    }

    #[test]
    fn rewrite_keeps_mode_of_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("chapter.txt");
        fs::write(&doc, "quick brown fox").unwrap();
        fs::set_permissions(&doc, fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&doc, b"quick red fox").unwrap();
        assert_eq!(fs::read_to_string(&doc).unwrap(), "quick red fox");
        let mode = fs::metadata(&doc).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn rewrite_through_symlink_updates_link_target() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        let link = dir.path().join("link.txt");
        fs::write(&real, "teh cat").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_atomic(&link, b"the cat").unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "the cat");
    }
}
