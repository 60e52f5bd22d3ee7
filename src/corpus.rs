//! Journal corpus scanner.
//!
//! The corpus is a flat directory: every regular file directly inside it is a
//! journal entry unless its name matches one of `corpus.exclude_globs`.
//! Subdirectories are ignored. Files are returned in lexicographic file-name
//! order and read as-is, with no markup stripping.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{MemoryError, Result};
use crate::models::JournalDocument;

/// Load every journal entry under `config.dir`.
///
/// # Errors
///
/// [`MemoryError::Ingestion`] if the directory is missing, cannot be listed,
/// or contains no journal files. Individual files that are not valid UTF-8
/// are skipped with a warning.
pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<JournalDocument>> {
    let root = &config.dir;
    if !root.is_dir() {
        return Err(MemoryError::Ingestion(format!(
            "corpus directory does not exist: {}",
            root.display()
        )));
    }

    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            MemoryError::Ingestion(format!("failed to list {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if exclude_set.is_match(&name) {
            continue;
        }

        match read_document(entry.path(), &name) {
            Ok(doc) => docs.push(doc),
            Err(e) => eprintln!("Warning: skipping {}: {}", entry.path().display(), e),
        }
    }

    if docs.is_empty() {
        return Err(MemoryError::Ingestion(format!(
            "no journal files found in {}",
            root.display()
        )));
    }

    // walkdir sorts by OsStr; re-sort on the UTF-8 name so the order is exactly
    // lexicographic on what we report as the source.
    docs.sort_by(|a, b| a.source.cmp(&b.source));

    Ok(docs)
}

fn read_document(path: &Path, name: &str) -> std::io::Result<JournalDocument> {
    let metadata = std::fs::metadata(path)?;
    let modified_at: DateTime<Utc> = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .into();

    let body = std::fs::read_to_string(path)?;

    Ok(JournalDocument {
        source: name.to_string(),
        modified_at,
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            MemoryError::Ingestion(format!("invalid exclude glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| MemoryError::Ingestion(format!("invalid exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus_config(dir: &Path) -> CorpusConfig {
        CorpusConfig {
            dir: dir.to_path_buf(),
            exclude_globs: vec!["*.py".to_string(), "*.json".to_string(), "*.db".to_string()],
        }
    }

    #[test]
    fn scans_in_lexicographic_order_and_skips_reserved_extensions() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("2024-02-01.md"), "second").unwrap();
        fs::write(tmp.path().join("2024-01-01.txt"), "first").unwrap();
        fs::write(tmp.path().join("notes"), "no extension is still a journal").unwrap();
        fs::write(tmp.path().join("user_profile.json"), "{}").unwrap();
        fs::write(tmp.path().join("script.py"), "print()").unwrap();
        fs::write(tmp.path().join("chroma.db"), "binary").unwrap();
        fs::create_dir(tmp.path().join("archive")).unwrap();
        fs::write(tmp.path().join("archive").join("old.md"), "nested").unwrap();

        let docs = scan_corpus(&corpus_config(tmp.path())).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(names, vec!["2024-01-01.txt", "2024-02-01.md", "notes"]);
        assert_eq!(docs[0].body, "first");
    }

    #[test]
    fn body_is_read_verbatim() {
        let tmp = TempDir::new().unwrap();
        let body = "# Heading\n\n*emphasis* stays   as-is\r\n";
        fs::write(tmp.path().join("entry.md"), body).unwrap();
        let docs = scan_corpus(&corpus_config(tmp.path())).unwrap();
        assert_eq!(docs[0].body, body);
    }

    #[test]
    fn empty_directory_is_ingestion_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan_corpus(&corpus_config(tmp.path())).unwrap_err();
        assert!(matches!(err, MemoryError::Ingestion(_)));
    }

    #[test]
    fn missing_directory_is_ingestion_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan_corpus(&corpus_config(&tmp.path().join("nope"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn only_excluded_files_is_ingestion_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("profile.json"), "{}").unwrap();
        assert!(scan_corpus(&corpus_config(tmp.path())).is_err());
    }

    #[test]
    fn non_utf8_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.bin"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(tmp.path().join("b.txt"), "ok").unwrap();
        let docs = scan_corpus(&corpus_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "b.txt");
    }
}
