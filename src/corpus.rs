use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One documentation file from the corpus tree.
///
/// `doc_path` is relative to the corpus root and always uses forward
/// slashes, which makes it a stable store key across platforms.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub doc_path: String,
    pub content: String,
    pub service: String,
    pub category: String,
}

/// Walk a documentation tree and load every Markdown file.
///
/// The layout contract is `<root>/<...>/<service>/<CATEGORY>.md`: the
/// penultimate path component names the service and the file stem names
/// the error category. Files that cannot be read are skipped with a
/// warning rather than failing the whole walk.
pub fn load_corpus(root: &Path) -> Result<Vec<CorpusDocument>> {
    if !root.is_dir() {
        anyhow::bail!("corpus root {} is not a directory", root.display());
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            paths.push(path.to_path_buf());
        }
    }
    // The walker's order depends on the filesystem; sort for stable
    // document indices.
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable corpus file");
                continue;
            }
        };

        let doc_path = relative_doc_path(root, &path)
            .with_context(|| format!("corpus file {} outside root", path.display()))?;
        let (service, category) = extract_service_and_category(&doc_path);
        documents.push(CorpusDocument {
            doc_path,
            content,
            service,
            category,
        });
    }

    debug!(count = documents.len(), root = %root.display(), "loaded corpus");
    Ok(documents)
}

/// Root-relative path with platform separators normalized to `/`.
fn relative_doc_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root)?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Service and category from a relative document path.
///
/// `services/logitrack/NEGATIVE_VALUE.md` yields
/// `("logitrack", "NEGATIVE_VALUE")`. Files directly under the root get
/// an empty service name.
pub fn extract_service_and_category(doc_path: &str) -> (String, String) {
    let parts: Vec<&str> = doc_path.split('/').collect();

    let category = parts
        .last()
        .map(|name| name.strip_suffix(".md").unwrap_or(name))
        .unwrap_or("")
        .to_string();
    let service = if parts.len() >= 2 {
        parts[parts.len() - 2].to_string()
    } else {
        String::new()
    };

    (service, category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_doc(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_corpus_finds_markdown_only() {
        let dir = TempDir::new().unwrap();
        write_doc(dir.path(), "services/logitrack/NEGATIVE_VALUE.md", "negative");
        write_doc(dir.path(), "services/skyguard/SCHEMA_VALIDATION.md", "schema");
        write_doc(dir.path(), "services/skyguard/notes.txt", "ignored");

        let documents = load_corpus(dir.path()).unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents
            .iter()
            .all(|d| d.doc_path.ends_with(".md") && !d.doc_path.contains('\\')));
    }

    #[test]
    fn test_documents_sorted_by_path() {
        let dir = TempDir::new().unwrap();
        write_doc(dir.path(), "services/zeta/B.md", "b");
        write_doc(dir.path(), "services/alpha/A.md", "a");

        let documents = load_corpus(dir.path()).unwrap();
        assert_eq!(documents[0].doc_path, "services/alpha/A.md");
        assert_eq!(documents[1].doc_path, "services/zeta/B.md");
    }

    #[test]
    fn test_service_and_category_extraction() {
        assert_eq!(
            extract_service_and_category("services/logitrack/NEGATIVE_VALUE.md"),
            ("logitrack".to_string(), "NEGATIVE_VALUE".to_string())
        );
        assert_eq!(
            extract_service_and_category("README.md"),
            (String::new(), "README".to_string())
        );
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_corpus(&dir.path().join("nope")).is_err());
    }
}
