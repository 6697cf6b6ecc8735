//! Repository acquisition: identity extraction, cloning, and file walking.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::chunker::{self, FileChunks};
use crate::error::{IndexError, Result};

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com[:/]([^/\s]+/[^/\s]+)").expect("repository id pattern is valid")
    })
}

/// A cloned (or to-be-cloned) source repository.
#[derive(Debug, Clone)]
pub struct Repository {
    id: String,
    url: String,
    root: PathBuf,
}

impl Repository {
    /// # Errors
    ///
    /// Returns an error if no `owner/name` identity can be extracted from
    /// the URL.
    pub fn new(url: &str, checkout_dir: impl Into<PathBuf>) -> Result<Self> {
        let id = Self::extract_id(url)
            .ok_or_else(|| IndexError::Repo(format!("cannot extract repository id from {url}")))?;
        Ok(Self {
            id,
            url: url.to_owned(),
            root: checkout_dir.into(),
        })
    }

    /// Wrap an already-checked-out directory without a remote URL.
    #[must_use]
    pub fn local(id: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_owned(),
            url: String::new(),
            root: root.into(),
        }
    }

    /// `owner/name` from a repository URL, tolerating a trailing `.git`.
    #[must_use]
    pub fn extract_id(url: &str) -> Option<String> {
        let captures = id_pattern().captures(url)?;
        let id = captures.get(1)?.as_str();
        Some(id.trim_end_matches(".git").to_owned())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_cloned(&self) -> bool {
        self.root.exists()
    }

    /// Shallow-clone the repository unless the checkout already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `git clone` fails.
    pub async fn clone_if_missing(&self) -> Result<()> {
        if self.is_cloned() {
            tracing::debug!(root = %self.root.display(), "checkout already present");
            return Ok(());
        }
        tracing::info!(url = %self.url, "cloning repository");
        let status = tokio::process::Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(&self.url)
            .arg(&self.root)
            .status()
            .await?;
        if !status.success() {
            return Err(IndexError::Repo(format!(
                "git clone of {} exited with {status}",
                self.url
            )));
        }
        Ok(())
    }

    /// All Python files under the checkout, honoring gitignore rules,
    /// as paths relative to the repository root.
    #[must_use]
    pub fn python_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
            .map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .unwrap_or(e.path())
                    .to_path_buf()
            })
            .collect();
        files.sort();
        files
    }

    /// The repository's README contents, if a `README*` file exists in the
    /// root (case-insensitive).
    pub async fn readme(&self) -> Option<String> {
        let mut entries = tokio::fs::read_dir(&self.root).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let lower = name.to_string_lossy().to_lowercase();
            if lower.starts_with("readme") && entry.path().is_file() {
                return tokio::fs::read_to_string(entry.path()).await.ok();
            }
        }
        None
    }
}

/// Parse every Python file in the repository. Files that fail to read or
/// parse are skipped with a warning; the scan itself never fails.
#[must_use]
pub fn parse_repository(repo: &Repository) -> Vec<FileChunks> {
    let mut parsed = Vec::new();
    for rel_path in repo.python_files() {
        let abs = repo.root().join(&rel_path);
        let rel = rel_path.to_string_lossy();
        let source = match std::fs::read_to_string(&abs) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(file = %rel, "skipping unreadable file: {e}");
                continue;
            }
        };
        match chunker::parse_file(&source, &rel) {
            Ok(chunks) => parsed.push(chunks),
            Err(e) => {
                tracing::warn!(file = %rel, "skipping unparsable file: {e}");
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_id_from_https_url() {
        assert_eq!(
            Repository::extract_id("https://github.com/octo/webapp").as_deref(),
            Some("octo/webapp")
        );
    }

    #[test]
    fn extract_id_strips_dot_git() {
        assert_eq!(
            Repository::extract_id("https://github.com/octo/webapp.git").as_deref(),
            Some("octo/webapp")
        );
    }

    #[test]
    fn extract_id_rejects_non_github_urls() {
        assert!(Repository::extract_id("https://example.com/octo/webapp").is_none());
    }

    #[test]
    fn new_requires_extractable_id() {
        assert!(Repository::new("not a url", "/tmp/x").is_err());
        assert!(Repository::new("https://github.com/octo/webapp", "/tmp/x").is_ok());
    }

    #[test]
    fn python_files_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/b.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("a.py"), "y = 2\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let repo = Repository::local("t/fixture", dir.path());
        let files = repo.python_files();
        assert_eq!(files, vec![PathBuf::from("a.py"), PathBuf::from("pkg/b.py")]);
    }

    #[tokio::test]
    async fn readme_found_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ReadMe.md"), "# fixture\n").unwrap();
        let repo = Repository::local("t/fixture", dir.path());
        assert_eq!(repo.readme().await.as_deref(), Some("# fixture\n"));
    }

    #[tokio::test]
    async fn readme_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::local("t/fixture", dir.path());
        assert!(repo.readme().await.is_none());
    }

    #[test]
    fn parse_repository_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.py"), "def ok():\n    pass\n").unwrap();
        // Invalid UTF-8 makes the file unreadable as a string.
        std::fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00]).unwrap();

        let repo = Repository::local("t/fixture", dir.path());
        let parsed = parse_repository(&repo);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].path, "good.py");
    }
}
