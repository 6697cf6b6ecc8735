//! Directory-level metadata assembled from per-file imports and
//! definitions, rendered as the analyzer's repository overview.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use crate::chunker::{ChunkKind, FileChunks};

/// Aggregated metadata for one directory of the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirMetadata {
    pub path: String,
    pub files: Vec<String>,
    pub imports: Vec<String>,
    /// (function name, file name) pairs for top-level functions.
    pub functions: Vec<(String, String)>,
    /// (class name, file name) pairs, nested classes included.
    pub classes: Vec<(String, String)>,
}

/// Group parsed files by their parent directory.
#[must_use]
pub fn directory_metadata(files: &[FileChunks]) -> Vec<DirMetadata> {
    let mut dirs: BTreeMap<String, DirMetadata> = BTreeMap::new();

    for file in files {
        let path = Path::new(&file.path);
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.path.clone());

        let entry = dirs.entry(dir.clone()).or_insert_with(|| DirMetadata {
            path: if dir.is_empty() { ".".to_owned() } else { dir },
            files: Vec::new(),
            imports: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
        });

        entry.files.push(file_name.clone());
        for import in &file.imports {
            if !entry.imports.contains(&import.module) {
                entry.imports.push(import.module.clone());
            }
        }
        for (idx, node) in file.nodes().iter().enumerate() {
            match node.kind {
                ChunkKind::Function if node.parent.is_none() => {
                    entry.functions.push((node.name.clone(), file_name.clone()));
                }
                ChunkKind::Class => {
                    entry
                        .classes
                        .push((file.qualified_name(idx), file_name.clone()));
                }
                ChunkKind::Function => {}
            }
        }
    }

    dirs.into_values().collect()
}

/// Render directory metadata as a plain-text repository overview.
#[must_use]
pub fn render_overview(repo_id: &str, dirs: &[DirMetadata]) -> String {
    let mut out = format!("Repository: {repo_id}\nDirectories:\n");
    for dir in dirs {
        let join_named = |items: &[(String, String)]| {
            items
                .iter()
                .map(|(name, file)| format!("{name} in file '{file}'"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "Path: {}", dir.path);
        let _ = writeln!(out, "- files: {}", dir.files.join(", "));
        let _ = writeln!(out, "- imports: {}", dir.imports.join(", "));
        let _ = writeln!(out, "- functions: {}", join_named(&dir.functions));
        let _ = writeln!(out, "- classes: {}", join_named(&dir.classes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::parse_file;

    fn fixture() -> Vec<FileChunks> {
        vec![
            parse_file("import os\n\ndef main():\n    pass\n", "app.py").unwrap(),
            parse_file(
                "import os\nimport json\n\nclass Handler:\n    def run(self):\n        pass\n",
                "web/server.py",
            )
            .unwrap(),
        ]
    }

    #[test]
    fn groups_files_by_directory() {
        let dirs = directory_metadata(&fixture());
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].path, ".");
        assert_eq!(dirs[0].files, vec!["app.py"]);
        assert_eq!(dirs[1].path, "web");
        assert_eq!(dirs[1].files, vec!["server.py"]);
    }

    #[test]
    fn imports_deduplicated_per_directory() {
        let files = vec![
            parse_file("import os\n", "pkg/a.py").unwrap(),
            parse_file("import os\n", "pkg/b.py").unwrap(),
        ];
        let dirs = directory_metadata(&files);
        assert_eq!(dirs[0].imports, vec!["os"]);
    }

    #[test]
    fn functions_and_classes_attributed_to_files() {
        let dirs = directory_metadata(&fixture());
        assert_eq!(dirs[0].functions, vec![("main".into(), "app.py".into())]);
        assert_eq!(
            dirs[1].classes,
            vec![("Handler".into(), "server.py".into())]
        );
    }

    #[test]
    fn methods_not_listed_as_functions() {
        let dirs = directory_metadata(&fixture());
        assert!(dirs[1].functions.is_empty());
    }

    #[test]
    fn overview_renders_every_directory() {
        let dirs = directory_metadata(&fixture());
        let overview = render_overview("octo/webapp", &dirs);
        assert!(overview.contains("Repository: octo/webapp"));
        assert!(overview.contains("Path: web"));
        assert!(overview.contains("Handler in file 'server.py'"));
    }
}
