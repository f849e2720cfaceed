//! Project file operations
//!
//! Access policy:
//! - READ: any absolute path the user names, capped by size.
//! - WRITE / LIST / SEARCH: restricted to the configured project path.
//!
//! Results are user-facing strings; policy violations and missing files
//! come back as crate errors so the orchestrator's boundary can turn them
//! into a model response.

use crate::config::FileOpsConfig;
use crate::error::{Error, Result};
use crate::router;
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_LIST_DEPTH: usize = 3;
const MAX_LIST_FILES: usize = 100;
const MAX_SEARCH_FILES: usize = 200;
const MAX_SEARCH_RESULTS: usize = 30;

/// Directories never listed or searched
const SKIP_DIRS: &[&str] = &["node_modules", "target", "__pycache__", "venv", ".venv", ".git"];

/// Extensions included in content search
const SEARCH_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "html", "css", "yaml", "yml", "json", "toml", "txt", "md", "java",
    "cpp", "c", "h", "go",
];

/// File reader/lister/searcher scoped to a project directory
pub struct FileOps {
    config: FileOpsConfig,
}

impl FileOps {
    /// Create from configuration
    pub fn new(config: FileOpsConfig) -> Self {
        FileOps { config }
    }

    /// The configured project directory, if any
    pub fn project_path(&self) -> Option<&Path> {
        self.config.project_path.as_deref()
    }

    /// Try to pull a filesystem path out of free text
    pub fn extract_path_from_text(text: &str) -> Option<String> {
        router::detect_raw_path(text)
    }

    /// Read a file's contents. Any absolute path is allowed; relative
    /// paths resolve against the project directory.
    pub fn read_file(&self, filepath: &str) -> Result<String> {
        let path = self.resolve_read_path(filepath);

        if !path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }
        if !path.is_file() {
            return Err(Error::InvalidInput(format!("Not a file: {}", path.display())));
        }

        let size = path.metadata()?.len();
        if size > self.config.max_read_bytes {
            return Err(Error::InvalidInput(format!(
                "File too large ({} bytes). Maximum is {} bytes.",
                size, self.config.max_read_bytes
            )));
        }

        info!("Reading file: {}", path.display());
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ExtractionFailed(format!("{}: {}", path.display(), e)))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{} ({} chars)\n\n{}", name, content.chars().count(), content))
    }

    /// Write a file. Restricted to the project directory.
    pub fn write_file(&self, filepath: &str, content: &str) -> Result<String> {
        let path = self.validate_project_path(filepath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(format!(
            "File written: {} ({} chars)",
            path.display(),
            content.chars().count()
        ))
    }

    /// List the project tree (bounded depth and file count)
    pub fn list_files(&self) -> Result<String> {
        let project = self.require_project_path()?;

        let mut lines = vec![format!(
            "{}/",
            project.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        )];
        let mut count = 0usize;
        walk_tree(project, 0, "  ", &mut lines, &mut count);

        Ok(lines.join("\n"))
    }

    /// Search project files for a substring, case-insensitively
    pub fn search_in_files(&self, query: &str) -> Result<String> {
        let project = self.require_project_path()?;
        let needle = query.to_lowercase();

        let mut results: Vec<String> = Vec::new();
        let mut files_seen = 0usize;
        let mut stack = vec![project.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();

                if path.is_dir() {
                    if !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_str()) {
                        stack.push(path);
                    }
                    continue;
                }

                let ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !SEARCH_EXTENSIONS.contains(&ext.as_str()) {
                    continue;
                }

                files_seen += 1;
                if files_seen > MAX_SEARCH_FILES {
                    break;
                }

                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for (line_no, line) in content.lines().enumerate() {
                    if line.to_lowercase().contains(&needle) {
                        let rel = path.strip_prefix(project).unwrap_or(&path);
                        let shown: String = line.trim().chars().take(120).collect();
                        results.push(format!(
                            "  {} line {}: {}",
                            rel.display(),
                            line_no + 1,
                            shown
                        ));
                        if results.len() >= MAX_SEARCH_RESULTS {
                            results.push("  ... (more results truncated)".to_string());
                            return Ok(format_search_header(query, &results));
                        }
                    }
                }
            }
        }

        if results.is_empty() {
            return Ok(format!("No results found for '{}' in the project.", query));
        }
        Ok(format_search_header(query, &results))
    }

    fn resolve_read_path(&self, filepath: &str) -> PathBuf {
        let path = PathBuf::from(filepath.trim());
        if path.is_absolute() {
            return path;
        }
        match &self.config.project_path {
            Some(project) => project.join(path),
            None => path,
        }
    }

    fn require_project_path(&self) -> Result<&Path> {
        self.config.project_path.as_deref().ok_or_else(|| {
            Error::Config("No project path configured. Set file_ops.project_path.".to_string())
        })
    }

    /// Resolve and confine a write target to the project directory
    fn validate_project_path(&self, filepath: &str) -> Result<PathBuf> {
        let project = self.require_project_path()?;
        let project = project
            .canonicalize()
            .map_err(|_| Error::Config(format!("Project path does not exist: {}", project.display())))?;

        let target = {
            let p = PathBuf::from(filepath);
            if p.is_absolute() {
                p
            } else {
                project.join(p)
            }
        };

        // Canonicalize the nearest existing ancestor so `..` components
        // cannot escape the project root before the file exists
        let check = target
            .parent()
            .filter(|p| p.exists())
            .map(|p| p.canonicalize())
            .transpose()?
            .unwrap_or_else(|| target.clone());

        if !check.starts_with(&project) {
            return Err(Error::InvalidInput(format!(
                "Write access denied: path is outside the project directory ({})",
                target.display()
            )));
        }

        Ok(target)
    }
}

fn walk_tree(dir: &Path, depth: usize, prefix: &str, lines: &mut Vec<String>, count: &mut usize) {
    if depth > MAX_LIST_DEPTH || *count > MAX_LIST_FILES {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| (e.path().is_file(), e.file_name().to_ascii_lowercase()));

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }

        *count += 1;
        if *count > MAX_LIST_FILES {
            lines.push(format!("{}... and more files", prefix));
            return;
        }

        let path = entry.path();
        if path.is_dir() {
            lines.push(format!("{}{}/", prefix, name));
            walk_tree(&path, depth + 1, &format!("{}  ", prefix), lines, count);
        } else {
            let size = path.metadata().map(|m| m.len()).unwrap_or(0);
            lines.push(format!("{}{} ({})", prefix, name, human_size(size)));
        }
    }
}

fn format_search_header(query: &str, results: &[String]) -> String {
    format!("Search results for '{}':\n\n{}", query, results.join("\n"))
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
