//! File tools: `file_read`, `file_write`, `file_edit`, `file_delete`.
//!
//! All paths resolve against the tool's working directory; `..` traversal
//! out of it is refused before any filesystem access.

use std::fs;
use std::path::{Component, Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::json_schema_for;
use crate::tools::core::{parse_args, Tool, ToolFuture, ToolOutcome};

/// Resolve `path` against `workdir`, refusing traversal outside it.
///
/// Absolute paths are allowed as-is when they stay under the working
/// directory; everything else is an error.
pub(crate) fn resolve_path(workdir: &Path, path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    };

    // Lexical normalization; the target may not exist yet, so
    // canonicalize() is not an option.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(format!("path escapes working directory: {path}"));
                }
            }
            other => normalized.push(other),
        }
    }

    let base = workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf());
    if !normalized.starts_with(&base) && !normalized.starts_with(workdir) {
        return Err(format!("path escapes working directory: {path}"));
    }

    Ok(normalized)
}

// ── file_read ──────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct ReadArgs {
    /// Path to the file to read (relative to working directory)
    path: String,
    /// Optional: start line number (1-indexed)
    #[serde(default)]
    start_line: Option<usize>,
    /// Optional: end line number (inclusive)
    #[serde(default)]
    end_line: Option<usize>,
}

/// Read a file, returning numbered lines.
pub struct ReadTool {
    workdir: PathBuf,
}

impl ReadTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Optionally specify line range."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<ReadArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<ReadArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };

            let full_path = match resolve_path(&self.workdir, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::error(e),
            };

            let content = match fs::read_to_string(&full_path) {
                Ok(c) => c,
                Err(e) => return ToolOutcome::error(format!("failed to read file: {e}")),
            };

            let lines: Vec<&str> = content.split('\n').collect();
            let start = args.start_line.unwrap_or(1).max(1);
            let end = args.end_line.unwrap_or(lines.len()).min(lines.len());
            if start > end {
                return ToolOutcome::error("start_line must be <= end_line");
            }

            let mut numbered = String::new();
            for (offset, line) in lines[start - 1..end].iter().enumerate() {
                numbered.push_str(&format!("{:>4}  {line}\n", start + offset));
            }

            ToolOutcome::ok(numbered)
        })
    }
}

// ── file_write ─────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct WriteArgs {
    /// Path to the file to create
    path: String,
    /// Content to write to the file
    content: String,
}

/// Create a new file; refuses to overwrite.
pub struct WriteTool {
    workdir: PathBuf,
}

impl WriteTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Create a new file with the specified content. Fails if file already exists."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<WriteArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<WriteArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };

            let full_path = match resolve_path(&self.workdir, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::error(e),
            };

            if full_path.exists() {
                return ToolOutcome::error(format!("file already exists: {}", args.path));
            }

            if let Some(parent) = full_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    return ToolOutcome::error(format!("failed to create directory: {e}"));
                }
            }

            match fs::write(&full_path, &args.content) {
                Ok(()) => ToolOutcome::ok(format!(
                    "File created: {} ({} bytes)",
                    args.path,
                    args.content.len()
                )),
                Err(e) => ToolOutcome::error(format!("failed to write file: {e}")),
            }
        })
    }
}

// ── file_edit ──────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct EditArgs {
    /// Path to the file to edit
    path: String,
    /// Text to search for (must match exactly)
    search: String,
    /// Text to replace with
    replace: String,
}

/// Search-and-replace edit; the search text must be unique in the file.
pub struct EditTool {
    workdir: PathBuf,
}

impl EditTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for EditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Edit an existing file by searching for text and replacing it. The search text must \
         match exactly."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<EditArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<EditArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };

            let full_path = match resolve_path(&self.workdir, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::error(e),
            };

            let original = match fs::read_to_string(&full_path) {
                Ok(c) => c,
                Err(e) => return ToolOutcome::error(format!("failed to read file: {e}")),
            };

            let occurrences = original.matches(&args.search).count();
            if occurrences == 0 {
                return ToolOutcome::error("search text not found in file");
            }
            if occurrences > 1 {
                return ToolOutcome::error(format!(
                    "search text appears {occurrences} times in file; must be unique"
                ));
            }

            let updated = original.replacen(&args.search, &args.replace, 1);
            match fs::write(&full_path, &updated) {
                Ok(()) => ToolOutcome::ok(format!(
                    "File edited: {} (replaced {} characters with {})",
                    args.path,
                    args.search.len(),
                    args.replace.len()
                )),
                Err(e) => ToolOutcome::error(format!("failed to write file: {e}")),
            }
        })
    }
}

// ── file_delete ────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct DeleteArgs {
    /// Path to the file to delete
    path: String,
}

/// Delete a single file (never a directory).
pub struct DeleteTool {
    workdir: PathBuf,
}

impl DeleteTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for DeleteTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a file. Use with caution as this cannot be undone."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<DeleteArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<DeleteArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };

            let full_path = match resolve_path(&self.workdir, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::error(e),
            };

            let metadata = match fs::metadata(&full_path) {
                Ok(m) => m,
                Err(e) => return ToolOutcome::error(format!("file not found: {e}")),
            };
            if metadata.is_dir() {
                return ToolOutcome::error("cannot delete directory, file expected");
            }

            match fs::remove_file(&full_path) {
                Ok(()) => ToolOutcome::ok(format!("File deleted: {}", args.path)),
                Err(e) => ToolOutcome::error(format!("failed to delete file: {e}")),
            }
        })
    }
}
