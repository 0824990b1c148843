//! Search tools: `list_files`, `search_files`, `search_content`.

use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::json_schema_for;
use crate::tools::core::{parse_args, Tool, ToolFuture, ToolOutcome};
use crate::tools::fs::resolve_path;

/// Default cap on content-search matches.
const DEFAULT_MAX_MATCHES: usize = 100;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

// ── list_files ─────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct ListArgs {
    /// Directory to list (defaults to the working directory)
    #[serde(default)]
    path: Option<String>,
}

/// List a directory, one entry per line, directories suffixed `/`.
pub struct ListFilesTool {
    workdir: PathBuf,
}

impl ListFilesTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and directories at a path."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<ListArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<ListArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };

            let dir = match args.path.as_deref() {
                Some(p) => match resolve_path(&self.workdir, p) {
                    Ok(p) => p,
                    Err(e) => return ToolOutcome::error(e),
                },
                None => self.workdir.clone(),
            };

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => return ToolOutcome::error(format!("failed to list directory: {e}")),
            };

            let mut names: Vec<String> = Vec::new();
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                names.push(if is_dir { format!("{name}/") } else { name });
            }
            names.sort();

            ToolOutcome::ok(names.join("\n"))
        })
    }
}

// ── search_files ───────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct FindArgs {
    /// File pattern to match (e.g. '*.rs', '**/*.toml', 'src/*.rs')
    pattern: String,
    /// Root directory to search from (defaults to the working directory)
    #[serde(default)]
    root_path: Option<String>,
    /// Include hidden files and directories (default: false)
    #[serde(default)]
    include_hidden: bool,
}

/// Find files matching a glob-style pattern (`*` and `**`).
pub struct FileSearchTool {
    workdir: PathBuf,
}

impl FileSearchTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn walk(&self, dir: &Path, root: &Path, include_hidden: bool, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !include_hidden && name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if !SKIPPED_DIRS.contains(&name.as_str()) {
                    self.walk(&path, root, include_hidden, out);
                }
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().to_string());
            }
        }
    }
}

impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search for files matching a pattern."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<FindArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<FindArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };
            if args.pattern.is_empty() {
                return ToolOutcome::error("pattern is required");
            }

            let root = match args.root_path.as_deref() {
                Some(p) => match resolve_path(&self.workdir, p) {
                    Ok(p) => p,
                    Err(e) => return ToolOutcome::error(e),
                },
                None => self.workdir.clone(),
            };
            if !root.exists() {
                return ToolOutcome::error(format!(
                    "root path does not exist: {}",
                    root.display()
                ));
            }

            let mut files = Vec::new();
            self.walk(&root, &root, args.include_hidden, &mut files);

            let mut matches: Vec<String> = files
                .into_iter()
                .filter(|f| glob_matches(&args.pattern, f))
                .collect();
            matches.sort();

            if matches.is_empty() {
                return ToolOutcome::ok("No files found matching pattern");
            }

            let mut out = format!("Found {} file(s):\n\n", matches.len());
            for m in &matches {
                out.push_str(&format!("  {m}\n"));
            }
            ToolOutcome::ok(out)
        })
    }
}

// ── search_content ─────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct GrepArgs {
    /// Text pattern to search for
    pattern: String,
    /// Root directory to search from (defaults to the working directory)
    #[serde(default)]
    root_path: Option<String>,
    /// Whether search is case-sensitive (default: false)
    #[serde(default)]
    case_sensitive: bool,
    /// Maximum number of matches to return (default: 100)
    #[serde(default)]
    max_results: Option<usize>,
}

/// Search file contents for a substring pattern, `path:line: text`
/// output.
pub struct GrepTool {
    workdir: PathBuf,
}

impl GrepTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for GrepTool {
    fn name(&self) -> &str {
        "search_content"
    }

    fn description(&self) -> &str {
        "Search for text content within files."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<GrepArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<GrepArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };
            if args.pattern.is_empty() {
                return ToolOutcome::error("pattern is required");
            }

            let root = match args.root_path.as_deref() {
                Some(p) => match resolve_path(&self.workdir, p) {
                    Ok(p) => p,
                    Err(e) => return ToolOutcome::error(e),
                },
                None => self.workdir.clone(),
            };

            let needle = if args.case_sensitive {
                args.pattern.clone()
            } else {
                args.pattern.to_lowercase()
            };
            let max_results = args.max_results.unwrap_or(DEFAULT_MAX_MATCHES);

            let mut matches = Vec::new();
            grep_dir(
                &root,
                &root,
                &needle,
                args.case_sensitive,
                max_results,
                &mut matches,
            );

            if matches.is_empty() {
                return ToolOutcome::ok("No matches found");
            }

            let mut out = format!("Found {} match(es):\n\n", matches.len());
            for m in &matches {
                out.push_str(m);
                out.push('\n');
            }
            ToolOutcome::ok(out)
        })
    }
}

fn grep_dir(
    dir: &Path,
    root: &Path,
    needle: &str,
    case_sensitive: bool,
    max_results: usize,
    out: &mut Vec<String>,
) {
    if out.len() >= max_results {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if out.len() >= max_results {
            return;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }

        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            grep_dir(&path, root, needle, case_sensitive, max_results, out);
            continue;
        }

        // Binary files fail UTF-8 decoding and are skipped.
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };

        let rel = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string_lossy().to_string());

        for (line_no, line) in content.lines().enumerate() {
            let haystack = if case_sensitive {
                line.to_string()
            } else {
                line.to_lowercase()
            };
            if haystack.contains(needle) {
                out.push(format!("{rel}:{}: {}", line_no + 1, line.trim_end()));
                if out.len() >= max_results {
                    return;
                }
            }
        }
    }
}

/// Glob matching supporting `**` (any path segments), `*` (anything but
/// `/`), `?`, and literals.
pub(crate) fn glob_matches(pattern: &str, path: &str) -> bool {
    glob_inner(pattern.as_bytes(), path.as_bytes())
}

fn glob_inner(pattern: &[u8], path: &[u8]) -> bool {
    let mut pi = 0;
    let mut si = 0;

    let mut star_pi = usize::MAX;
    let mut star_si = 0;

    let mut dstar_pi = usize::MAX;
    let mut dstar_si = 0;

    while si < path.len() {
        if pi < pattern.len() && pattern[pi] == b'*' {
            if pi + 1 < pattern.len() && pattern[pi + 1] == b'*' {
                dstar_pi = pi;
                dstar_si = si;
                pi += 2;
                if pi < pattern.len() && pattern[pi] == b'/' {
                    pi += 1;
                }
                continue;
            }
            star_pi = pi;
            star_si = si;
            pi += 1;
            continue;
        }

        if pi < pattern.len() && (pattern[pi] == path[si] || pattern[pi] == b'?') {
            pi += 1;
            si += 1;
            continue;
        }

        if star_pi != usize::MAX && path[star_si] != b'/' {
            star_si += 1;
            si = star_si;
            pi = star_pi + 1;
            continue;
        }

        if dstar_pi != usize::MAX {
            dstar_si += 1;
            si = dstar_si;
            pi = dstar_pi + 2;
            if pi < pattern.len() && pattern[pi] == b'/' {
                pi += 1;
            }
            star_pi = usize::MAX;
            continue;
        }

        return false;
    }

    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    if pi < pattern.len() && pattern[pi] == b'/' {
        pi += 1;
    }

    pi == pattern.len()
}
