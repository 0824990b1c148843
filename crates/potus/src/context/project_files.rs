//! Project-context discovery: locate and load project documents
//! (`POTUS.md` and friends) walking upward from the working directory.
//!
//! The closest file wins per base name — a `POTUS.md` next to the code
//! overrides one in a parent directory, and user-level config directories
//! are consulted last.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::estimator::TokenEstimator;

/// File names recognized as project context, probed in order within each
/// search directory.
pub const DEFAULT_CONTEXT_FILE_NAMES: &[&str] = &[
    "POTUS.md",
    "CLAUDE.md",
    "AGENTS.md",
    "CONTEXT.md",
    ".potus/context.md",
    ".claude/context.md",
];

/// Configuration for [`ProjectFiles`].
#[derive(Debug, Clone, Default)]
pub struct ProjectFilesConfig {
    /// Recognized file names; empty selects the defaults.
    pub context_file_names: Vec<String>,
    /// Cumulative token cap across all loaded files; 0 disables the cap.
    pub max_tokens: usize,
}

/// One loaded context document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextFile {
    pub path: PathBuf,
    pub name: String,
    pub content: String,
    pub tokens: usize,
}

/// The set of project-context documents loaded for a session.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub files: Vec<ContextFile>,
    pub total_tokens: usize,
}

/// Locates and loads project-context documents.
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    context_file_names: Vec<String>,
    max_tokens: usize,
}

impl ProjectFiles {
    pub fn new(cfg: ProjectFilesConfig) -> Self {
        let context_file_names = if cfg.context_file_names.is_empty() {
            DEFAULT_CONTEXT_FILE_NAMES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            cfg.context_file_names
        };

        Self {
            context_file_names,
            max_tokens: cfg.max_tokens,
        }
    }

    /// Load context files, searching the working directory, each ancestor
    /// up to the filesystem root, then user-config directories.
    ///
    /// Only the first occurrence of each base name is loaded. Files that
    /// would push the cumulative total past `max_tokens` are skipped.
    pub fn load(&self, workdir: &Path, estimator: &dyn TokenEstimator) -> ProjectContext {
        let mut ctx = ProjectContext::default();
        let mut loaded: HashSet<String> = HashSet::new();

        for dir in self.search_paths(workdir) {
            for name in &self.context_file_names {
                let base_name = Path::new(name)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| name.clone());
                if loaded.contains(&base_name) {
                    continue;
                }

                let path = dir.join(name);
                let Ok(content) = fs::read_to_string(&path) else {
                    continue;
                };

                let tokens = estimator.estimate_text(&content);
                if self.max_tokens > 0 && ctx.total_tokens + tokens > self.max_tokens {
                    debug!("skipping {} ({tokens} tokens over budget)", path.display());
                    continue;
                }

                ctx.total_tokens += tokens;
                ctx.files.push(ContextFile {
                    path,
                    name: base_name.clone(),
                    content,
                    tokens,
                });
                loaded.insert(base_name);
            }
        }

        ctx
    }

    /// Render loaded files as a markdown section for the system prompt.
    /// Empty when nothing was loaded.
    pub fn format_for_system_prompt(&self, ctx: &ProjectContext) -> String {
        if ctx.files.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str("\n\n## Project Context\n\n");
        out.push_str("The following project-specific context has been loaded:\n\n");

        for file in &ctx.files {
            out.push_str(&format!("### From {}\n", file.name));
            out.push_str(&format!("(Source: {})\n\n", file.path.display()));
            out.push_str(&file.content);
            out.push_str("\n\n");
        }

        out
    }

    /// Paths of the loaded files, in load order.
    pub fn loaded_files(&self, ctx: &ProjectContext) -> Vec<PathBuf> {
        ctx.files.iter().map(|f| f.path.clone()).collect()
    }

    fn search_paths(&self, workdir: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        let abs = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());

        let mut current = abs.as_path();
        loop {
            paths.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            paths.push(home.join(".config").join("potus"));
            paths.push(home.join(".potus"));
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::estimator::SimpleEstimator;

    fn load(dir: &Path, cfg: ProjectFilesConfig) -> ProjectContext {
        ProjectFiles::new(cfg).load(dir, &SimpleEstimator::new())
    }

    #[test]
    fn loads_file_from_workdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("POTUS.md"), "# Project\nUse tabs.").unwrap();

        let ctx = load(dir.path(), ProjectFilesConfig::default());
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].name, "POTUS.md");
        assert!(ctx.files[0].content.contains("Use tabs"));
        assert!(ctx.total_tokens > 0);
    }

    #[test]
    fn closer_file_wins_per_base_name() {
        let parent = tempfile::tempdir().unwrap();
        let child = parent.path().join("nested");
        fs::create_dir_all(&child).unwrap();
        fs::write(parent.path().join("POTUS.md"), "parent rules").unwrap();
        fs::write(child.join("POTUS.md"), "child rules").unwrap();

        let ctx = load(&child, ProjectFilesConfig::default());
        let potus: Vec<_> = ctx.files.iter().filter(|f| f.name == "POTUS.md").collect();
        assert_eq!(potus.len(), 1);
        assert_eq!(potus[0].content, "child rules");
    }

    #[test]
    fn different_names_all_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("POTUS.md"), "a").unwrap();
        fs::write(dir.path().join("CLAUDE.md"), "b").unwrap();

        let ctx = load(dir.path(), ProjectFilesConfig::default());
        let names: Vec<_> = ctx.files.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"POTUS.md"));
        assert!(names.contains(&"CLAUDE.md"));
    }

    #[test]
    fn nested_context_file_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".potus")).unwrap();
        fs::write(dir.path().join(".potus/context.md"), "nested").unwrap();

        let ctx = load(dir.path(), ProjectFilesConfig::default());
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].name, "context.md");
    }

    #[test]
    fn token_cap_skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("POTUS.md"), "x".repeat(4000)).unwrap();
        fs::write(dir.path().join("CLAUDE.md"), "small").unwrap();

        let ctx = load(
            dir.path(),
            ProjectFilesConfig {
                max_tokens: 100,
                ..Default::default()
            },
        );

        // The 1000-token file is skipped; the small one still fits.
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].name, "CLAUDE.md");
        assert!(ctx.total_tokens <= 100);
    }

    #[test]
    fn format_for_system_prompt_sections() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("POTUS.md"), "content here").unwrap();

        let pf = ProjectFiles::new(ProjectFilesConfig::default());
        let ctx = pf.load(dir.path(), &SimpleEstimator::new());
        let prompt = pf.format_for_system_prompt(&ctx);

        assert!(prompt.contains("## Project Context"));
        assert!(prompt.contains("### From POTUS.md"));
        assert!(prompt.contains("content here"));
    }

    #[test]
    fn format_empty_context_is_empty() {
        let pf = ProjectFiles::new(ProjectFilesConfig::default());
        assert_eq!(pf.format_for_system_prompt(&ProjectContext::default()), "");
    }

    #[test]
    fn custom_file_names_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("NOTES.md"), "custom").unwrap();
        fs::write(dir.path().join("POTUS.md"), "default").unwrap();

        let ctx = load(
            dir.path(),
            ProjectFilesConfig {
                context_file_names: vec!["NOTES.md".into()],
                ..Default::default()
            },
        );
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].name, "NOTES.md");
    }
}
