//! Plain-string previews for the confirmation prompt.
//!
//! These renderings carry no styling; the frontend adds colour. The edit
//! preview is a unified-diff-style block centered on the change with a
//! 3-line context window.

/// Lines of unchanged context shown around a change.
const CONTEXT_RADIUS: usize = 3;

/// How far ahead to look for a resync point between diverged line runs.
const MAX_LOOKAHEAD: usize = 50;

/// Render a unified-diff-style preview of `old_content` → `new_content`.
pub fn generate_unified_diff(old_content: &str, new_content: &str, filename: &str) -> String {
    let old_lines: Vec<&str> = old_content.split('\n').collect();
    let new_lines: Vec<&str> = new_content.split('\n').collect();

    let mut out = String::new();
    out.push_str(&format!("--- {filename}\n"));
    out.push_str(&format!("+++ {filename}\n"));

    let mut i = 0;
    let mut j = 0;
    while i < old_lines.len() || j < new_lines.len() {
        if i < old_lines.len() && j < new_lines.len() && old_lines[i] == new_lines[j] {
            if is_near_change(&old_lines, &new_lines, i, j) {
                out.push_str(&format!(" {}\n", old_lines[i]));
            }
            i += 1;
            j += 1;
        } else {
            let (old_end, new_end) = find_match_point(&old_lines, &new_lines, i, j);

            for line in old_lines.iter().take(old_end.min(old_lines.len())).skip(i) {
                out.push_str(&format!("-{line}\n"));
            }
            for line in new_lines.iter().take(new_end.min(new_lines.len())).skip(j) {
                out.push_str(&format!("+{line}\n"));
            }

            i = old_end;
            j = new_end;
        }
    }

    out
}

/// Render a new-file preview: a header plus every line prefixed `+`.
pub fn format_new_file(path: &str, content: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("+++ {path} (new file)\n"));
    for line in content.split('\n') {
        out.push_str(&format!("+{line}\n"));
    }
    out
}

/// Render a delete preview: a header plus every line prefixed `-`.
pub fn format_delete_file(path: &str, content: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("--- {path} (deleted)\n"));
    for line in content.split('\n') {
        out.push_str(&format!("-{line}\n"));
    }
    out
}

/// Render a shell-command preview.
pub fn format_bash_command(command: &str) -> String {
    format!("$ {command}")
}

/// Whether there is a mismatch within the context radius of this aligned
/// position.
fn is_near_change(old_lines: &[&str], new_lines: &[&str], oi: usize, ni: usize) -> bool {
    for d in 1..=CONTEXT_RADIUS {
        if oi + d < old_lines.len() && ni + d < new_lines.len() && old_lines[oi + d] != new_lines[ni + d]
        {
            return true;
        }
        if oi >= d && ni >= d && old_lines[oi - d] != new_lines[ni - d] {
            return true;
        }
    }
    false
}

/// Advance through diverged lines until the two sides line up again.
fn find_match_point(
    old_lines: &[&str],
    new_lines: &[&str],
    oi: usize,
    ni: usize,
) -> (usize, usize) {
    for d in 1..MAX_LOOKAHEAD {
        if oi + d < old_lines.len() && ni < new_lines.len() && old_lines[oi + d] == new_lines[ni] {
            return (oi + d, ni);
        }
        if ni + d < new_lines.len() && oi < old_lines.len() && new_lines[ni + d] == old_lines[oi] {
            return (oi, ni + d);
        }
        if oi + d < old_lines.len()
            && ni + d < new_lines.len()
            && old_lines[oi + d] == new_lines[ni + d]
        {
            return (oi + d, ni + d);
        }
    }

    (old_lines.len(), new_lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_preview() {
        let preview = format_new_file("src/foo.rs", "line one\nline two");
        assert_eq!(
            preview,
            "+++ src/foo.rs (new file)\n+line one\n+line two\n"
        );
    }

    #[test]
    fn delete_preview() {
        let preview = format_delete_file("old.txt", "a\nb");
        assert_eq!(preview, "--- old.txt (deleted)\n-a\n-b\n");
    }

    #[test]
    fn bash_preview() {
        assert_eq!(format_bash_command("ls -la"), "$ ls -la");
    }

    #[test]
    fn unified_diff_single_line_change() {
        let old = "a\nb\nc\nd\ne\nf\ng";
        let new = "a\nb\nc\nD\ne\nf\ng";
        let diff = generate_unified_diff(old, new, "x.txt");

        assert!(diff.starts_with("--- x.txt\n+++ x.txt\n"));
        assert!(diff.contains("-d\n"));
        assert!(diff.contains("+D\n"));
        // Context is limited to the 3-line window around the change.
        assert!(diff.contains(" c\n"));
        assert!(!diff.contains(" a\n"));
    }

    #[test]
    fn unified_diff_insertion() {
        let old = "one\ntwo";
        let new = "one\ninserted\ntwo";
        let diff = generate_unified_diff(old, new, "f");
        assert!(diff.contains("+inserted\n"));
        assert!(!diff.contains("-one"));
    }

    #[test]
    fn unified_diff_identical_content_has_no_change_lines() {
        let diff = generate_unified_diff("same\nlines", "same\nlines", "f");
        assert!(!diff.contains("\n-"));
        assert!(!diff.contains("\n+same"));
    }
}
