//! Markdown checkbox backlog: parse and single-line completion rewrite.
//!
//! A task line is `<indent><-|*> [ ] title` (or `[x]`/`[X]` when complete).
//! The completion rewrite touches only the matched line and keeps its marker
//! and indentation byte-for-byte.

/// A parsed checkbox entry. `line` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownTask {
    pub text: String,
    pub line: usize,
    pub completed: bool,
}

/// Result of rewriting a task to complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteEdit {
    /// New file contents; only the matched line differs from the input.
    Updated(String),
    AlreadyComplete,
    NotFound,
}

/// Parse every checkbox entry in source order.
pub fn parse_tasks(contents: &str) -> Vec<MarkdownTask> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            parse_checkbox(line).map(|(completed, title)| MarkdownTask {
                text: title.to_string(),
                line: idx + 1,
                completed,
            })
        })
        .collect()
}

/// Mark the task with the given (trimmed) title complete.
pub fn complete_task(contents: &str, title: &str) -> CompleteEdit {
    let wanted = title.trim();
    let lines: Vec<&str> = contents.split('\n').collect();

    for (idx, line) in lines.iter().enumerate() {
        if let Some((false, text)) = parse_checkbox(line)
            && text.trim() == wanted
        {
            let mut out_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            out_lines[idx] = line.replacen("[ ]", "[x]", 1);
            return CompleteEdit::Updated(out_lines.join("\n"));
        }
    }

    let already = lines
        .iter()
        .any(|line| matches!(parse_checkbox(line), Some((true, text)) if text.trim() == wanted));
    if already {
        CompleteEdit::AlreadyComplete
    } else {
        CompleteEdit::NotFound
    }
}

/// Parse one line as a checkbox entry: `(completed, title)`.
fn parse_checkbox(line: &str) -> Option<(bool, &str)> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let rest = line.trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix(['-', '*'])?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let rest = rest.trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix('[')?;
    let status = rest.chars().next()?;
    let completed = match status {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    let rest = rest[status.len_utf8()..].strip_prefix(']')?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((completed, rest.trim_start_matches([' ', '\t'])))
}
