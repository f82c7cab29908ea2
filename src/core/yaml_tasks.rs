//! YAML task backlog: indentation-walking parser and completion rewrite.
//!
//! Task files are edited in place line-by-line rather than round-tripped
//! through a YAML library, so user formatting, comments, and unknown keys
//! survive a completion untouched. The walker only understands the shape it
//! needs: a `tasks:` header, `- ` items beneath it, and the `title`,
//! `completed`, and `parallel_group` keys.

/// A parsed task entry. `line` is the 1-indexed line of the item's `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlTask {
    pub title: String,
    pub line: usize,
    pub completed: bool,
    pub parallel_group: u64,
}

/// Result of rewriting a task to complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteEdit {
    Updated(String),
    AlreadyComplete,
    NotFound,
}

struct Block {
    /// 0-indexed line of the `-` item.
    start: usize,
    /// 0-indexed line holding `title:` (the item line when inline).
    title_line: usize,
    /// Column where the item's properties start (after `- `).
    property_indent: usize,
    title: String,
    /// 0-indexed line of an existing `completed:` property.
    completed_line: Option<usize>,
    completed: bool,
    parallel_group: u64,
}

/// Parse every task under the `tasks:` header, in source order.
pub fn parse_tasks(contents: &str) -> Vec<YamlTask> {
    collect_blocks(contents)
        .into_iter()
        .map(|b| YamlTask {
            title: b.title,
            line: b.start + 1,
            completed: b.completed,
            parallel_group: b.parallel_group,
        })
        .collect()
}

/// Mark the task with the given (trimmed) title complete.
///
/// Rewrites the existing `completed:` value (keeping any trailing comment),
/// or inserts `completed: true` immediately after the title line.
pub fn complete_task(contents: &str, title: &str) -> CompleteEdit {
    let wanted = title.trim();
    let blocks = collect_blocks(contents);

    let Some(block) = blocks.iter().find(|b| b.title.trim() == wanted) else {
        return CompleteEdit::NotFound;
    };
    if block.completed {
        return CompleteEdit::AlreadyComplete;
    }

    let mut lines: Vec<String> = contents.split('\n').map(str::to_string).collect();
    match block.completed_line {
        Some(idx) => lines[idx] = rewrite_completed_line(&lines[idx]),
        None => {
            let inserted = format!("{}completed: true", " ".repeat(block.property_indent));
            lines.insert(block.title_line + 1, inserted);
        }
    }
    CompleteEdit::Updated(lines.join("\n"))
}

fn collect_blocks(contents: &str) -> Vec<Block> {
    let lines: Vec<&str> = contents.split('\n').collect();
    let Some((header_idx, header_indent)) = find_tasks_header(&lines) else {
        return Vec::new();
    };

    let mut blocks: Vec<Block> = Vec::new();
    let mut idx = header_idx + 1;
    while idx < lines.len() {
        let line = lines[idx];
        if !line.trim().is_empty() && indent_of(line) <= header_indent {
            break;
        }
        if let Some(item_indent) = parse_item_start(line, header_indent) {
            let (block, next) = parse_block(&lines, idx, item_indent);
            blocks.push(block);
            idx = next;
        } else {
            idx += 1;
        }
    }
    blocks
}

fn parse_block(lines: &[&str], start: usize, item_indent: usize) -> (Block, usize) {
    let item_line = lines[start];
    let after_dash = &item_line[item_indent + 1..];
    let content = after_dash.trim_start();
    let property_indent = item_line.len() - content.len();

    let mut block = Block {
        start,
        title_line: start,
        property_indent,
        title: String::new(),
        completed_line: None,
        completed: false,
        parallel_group: 0,
    };

    // The item line itself may carry the first property (`- title: …`) or a
    // bare title (`- Fix the build`).
    match parse_property(content) {
        Some((key, value)) => block.apply(key, value, start),
        None => block.title = unquote(content).to_string(),
    }

    let mut idx = start + 1;
    while idx < lines.len() {
        let line = lines[idx];
        if line.trim().is_empty() {
            idx += 1;
            continue;
        }
        if indent_of(line) <= item_indent {
            break;
        }
        if let Some((key, value)) = parse_property(line.trim_start()) {
            block.apply(key, value, idx);
        }
        idx += 1;
    }
    (block, idx)
}

impl Block {
    fn apply(&mut self, key: &str, value: &str, line: usize) {
        match key {
            "title" => {
                self.title = unquote(value).to_string();
                self.title_line = line;
            }
            "completed" => {
                self.completed_line = Some(line);
                self.completed = strip_comment(value).trim() == "true";
            }
            "parallel_group" => {
                self.parallel_group = strip_comment(value).trim().parse().unwrap_or(0);
            }
            _ => {}
        }
    }
}

fn find_tasks_header(lines: &[&str]) -> Option<(usize, usize)> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let stripped = line.strip_suffix('\r').unwrap_or(line);
        let indent = indent_of(stripped);
        (stripped[indent..].trim_end() == "tasks:").then_some((idx, indent))
    })
}

/// A `- ` item line deeper than the `tasks:` header; returns the dash column.
fn parse_item_start(line: &str, header_indent: usize) -> Option<usize> {
    let indent = indent_of(line);
    if indent <= header_indent {
        return None;
    }
    let rest = &line[indent..];
    let after = rest.strip_prefix('-')?;
    after.starts_with([' ', '\t']).then_some(indent)
}

fn parse_property<'a>(content: &'a str) -> Option<(&'a str, &'a str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value.trim()))
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn unquote(value: &str) -> &str {
    let value = value.trim().trim_end_matches('\r');
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn strip_comment(value: &str) -> &str {
    match value.find('#') {
        Some(pos) => &value[..pos],
        None => value,
    }
}

/// Rewrite a `completed:` line's value to `true`, keeping the key, its
/// indentation, and any trailing comment.
fn rewrite_completed_line(line: &str) -> String {
    let Some(colon) = line.find(':') else {
        return line.to_string();
    };
    let (head, tail) = line.split_at(colon + 1);
    match tail.find('#') {
        Some(pos) => format!("{head} true {}", tail[pos..].trim_end()),
        None => format!("{head} true"),
    }
}
