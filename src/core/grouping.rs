//! Partition a backlog into parallel groups.

use crate::core::task::{SourceKind, Task};

/// A task plus its position in the source, so reports can be re-sorted into
/// source order after out-of-order completion.
#[derive(Debug, Clone)]
pub struct IndexedTask {
    pub task: Task,
    pub index: usize,
}

/// Tasks sharing a group run serially; distinct groups may run concurrently.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    pub key: String,
    pub tasks: Vec<IndexedTask>,
}

/// Partition incomplete tasks into groups, preserving first-seen group order
/// and source order within each group. A finite `max_iterations` truncates
/// the backlog before grouping.
pub fn partition(tasks: Vec<Task>, max_iterations: Option<u32>) -> Vec<TaskGroup> {
    let mut pending: Vec<Task> = tasks.into_iter().filter(|task| !task.completed).collect();
    if let Some(limit) = max_iterations {
        pending.truncate(limit as usize);
    }

    let mut groups: Vec<TaskGroup> = Vec::new();
    for (index, task) in pending.into_iter().enumerate() {
        let key = group_key(&task);
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.tasks.push(IndexedTask { task, index }),
            None => groups.push(TaskGroup {
                key,
                tasks: vec![IndexedTask { task, index }],
            }),
        }
    }
    groups
}

fn group_key(task: &Task) -> String {
    match task.source {
        SourceKind::Markdown => "default".to_string(),
        _ => task.group.unwrap_or(0).to_string(),
    }
}
