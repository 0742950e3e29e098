use crate::task::Task;

/// Ordered, immutable list of tasks. In a local run each task consumes the
/// previous task's output.
#[derive(Debug, Default)]
pub struct Job {
    tasks: Vec<Task>,
}

impl Job {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
