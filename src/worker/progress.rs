/// Completed-attempt accounting for one run.
#[derive(Debug, Clone)]
pub struct Progress {
    completed: usize,
    total: usize,
    last_percent: u8,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            last_percent: 0,
        }
    }

    /// Records one finished attempt and returns `floor(completed / total * 100)`.
    pub fn complete_one(&mut self) -> u8 {
        if self.completed < self.total {
            self.completed += 1;
        }
        self.last_percent = self.last_percent.max(self.percent());
        self.last_percent
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.completed * 100 / self.total) as u8
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
