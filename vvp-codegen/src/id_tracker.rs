use crate::emit::Label;

/// Hands out thread numbers. Thread numbers are unique for a whole run and are
/// never reused
pub struct ThreadIdTracker {
    id: u32,
}

impl ThreadIdTracker {
    pub fn new() -> Self {
        Self { id: 0 }
    }

    /// The number of the thread body currently being generated
    pub fn current(&self) -> u32 {
        self.id
    }

    pub fn advance(&mut self) -> u32 {
        let result = self.id;
        self.id += 1;
        result
    }
}

impl Default for ThreadIdTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out the local labels of one thread body
pub struct LabelTracker {
    thread: u32,
    next: u32,
}

impl LabelTracker {
    pub fn new(thread: u32) -> Self {
        Self { thread, next: 0 }
    }

    pub fn next(&mut self) -> Label {
        let result = Label {
            thread: self.thread,
            local: self.next,
        };
        self.next += 1;
        result
    }

    /// A contiguous block of `count` labels
    pub fn next_n(&mut self, count: usize) -> Vec<Label> {
        (0..count).map(|_| self.next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn labels_carry_their_thread() {
        let mut labels = LabelTracker::new(3);
        assert_eq!(labels.next().to_string(), "T_3.0");
        assert_eq!(
            labels.next_n(2),
            vec![
                Label {
                    thread: 3,
                    local: 1
                },
                Label {
                    thread: 3,
                    local: 2
                }
            ]
        );
    }

    #[test]
    fn thread_ids_increase() {
        let mut threads = ThreadIdTracker::new();
        assert_eq!(threads.advance(), 0);
        assert_eq!(threads.current(), 1);
        assert_eq!(threads.advance(), 1);
    }
}
