//! Per-kind stream buffers.
//!
//! Both transports emit cumulative output: every data event carries the
//! whole text produced so far, never a delta. The aggregator keeps one buffer
//! per [`TaskKind`] so edit and chat output never share a display, and it is
//! the one place that guarantees consumers a non-decreasing length for the
//! life of a task.

use std::collections::HashMap;

use crate::types::TaskKind;

#[derive(Debug, Default)]
pub struct StreamAggregator {
    buffers: HashMap<TaskKind, String>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the buffer for `kind` at task start.
    pub fn start(&mut self, kind: TaskKind) {
        self.buffers.insert(kind, String::new());
    }

    /// Replaces the buffer for `kind` with a cumulative `full_text`.
    ///
    /// Returns the new buffer when it grew. A text that is not longer than
    /// the current buffer is dropped and `None` is returned: a late or torn
    /// read must never make the visible output shrink.
    pub fn update(&mut self, kind: TaskKind, full_text: &str) -> Option<&str> {
        let buf = self.buffers.entry(kind).or_default();
        if full_text.len() <= buf.len() {
            return None;
        }
        buf.clear();
        buf.push_str(full_text);
        Some(buf.as_str())
    }

    /// Current contents of the buffer for `kind` (empty if never started).
    pub fn snapshot(&self, kind: TaskKind) -> &str {
        self.buffers.get(&kind).map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_updates_never_shrink() {
        let mut agg = StreamAggregator::new();
        agg.start(TaskKind::Edit);
        assert_eq!(agg.update(TaskKind::Edit, "Hel"), Some("Hel"));
        assert_eq!(agg.update(TaskKind::Edit, "Hello"), Some("Hello"));
        assert_eq!(agg.update(TaskKind::Edit, "He"), None);
        assert_eq!(agg.update(TaskKind::Edit, "Hello"), None);
        assert_eq!(agg.snapshot(TaskKind::Edit), "Hello");
    }

    #[test]
    fn kinds_do_not_cross() {
        let mut agg = StreamAggregator::new();
        agg.start(TaskKind::Edit);
        agg.start(TaskKind::Chat);
        agg.update(TaskKind::Edit, "edit output");
        agg.update(TaskKind::Chat, "a");
        agg.update(TaskKind::Chat, "ab");
        assert_eq!(agg.snapshot(TaskKind::Edit), "edit output");
        assert_eq!(agg.snapshot(TaskKind::Chat), "ab");
    }

    #[test]
    fn start_resets_buffer() {
        let mut agg = StreamAggregator::new();
        agg.update(TaskKind::Chat, "old reply");
        agg.start(TaskKind::Chat);
        assert_eq!(agg.snapshot(TaskKind::Chat), "");
        assert_eq!(agg.update(TaskKind::Chat, "new"), Some("new"));
    }
}
