//! Rolling per-persona record of condensed key events.

/// Ordered list of short event summaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBuffer {
    entries: Vec<String>,
    cap: usize,
}

impl HistoryBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Replace every entry
    pub fn replace<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries = entries.into_iter().map(Into::into).collect();
    }

    /// Replace the entries with a comma separated summary
    pub fn replace_with_summary(&mut self, summary: &str) {
        self.entries = summary
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether the buffer has grown past its cap
    pub fn needs_compaction(&self) -> bool {
        self.entries.len() > self.cap
    }
}
