use log::{Level, log};

/// One note recorded while validating a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub dataset: String,
    pub message: String,
}

/// Collector handed into every validation call of a batch run.
///
/// Each note is forwarded to the `log` facade and kept, so a run can be
/// inspected afterwards without a global logger. Workers own their own
/// collector; the orchestrator merges them once the workers are done.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: Level, dataset: &str, message: impl Into<String>) {
        let message = message.into();
        log!(level, "[{dataset}] {message}");
        self.entries.push(Diagnostic {
            level,
            dataset: dataset.to_string(),
            message,
        });
    }

    pub fn debug(&mut self, dataset: &str, message: impl Into<String>) {
        self.record(Level::Debug, dataset, message);
    }

    pub fn info(&mut self, dataset: &str, message: impl Into<String>) {
        self.record(Level::Info, dataset, message);
    }

    pub fn warn(&mut self, dataset: &str, message: impl Into<String>) {
        self.record(Level::Warn, dataset, message);
    }

    /// Append another collector's notes after ours.
    pub fn merge(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Notes recorded for one dataset, in order.
    pub fn for_dataset<'a>(&'a self, dataset: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |d| d.dataset == dataset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_order() {
        let mut a = Diagnostics::new();
        assert!(a.is_empty());
        a.debug("gdp", "first");
        let mut b = Diagnostics::new();
        b.warn("co2", "second");
        b.info("gdp", "third");
        a.merge(b);

        let messages: Vec<_> = a.entries().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(a.len(), 3);
        assert_eq!(a.for_dataset("gdp").count(), 2);
        assert_eq!(a.entries()[1].level, Level::Warn);
    }
}
