//! Per-call accumulation of diagnostics, tagged by the phase that raised them.

use crate::diagnostic::{Diagnostic, Phase};

/// Collects the diagnostics of a single transform invocation.
///
/// A fresh collector is created for every call, so nothing leaks between invocations.
/// Any diagnostic, whatever its level, counts as an error.
#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the processor's pending errors and records them under `phase`.
    #[cfg(feature = "xslt")]
    pub fn record(&mut self, queue: &mut xslproc_xslt::ErrorQueue, phase: Phase) {
        for pending in queue.drain() {
            log::debug!("{} diagnostic at line {}: {}", phase, pending.line, pending.message);
            self.diagnostics.push(Diagnostic {
                phase,
                message: pending.message,
                file: pending.file,
                line: pending.line,
                level: pending.level.into(),
            });
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Every diagnostic in emission order.
    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn of_phase(&self, phase: Phase) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.phase == phase)
    }

    pub fn reset(&mut self) {
        self.diagnostics.clear();
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Level;

    #[test]
    fn push_and_reset() {
        let mut collector = ErrorCollector::new();
        assert!(!collector.has_errors());
        collector.push(Diagnostic::new(Phase::Xml, Level::Warning, "w"));
        collector.push(Diagnostic::new(Phase::Xsl, Level::Error, "e"));
        assert!(collector.has_errors());
        assert_eq!(collector.of_phase(Phase::Xsl).count(), 1);
        collector.reset();
        assert!(collector.all().is_empty());
    }

    #[cfg(feature = "xslt")]
    #[test]
    fn record_drains_the_queue_and_stamps_the_phase() {
        let mut queue = xslproc_xslt::ErrorQueue::new();
        queue.report(xslproc_xslt::Level::Error, "first", "a.xsl", 3);
        queue.report(xslproc_xslt::Level::Fatal, "second", "", 0);

        let mut collector = ErrorCollector::new();
        collector.record(&mut queue, Phase::Xsl);
        assert!(queue.is_empty());

        let all = collector.into_diagnostics();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].phase, Phase::Xsl);
        assert_eq!(all[0].file, "a.xsl");
        assert_eq!(all[0].line, 3);
        assert_eq!(all[1].level, Level::Fatal);
    }

    #[cfg(feature = "xslt")]
    #[test]
    fn recording_twice_never_duplicates() {
        let mut queue = xslproc_xslt::ErrorQueue::new();
        queue.report(xslproc_xslt::Level::Error, "once", "", 1);
        let mut collector = ErrorCollector::new();
        collector.record(&mut queue, Phase::Xml);
        collector.record(&mut queue, Phase::Xsl);
        assert_eq!(collector.all().len(), 1);
        assert_eq!(collector.all()[0].phase, Phase::Xml);
    }
}
