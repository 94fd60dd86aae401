//! Per-entry step machine for the ingestion tick
//!
//! Failure semantics are data, not scattered conditionals: each step names
//! the steps it depends on, and a step only runs once every dependency has
//! succeeded. Upsert and draft failures are therefore terminal for an
//! entry, while a summarization failure still lets cover generation run —
//! both depend only on the draft existing.

use std::collections::HashSet;

/// One pipeline step for a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    UpsertPaper,
    EnsureDraft,
    Summarize,
    GenerateCover,
}

impl Step {
    /// Execution order within one entry
    pub const SEQUENCE: [Step; 4] = [
        Step::UpsertPaper,
        Step::EnsureDraft,
        Step::Summarize,
        Step::GenerateCover,
    ];

    /// Steps that must have succeeded before this one may run
    pub fn depends_on(self) -> &'static [Step] {
        match self {
            Step::UpsertPaper => &[],
            Step::EnsureDraft => &[Step::UpsertPaper],
            Step::Summarize => &[Step::EnsureDraft],
            Step::GenerateCover => &[Step::EnsureDraft],
        }
    }

    /// Kind recorded on the job ledger
    pub fn job_kind(self) -> &'static str {
        match self {
            Step::UpsertPaper => "upsert_paper",
            Step::EnsureDraft => "ensure_draft",
            Step::Summarize => "summarize",
            Step::GenerateCover => "generate_cover",
        }
    }
}

/// Tracks which steps have succeeded for one entry
#[derive(Debug, Default)]
pub struct StepTracker {
    succeeded: HashSet<Step>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful step
    pub fn mark_ok(&mut self, step: Step) {
        self.succeeded.insert(step);
    }

    /// Whether a step succeeded
    pub fn ok(&self, step: Step) -> bool {
        self.succeeded.contains(&step)
    }

    /// Whether every dependency of a step has succeeded
    pub fn ready(&self, step: Step) -> bool {
        step.depends_on().iter().all(|dep| self.succeeded.contains(dep))
    }
}
