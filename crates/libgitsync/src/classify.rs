//! Maps git's free-form diagnostics to a structured failure kind.
//!
//! Git reports many unrelated failures with the same exit status, so the
//! decision is made on the stderr text instead. Rules are checked in order
//! against the lower-cased text and the first match wins.

use std::fmt;

/// What kind of failure a git command reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Local and remote histories have diverged.
    Diverged,
    /// A merge or rebase stopped on conflicting edits.
    MergeConflict,
    /// The remote rejected our credentials.
    AuthError,
    /// The requested branch or ref does not exist.
    BranchNotFound,
    /// Anything else; treated as possibly transient.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Diverged => "diverged",
            Self::MergeConflict => "merge conflict",
            Self::AuthError => "authentication error",
            Self::BranchNotFound => "branch not found",
            Self::Unknown => "unknown failure",
        };
        f.write_str(label)
    }
}

/// How serious a failure is for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Recoverable without user intervention.
    Minor,
    /// Possibly transient.
    Moderate,
    /// Needs a human.
    Critical,
}

/// Structured view of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FailureClassification {
    /// The failure kind.
    pub kind: FailureKind,
    /// Its severity.
    pub severity: Severity,
}

/// A single entry in the ordered rule table.
struct Rule {
    /// Kind reported when the rule matches.
    kind: FailureKind,
    /// Severity reported when the rule matches.
    severity: Severity,
    /// Any of these phrases triggers the rule.
    phrases: &'static [&'static str],
    /// Phrases that only count when one of `context` also appears.
    contextual: &'static [&'static str],
    /// Context words gating `contextual`.
    context: &'static [&'static str],
}

impl Rule {
    /// Whether the rule matches the already lower-cased `text`.
    fn matches(&self, text: &str) -> bool {
        if self.phrases.iter().any(|p| text.contains(p)) {
            return true;
        }
        self.contextual.iter().any(|p| text.contains(p))
            && self.context.iter().any(|c| text.contains(c))
    }
}

/// Ordered rule table; earlier rules take priority.
const RULES: &[Rule] = &[
    Rule {
        kind: FailureKind::MergeConflict,
        severity: Severity::Critical,
        phrases: &["merge conflict", "automatic merge failed", "conflicts"],
        contextual: &[],
        context: &[],
    },
    Rule {
        kind: FailureKind::Diverged,
        severity: Severity::Minor,
        phrases: &[
            "diverged",
            "branch has diverged",
            "non-fast-forward",
            "updates were rejected",
            "divergent branches",
            "not possible to fast-forward",
        ],
        contextual: &[],
        context: &[],
    },
    Rule {
        kind: FailureKind::AuthError,
        severity: Severity::Critical,
        phrases: &["permission denied", "authentication failed"],
        contextual: &[],
        context: &[],
    },
    Rule {
        kind: FailureKind::BranchNotFound,
        severity: Severity::Minor,
        phrases: &[
            "could not resolve",
            "unknown revision",
            "couldn't find remote ref",
            "does not match any",
        ],
        contextual: &["does not exist"],
        context: &["remote", "branch", "ref"],
    },
];

/// Classify a failed command from its stderr text.
///
/// Pure: the result depends only on `stderr`.
pub fn classify(stderr: &str) -> FailureClassification {
    let text = stderr.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&text))
        .map_or(
            FailureClassification {
                kind: FailureKind::Unknown,
                severity: Severity::Moderate,
            },
            |rule| FailureClassification {
                kind: rule.kind,
                severity: rule.severity,
            },
        )
}
