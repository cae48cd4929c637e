//! Phase identity, permissions and ordering policy.
//!
//! This module provides:
//! - `Phase`, the closed set of workflow stages in their fixed total order
//! - `PhasePermissions`, one auto-advance flag per phase
//! - `next_permitted_phase`, the pure policy that picks the next stage
//! - `CompletionRoute`, the transition table consulted when a phase finishes

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One stage of the workflow.
///
/// Declaration order is the execution order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Requirements,
    Design,
    Tasks,
    DocumentReview,
    Impl,
    Inspection,
    Deploy,
}

/// The fixed phase order.
pub const PHASE_ORDER: [Phase; 7] = [
    Phase::Requirements,
    Phase::Design,
    Phase::Tasks,
    Phase::DocumentReview,
    Phase::Impl,
    Phase::Inspection,
    Phase::Deploy,
];

/// How the coordinator continues after a phase agent reports success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRoute {
    /// Request the next permitted phase, or finish when there is none.
    Linear,
    /// Enter the bounded document-review loop when it is reachable.
    EnterReviewLoop,
    /// Wait for the review verdict before moving on.
    AwaitReviewVerdict,
    /// Request inspection when permitted, otherwise finish.
    InspectionOrFinish,
    /// Wait for the inspection verdict, which decides on merge.
    AwaitInspectionVerdict,
    /// Terminal step: the run is complete.
    Finish,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Requirements => "requirements",
            Phase::Design => "design",
            Phase::Tasks => "tasks",
            Phase::DocumentReview => "document-review",
            Phase::Impl => "impl",
            Phase::Inspection => "inspection",
            Phase::Deploy => "deploy",
        }
    }

    /// Position in `PHASE_ORDER`.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Phases that produce a spec document requiring human approval.
    pub fn is_document_phase(&self) -> bool {
        matches!(self, Phase::Requirements | Phase::Design | Phase::Tasks)
    }

    pub fn completion_route(&self) -> CompletionRoute {
        match self {
            Phase::Requirements | Phase::Design => CompletionRoute::Linear,
            Phase::Tasks => CompletionRoute::EnterReviewLoop,
            Phase::DocumentReview => CompletionRoute::AwaitReviewVerdict,
            Phase::Impl => CompletionRoute::InspectionOrFinish,
            Phase::Inspection => CompletionRoute::AwaitInspectionVerdict,
            Phase::Deploy => CompletionRoute::Finish,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "requirements" => Ok(Phase::Requirements),
            "design" => Ok(Phase::Design),
            "tasks" => Ok(Phase::Tasks),
            "document-review" | "document_review" => Ok(Phase::DocumentReview),
            "impl" => Ok(Phase::Impl),
            "inspection" => Ok(Phase::Inspection),
            "deploy" => Ok(Phase::Deploy),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: requirements, design, tasks, document-review, impl, inspection, deploy",
                s
            ),
        }
    }
}

/// Auto-advance permission per phase.
///
/// Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PhasePermissions {
    pub requirements: bool,
    pub design: bool,
    pub tasks: bool,
    pub document_review: bool,
    #[serde(rename = "impl")]
    pub impl_: bool,
    pub inspection: bool,
    pub deploy: bool,
}

impl PhasePermissions {
    /// Every phase permitted.
    pub fn all() -> Self {
        Self {
            requirements: true,
            design: true,
            tasks: true,
            document_review: true,
            impl_: true,
            inspection: true,
            deploy: true,
        }
    }

    /// Only the listed phases permitted.
    pub fn only(phases: &[Phase]) -> Self {
        let mut permissions = Self::default();
        for phase in phases {
            permissions.set(*phase, true);
        }
        permissions
    }

    pub fn is_permitted(&self, phase: Phase) -> bool {
        match phase {
            Phase::Requirements => self.requirements,
            Phase::Design => self.design,
            Phase::Tasks => self.tasks,
            Phase::DocumentReview => self.document_review,
            Phase::Impl => self.impl_,
            Phase::Inspection => self.inspection,
            Phase::Deploy => self.deploy,
        }
    }

    pub fn set(&mut self, phase: Phase, permitted: bool) {
        match phase {
            Phase::Requirements => self.requirements = permitted,
            Phase::Design => self.design = permitted,
            Phase::Tasks => self.tasks = permitted,
            Phase::DocumentReview => self.document_review = permitted,
            Phase::Impl => self.impl_ = permitted,
            Phase::Inspection => self.inspection = permitted,
            Phase::Deploy => self.deploy = permitted,
        }
    }

    pub fn permitted_phases(&self) -> Vec<Phase> {
        PHASE_ORDER
            .iter()
            .copied()
            .filter(|p| self.is_permitted(*p))
            .collect()
    }
}

/// First permitted phase strictly after `current`, or from the start when
/// `current` is `None`.
///
/// Returns `None` when no later phase is permitted; callers treat that as
/// immediate completion.
pub fn next_permitted_phase(current: Option<Phase>, permissions: &PhasePermissions) -> Option<Phase> {
    let start = current.map(|p| p.index() + 1).unwrap_or(0);
    PHASE_ORDER
        .iter()
        .skip(start)
        .copied()
        .find(|p| permissions.is_permitted(*p))
}

/// Parse a comma-separated phase list such as `requirements,design,tasks`.
pub fn parse_phase_list(list: &str) -> Result<Vec<Phase>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
