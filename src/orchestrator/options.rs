//! Per-start execution options.
//!
//! Options are captured when a unit starts and stay fixed for the run;
//! `retry_from` reuses the stored copy.

use crate::phase::{Phase, PhasePermissions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether the document-review loop starts on its own or waits for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFlag {
    #[default]
    Run,
    Pause,
}

impl std::fmt::Display for ReviewFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewFlag::Run => write!(f, "run"),
            ReviewFlag::Pause => write!(f, "pause"),
        }
    }
}

impl std::str::FromStr for ReviewFlag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "run" => Ok(ReviewFlag::Run),
            "pause" => Ok(ReviewFlag::Pause),
            _ => anyhow::bail!("Invalid review flag '{}'. Valid values: run, pause", s),
        }
    }
}

/// Auxiliary validation toggles forwarded to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationOptions {
    /// Run gap analysis against existing code before design.
    pub gap: bool,
    /// Validate the design document after it is generated.
    pub design: bool,
    /// Validate the implementation after impl.
    #[serde(rename = "impl")]
    pub impl_: bool,
}

/// Generation/approval state of one document phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub generated: bool,
    pub approved: bool,
}

impl ApprovalStatus {
    pub fn approved() -> Self {
        Self {
            generated: true,
            approved: true,
        }
    }
}

/// Options captured at `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub permissions: PhasePermissions,
    pub review_flag: ReviewFlag,
    pub validation: ValidationOptions,
    /// Overrides the coordinator's stall window.
    pub timeout_ms: Option<u64>,
    /// Precomputed document approvals; lets a run start mid-sequence.
    pub approvals: Option<BTreeMap<Phase, ApprovalStatus>>,
    /// Gate for the merge step after a passed inspection, separate from
    /// `permissions.deploy`.
    pub auto_merge: bool,
}

impl ExecutionOptions {
    pub fn new(permissions: PhasePermissions) -> Self {
        Self {
            permissions,
            ..Default::default()
        }
    }

    pub fn with_review_flag(mut self, flag: ReviewFlag) -> Self {
        self.review_flag = flag;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_approvals(mut self, approvals: BTreeMap<Phase, ApprovalStatus>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    pub fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    pub fn with_validation(mut self, validation: ValidationOptions) -> Self {
        self.validation = validation;
        self
    }

    pub fn approval(&self, phase: Phase) -> Option<ApprovalStatus> {
        self.approvals.as_ref().and_then(|a| a.get(&phase).copied())
    }

    /// Merge runs only when both the deploy permission and the merge gate are set.
    pub fn merge_allowed(&self) -> bool {
        self.permissions.deploy && self.auto_merge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_flag_parse() {
        assert_eq!("run".parse::<ReviewFlag>().unwrap(), ReviewFlag::Run);
        assert_eq!("PAUSE".parse::<ReviewFlag>().unwrap(), ReviewFlag::Pause);
        assert!("skip".parse::<ReviewFlag>().is_err());
    }

    #[test]
    fn test_merge_requires_both_flags() {
        let perms = PhasePermissions::only(&[Phase::Deploy]);
        assert!(!ExecutionOptions::new(perms).merge_allowed());
        assert!(ExecutionOptions::new(perms).with_auto_merge(true).merge_allowed());
        assert!(
            !ExecutionOptions::new(PhasePermissions::default())
                .with_auto_merge(true)
                .merge_allowed()
        );
    }

    #[test]
    fn test_options_deserialize_with_approvals() {
        let json = r#"{
            "permissions": {"requirements": true, "design": true},
            "review_flag": "pause",
            "approvals": {"requirements": {"generated": true, "approved": true}}
        }"#;
        let opts: ExecutionOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.review_flag, ReviewFlag::Pause);
        assert_eq!(
            opts.approval(Phase::Requirements),
            Some(ApprovalStatus::approved())
        );
        assert_eq!(opts.approval(Phase::Design), None);
        assert!(opts.timeout_ms.is_none());
    }

    #[test]
    fn test_validation_rejects_unknown_toggle() {
        let err = serde_json::from_str::<ValidationOptions>(r#"{"lint": true}"#);
        assert!(err.is_err());
    }
}
