//! Typed audit report and the failure value that stands in for it.
//!
//! `AuditResult` can only be built through [`AuditResult::new`] or by
//! deserializing, and both paths enforce the same invariants: the tier is one
//! of the four enumerated values and there are at most [`MAX_ACTIONS`]
//! remediation actions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::retrieval::RetrievalError;

/// Upper bound on remediation actions in one report.
pub const MAX_ACTIONS: usize = 10;

/// The regulation's four-level risk classification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Minimal,
    Limited,
    High,
    Unacceptable,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [Self::Minimal, Self::Limited, Self::High, Self::Unacceptable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Limited => "limited",
            Self::High => "high",
            Self::Unacceptable => "unacceptable",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a model answer could not be turned into an [`AuditResult`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("model output contains no JSON object")]
    NoJsonObject,

    #[error("model output is not valid JSON: {0}")]
    Malformed(String),

    #[error("model output does not match the audit schema: {0}")]
    Schema(String),

    #[error("audit report lists {count} actions; at most {max} are allowed", max = MAX_ACTIONS)]
    TooManyActions { count: usize },
}

/// Validated compliance report. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAuditResult")]
pub struct AuditResult {
    tier: RiskTier,
    actions: Vec<String>,
    model_card_md: String,
}

#[derive(Deserialize)]
struct RawAuditResult {
    tier: RiskTier,
    actions: Vec<String>,
    model_card_md: String,
}

impl TryFrom<RawAuditResult> for AuditResult {
    type Error = ValidationError;

    fn try_from(raw: RawAuditResult) -> Result<Self, Self::Error> {
        Self::new(raw.tier, raw.actions, raw.model_card_md)
    }
}

impl AuditResult {
    pub fn new(
        tier: RiskTier,
        actions: Vec<String>,
        model_card_md: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if actions.len() > MAX_ACTIONS {
            return Err(ValidationError::TooManyActions {
                count: actions.len(),
            });
        }
        Ok(Self {
            tier,
            actions,
            model_card_md: model_card_md.into(),
        })
    }

    pub fn tier(&self) -> RiskTier {
        self.tier
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn model_card_md(&self) -> &str {
        &self.model_card_md
    }

    /// JSON description of the report handed to the model as format instructions.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["tier", "actions", "model_card_md"],
            "properties": {
                "tier": {
                    "type": "string",
                    "enum": RiskTier::ALL.iter().map(RiskTier::as_str).collect::<Vec<_>>(),
                    "description": "Risk tier per EU AI Act"
                },
                "actions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "maxItems": MAX_ACTIONS,
                    "description": "List of remediation actions"
                },
                "model_card_md": {
                    "type": "string",
                    "description": "Markdown model card"
                }
            }
        })
    }
}

/// Which pipeline stage produced an [`AuditFailure`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Retrieval,
    Generation,
    Validation,
}

/// Report-shaped diagnostic returned when a scan could not produce a valid report.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditFailure {
    pub kind: FailureKind,
    pub error: String,
    /// Verbatim model output; empty when the model was never reached.
    pub raw_output: String,
}

impl AuditFailure {
    pub fn retrieval(err: &RetrievalError) -> Self {
        Self {
            kind: FailureKind::Retrieval,
            error: format!("retrieval failed: {err}"),
            raw_output: String::new(),
        }
    }

    pub fn generation(err: &GatewayError) -> Self {
        Self {
            kind: FailureKind::Generation,
            error: format!("generation failed ({}): {err}", err.error_kind()),
            raw_output: String::new(),
        }
    }

    pub fn validation(err: &ValidationError, raw_output: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            error: err.to_string(),
            raw_output: raw_output.into(),
        }
    }
}

/// Terminal result of a scan that got past cloning.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AuditOutcome {
    Report(AuditResult),
    Failure(AuditFailure),
}

impl AuditOutcome {
    pub fn report(&self) -> Option<&AuditResult> {
        match self {
            Self::Report(r) => Some(r),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AuditFailure> {
        match self {
            Self::Report(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> AuditResult {
        AuditResult::new(RiskTier::Limited, vec!["Add logging".into()], "# Model").unwrap()
    }

    #[test]
    fn serializes_exactly_three_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(json["tier"], "limited");
        assert_eq!(json["actions"], serde_json::json!(["Add logging"]));
        assert_eq!(json["model_card_md"], "# Model");
    }

    #[test]
    fn new_rejects_more_than_ten_actions() {
        let actions = (0..11).map(|i| format!("action {i}")).collect();
        let err = AuditResult::new(RiskTier::High, actions, "").unwrap_err();
        assert_eq!(err, ValidationError::TooManyActions { count: 11 });
    }

    #[test]
    fn new_accepts_exactly_ten_actions() {
        let actions: Vec<String> = (0..10).map(|i| format!("action {i}")).collect();
        let report = AuditResult::new(RiskTier::High, actions, "").unwrap();
        assert_eq!(report.actions().len(), 10);
    }

    #[test]
    fn deserialize_enforces_action_cap() {
        let actions: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let raw = serde_json::json!({"tier": "high", "actions": actions, "model_card_md": ""});
        let err = serde_json::from_value::<AuditResult>(raw).unwrap_err();
        assert!(err.to_string().contains("at most 10"));
    }

    #[test]
    fn deserialize_rejects_unknown_tier() {
        let raw = r#"{"tier":"severe","actions":[],"model_card_md":""}"#;
        assert!(serde_json::from_str::<AuditResult>(raw).is_err());
    }

    #[test]
    fn tier_display_matches_wire() {
        for tier in RiskTier::ALL {
            let wire = serde_json::to_string(&tier).unwrap();
            assert_eq!(wire, format!("\"{tier}\""));
        }
    }

    #[test]
    fn schema_lists_every_tier() {
        let schema = AuditResult::json_schema();
        assert_eq!(
            schema["properties"]["tier"]["enum"],
            serde_json::json!(["minimal", "limited", "high", "unacceptable"])
        );
        assert_eq!(schema["properties"]["actions"]["maxItems"], 10);
    }

    #[test]
    fn generation_failure_names_cause() {
        let f = AuditFailure::generation(&GatewayError::NetworkError("dns lookup failed".into()));
        assert_eq!(f.kind, FailureKind::Generation);
        assert!(f.error.contains("dns lookup failed"));
        assert!(f.raw_output.is_empty());
    }

    #[test]
    fn outcome_serializes_untagged() {
        let report = serde_json::to_value(AuditOutcome::Report(sample())).unwrap();
        assert_eq!(report["tier"], "limited");

        let failure = AuditOutcome::Failure(AuditFailure::validation(
            &ValidationError::NoJsonObject,
            "nope",
        ));
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["raw_output"], "nope");
        assert!(failure.report().is_none());
        assert!(failure.failure().is_some());
    }

    fn tier_strategy() -> impl Strategy<Value = RiskTier> {
        prop::sample::select(RiskTier::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn json_roundtrip_preserves_report(
            tier in tier_strategy(),
            actions in prop::collection::vec(".{0,40}", 0..=MAX_ACTIONS),
            card in ".{0,200}",
        ) {
            let report = AuditResult::new(tier, actions, card).unwrap();
            let json = serde_json::to_string(&report).unwrap();
            let back: AuditResult = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, report);
        }

        #[test]
        fn constructed_reports_respect_action_cap(
            actions in prop::collection::vec("[a-z]{1,8}", 0..20),
        ) {
            let len = actions.len();
            match AuditResult::new(RiskTier::Minimal, actions, "") {
                Ok(r) => prop_assert!(r.actions().len() <= MAX_ACTIONS),
                Err(ValidationError::TooManyActions { count }) => {
                    prop_assert!(len > MAX_ACTIONS);
                    prop_assert_eq!(count, len);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
