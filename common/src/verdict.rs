use serde::{Deserialize, Serialize};

/// Overall outcome reported by the compliance API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    ManualReview,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
            ComplianceStatus::ManualReview => "MANUAL_REVIEW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    Found,
    Missing,
}

/// One mandatory label field and whether the server found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFinding {
    pub field: String,
    pub status: FieldStatus,
    #[serde(default)]
    pub detected_text: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// Verdict returned for one submitted still.
///
/// Only the fields the client acts on are modelled; anything else in the
/// response body is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub compliance_status: ComplianceStatus,
    pub confidence_score: f64,
    #[serde(default)]
    pub compliance_results: Vec<FieldFinding>,
    /// Sensitive-data categories detected (and masked) on the label.
    #[serde(default)]
    pub pii_detected: Option<Vec<String>>,
    #[serde(default)]
    pub tamper_alert: bool,
    #[serde(default)]
    pub tamper_score: f64,
    #[serde(default)]
    pub tamper_reason: String,
    #[serde(default)]
    pub extracted_text: String,
    pub processing_time_ms: f64,
}

impl ComplianceVerdict {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn is_compliant(&self) -> bool {
        self.compliance_status == ComplianceStatus::Compliant
    }

    /// Names of the fields the server could not find.
    pub fn missing_fields(&self) -> Vec<&str> {
        self.compliance_results
            .iter()
            .filter(|f| f.status == FieldStatus::Missing)
            .map(|f| f.field.as_str())
            .collect()
    }

    pub fn pii_categories(&self) -> &[String] {
        self.pii_detected.as_deref().unwrap_or(&[])
    }
}
