use serde::Serialize;

/// A known AWS service alias and the guideline document it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    /// Lowercase keyword searched for in request text, e.g. "ec2", "logs"
    pub alias: &'static str,
    /// Guideline file name inside the guidelines directory, e.g. "cloudwatch.md"
    pub guideline_file: &'static str,
}

impl Service {
    /// Uppercased alias, as shown in prompts and report headers.
    pub fn display_name(&self) -> String {
        self.alias.to_uppercase()
    }
}

/// Verdict of the classification stage, read from the `&&&...&&&` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Read,
    Write,
    Execute,
    /// Any token the classifier produced that is not one of the three above.
    Other(String),
}

impl Classification {
    /// Normalize a raw token (trim + uppercase).
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            "READ" => Classification::Read,
            "WRITE" => Classification::Write,
            "EXECUTE" => Classification::Execute,
            other => Classification::Other(other.to_string()),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Classification::Read)
    }
}

/// The labeled sections an analysis reply may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    Recommendation,
    Summary,
    Detail,
    Action,
}

impl SectionLabel {
    /// Output order of the assembled reply.
    pub const ALL: [SectionLabel; 4] = [
        SectionLabel::Recommendation,
        SectionLabel::Summary,
        SectionLabel::Detail,
        SectionLabel::Action,
    ];

    pub fn delimiter(self) -> &'static str {
        match self {
            SectionLabel::Recommendation => "%%%",
            SectionLabel::Summary => "@@@",
            SectionLabel::Detail => "+++",
            SectionLabel::Action => "^^^",
        }
    }

    /// Label used in text and JSON replies.
    pub fn wire_name(self) -> &'static str {
        match self {
            SectionLabel::Recommendation => "recommendation",
            SectionLabel::Summary => "summary",
            SectionLabel::Detail => "value",
            SectionLabel::Action => "action",
        }
    }
}

/// Sections found in one analysis reply. A field is `Some` only if its delimiter pair matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSections {
    pub recommendation: Option<String>,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub action: Option<String>,
}

impl ExtractedSections {
    pub fn get(&self, label: SectionLabel) -> Option<&str> {
        match label {
            SectionLabel::Recommendation => self.recommendation.as_deref(),
            SectionLabel::Summary => self.summary.as_deref(),
            SectionLabel::Detail => self.detail.as_deref(),
            SectionLabel::Action => self.action.as_deref(),
        }
    }

    pub fn set(&mut self, label: SectionLabel, text: String) {
        let slot = match label {
            SectionLabel::Recommendation => &mut self.recommendation,
            SectionLabel::Summary => &mut self.summary,
            SectionLabel::Detail => &mut self.detail,
            SectionLabel::Action => &mut self.action,
        };
        *slot = Some(text);
    }

    /// Present sections in output order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionLabel, &str)> + '_ {
        SectionLabel::ALL
            .into_iter()
            .filter_map(move |label| self.get(label).map(|text| (label, text)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Result of scanning an analysis reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Sections(ExtractedSections),
    /// The assistant replied, but with none of the expected delimiter pairs.
    FormatMismatch,
}

/// An analysis together with the service it was run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub service: Option<Service>,
    pub analysis: Analysis,
}

/// What `/api/ask` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    /// Classified as read-only; no analysis was run.
    ReadOnly,
    Report(AnalysisReport),
}

/// A CloudTrail event that carried an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedEvent {
    #[serde(rename = "ErrorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "ErrorMessage")]
    pub error_message: Option<String>,
    /// RFC 3339 timestamp
    #[serde(rename = "EventTime")]
    pub event_time: Option<String>,
    /// Console deep link to the event
    #[serde(rename = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureReport {
    pub count: usize,
    pub events: Vec<FailedEvent>,
}
