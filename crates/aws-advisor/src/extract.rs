/// Parser for delimiter-marked sections in assistant replies.
///
/// The assistant personas are instructed to wrap parts of their reply in marker pairs:
/// - `&&&TOKEN&&&`: classification (READ / WRITE / EXECUTE), stage one only
/// - `%%%...%%%`: recommendation
/// - `@@@...@@@`: summary
/// - `+++...+++`: detail ("value")
/// - `^^^...^^^`: action
///
/// Each pair is matched independently, non-greedily, across lines; only the first match of a
/// pair counts. Matches are cleaned of ANSI escapes and line breaks, then trimmed. Any change to
/// how the personas format their output is a breaking change for this parser.
use regex::Regex;
use serde_json::{Map, Value};

use crate::model::{Analysis, AnalysisReport, Classification, ExtractedSections, SectionLabel};

/// Reported when an analysis reply carries none of the expected sections.
pub const FORMAT_ERROR_SENTINEL: &str = "Generated Response from AmazonQ Format Error";

pub struct ResponseExtractor {
    classification: Regex,
    sections: Vec<(SectionLabel, Regex)>,
    ansi: Regex,
    line_breaks: Regex,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseExtractor {
    pub fn new() -> Self {
        let sections = SectionLabel::ALL
            .into_iter()
            .map(|label| (label, delimited(label.delimiter())))
            .collect();
        Self {
            classification: delimited("&&&"),
            sections,
            ansi: Regex::new(r"\x1B(?:[@-Z\x5C-_]|\[[0-?]*[ -/]*[@-~])").expect("valid regex"),
            line_breaks: Regex::new(r"[\r\n]+").expect("valid regex"),
        }
    }

    /// Classification token of a stage-one reply, if the reply carries one.
    pub fn classify(&self, stdout: &str) -> Option<Classification> {
        self.classification
            .captures(stdout)
            .map(|caps| Classification::from_token(&self.clean(&caps[1])))
    }

    pub fn extract(&self, stdout: &str) -> Analysis {
        let mut sections = ExtractedSections::default();
        for (label, re) in &self.sections {
            if let Some(caps) = re.captures(stdout) {
                let text = self.clean(&caps[1]);
                if !text.is_empty() {
                    sections.set(*label, text);
                }
            }
        }
        if sections.is_empty() {
            Analysis::FormatMismatch
        } else {
            Analysis::Sections(sections)
        }
    }

    /// Strip ANSI escape sequences, fold each run of line breaks into one space, trim.
    pub fn clean(&self, text: &str) -> String {
        let without_ansi = self.ansi.replace_all(text, "");
        self.line_breaks
            .replace_all(&without_ansi, " ")
            .trim()
            .to_string()
    }
}

/// `(?s)DELIM(.*?)DELIM`: non-greedy so the span stops at the first closing marker, which
/// keeps lone marker characters (a `+` in "a+b") inside the section.
fn delimited(delimiter: &str) -> Regex {
    let d = regex::escape(delimiter);
    Regex::new(&format!("(?s){d}(.*?){d}")).expect("valid regex")
}

/// `label: text` lines separated by blank lines, headed by the service when one was detected.
pub fn render_text(report: &AnalysisReport) -> String {
    let body = match &report.analysis {
        Analysis::Sections(sections) => sections
            .iter()
            .map(|(label, text)| format!("{}: {text}", label.wire_name()))
            .collect::<Vec<_>>()
            .join("\n\n"),
        Analysis::FormatMismatch => FORMAT_ERROR_SENTINEL.to_string(),
    };
    match report.service {
        Some(service) => format!("[AWS {} Service Analysis]\n\n{body}", service.display_name()),
        None => body,
    }
}

pub fn render_json(report: &AnalysisReport) -> Value {
    let mut map = Map::new();
    match &report.analysis {
        Analysis::Sections(sections) => {
            for (label, text) in sections.iter() {
                map.insert(label.wire_name().to_string(), Value::from(text));
            }
        }
        Analysis::FormatMismatch => {
            map.insert("error".to_string(), Value::from(FORMAT_ERROR_SENTINEL));
        }
    }
    if let Some(service) = report.service {
        map.insert("service".to_string(), Value::from(service.display_name()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services;

    const FULL_REPLY: &str = "\
Thinking...
%%%Enforce IMDSv2 on the instance%%%
some chatter
@@@Stops instance i-1234@@@
+++Downtime for the attached workload+++
^^^STOP^^^
";

    fn sections(analysis: Analysis) -> ExtractedSections {
        match analysis {
            Analysis::Sections(s) => s,
            Analysis::FormatMismatch => panic!("expected sections"),
        }
    }

    #[test]
    fn extracts_all_four_sections() {
        let s = sections(ResponseExtractor::new().extract(FULL_REPLY));
        assert_eq!(s.recommendation.as_deref(), Some("Enforce IMDSv2 on the instance"));
        assert_eq!(s.summary.as_deref(), Some("Stops instance i-1234"));
        assert_eq!(s.detail.as_deref(), Some("Downtime for the attached workload"));
        assert_eq!(s.action.as_deref(), Some("STOP"));
    }

    #[test]
    fn section_order_in_reply_does_not_matter() {
        let shuffled = "^^^STOP^^^ +++Downtime for the attached workload+++ \
@@@Stops instance i-1234@@@ %%%Enforce IMDSv2 on the instance%%%";
        let extractor = ResponseExtractor::new();
        assert_eq!(extractor.extract(shuffled), extractor.extract(FULL_REPLY));
    }

    #[test]
    fn sections_are_independent() {
        let s = sections(ResponseExtractor::new().extract("@@@only a summary@@@"));
        assert_eq!(s.summary.as_deref(), Some("only a summary"));
        assert_eq!(s.recommendation, None);
        assert_eq!(s.detail, None);
        assert_eq!(s.action, None);
    }

    #[test]
    fn detail_keeps_single_plus_characters() {
        let s = sections(ResponseExtractor::new().extract("+++cost = a+b, C++ SDK+++ tail +++"));
        assert_eq!(s.detail.as_deref(), Some("cost = a+b, C++ SDK"));
    }

    #[test]
    fn matching_is_non_greedy() {
        let s = sections(ResponseExtractor::new().extract("%%%first%%% and %%%second%%%"));
        assert_eq!(s.recommendation.as_deref(), Some("first"));
    }

    #[test]
    fn ansi_codes_and_line_breaks_are_cleaned() {
        let reply = "%%%\x1b[1m\x1b[32mRotate\r\n\r\nkeys\x1b[0m\nnow %%%";
        let s = sections(ResponseExtractor::new().extract(reply));
        assert_eq!(s.recommendation.as_deref(), Some("Rotate keys now"));
    }

    #[test]
    fn no_sections_is_a_format_mismatch() {
        let extractor = ResponseExtractor::new();
        assert_eq!(extractor.extract("I could not analyse that."), Analysis::FormatMismatch);
        assert_eq!(extractor.extract(""), Analysis::FormatMismatch);
        // An unterminated pair is not a section.
        assert_eq!(extractor.extract("%%%dangling"), Analysis::FormatMismatch);
        // Neither is one that is blank after cleaning.
        assert_eq!(extractor.extract("@@@ \x1b[0m\n@@@"), Analysis::FormatMismatch);
    }

    #[test]
    fn classification_token_is_read() {
        let extractor = ResponseExtractor::new();
        assert_eq!(
            extractor.classify("The call is\n&&& read \n&&&\n"),
            Some(Classification::Read)
        );
        assert_eq!(
            extractor.classify("\x1b[33m&&&WRITE&&&\x1b[0m"),
            Some(Classification::Write)
        );
        assert_eq!(extractor.classify("no verdict here"), None);
    }

    #[test]
    fn text_report_has_labels_in_order_and_service_header() {
        let report = AnalysisReport {
            service: services::detect("ec2"),
            analysis: ResponseExtractor::new().extract(FULL_REPLY),
        };
        assert_eq!(
            render_text(&report),
            "[AWS EC2 Service Analysis]\n\n\
recommendation: Enforce IMDSv2 on the instance\n\n\
summary: Stops instance i-1234\n\n\
value: Downtime for the attached workload\n\n\
action: STOP"
        );
    }

    #[test]
    fn text_report_for_format_mismatch() {
        let report = AnalysisReport {
            service: None,
            analysis: Analysis::FormatMismatch,
        };
        assert_eq!(render_text(&report), FORMAT_ERROR_SENTINEL);
    }

    #[test]
    fn json_report_omits_absent_sections() {
        let report = AnalysisReport {
            service: services::detect("iam"),
            analysis: ResponseExtractor::new().extract("@@@Creates a user@@@"),
        };
        assert_eq!(
            render_json(&report),
            serde_json::json!({ "summary": "Creates a user", "service": "IAM" })
        );

        let mismatch = AnalysisReport {
            service: None,
            analysis: Analysis::FormatMismatch,
        };
        assert_eq!(
            render_json(&mismatch),
            serde_json::json!({ "error": FORMAT_ERROR_SENTINEL })
        );
    }
}
