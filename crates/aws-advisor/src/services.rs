/// AWS service detection and per-service guideline documents.
///
/// Detection is a case-insensitive substring search over a fixed alias list. The list order
/// is the tie-break: the first alias found in the text wins, so "ec2" beats "iam" in
/// "ec2 iam role". Substring search can hit inside unrelated words ("logs" in "catalogs");
/// that is accepted.
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::Service;

pub const SERVICES: &[Service] = &[
    Service { alias: "ec2", guideline_file: "ec2.md" },
    Service { alias: "eventbridge", guideline_file: "eventbridge.md" },
    Service { alias: "events", guideline_file: "eventbridge.md" },
    Service { alias: "cloudwatch", guideline_file: "cloudwatch.md" },
    Service { alias: "logs", guideline_file: "cloudwatch.md" },
    Service { alias: "lambda", guideline_file: "lambda.md" },
    Service { alias: "ecs", guideline_file: "ecs.md" },
    Service { alias: "cloudtrail", guideline_file: "cloudtrail.md" },
    Service { alias: "iam", guideline_file: "iam.md" },
];

/// First known service whose alias occurs in `text`.
pub fn detect(text: &str) -> Option<Service> {
    let lower = text.to_lowercase();
    SERVICES.iter().copied().find(|s| lower.contains(s.alias))
}

pub fn lookup(alias: &str) -> Option<Service> {
    SERVICES.iter().copied().find(|s| s.alias == alias)
}

pub fn aliases() -> impl Iterator<Item = &'static str> {
    SERVICES.iter().map(|s| s.alias)
}

/// Reads guideline documents from a directory. A missing guideline never blocks a request:
/// every failure reads as the empty string.
#[derive(Debug, Clone)]
pub struct GuidelineStore {
    dir: PathBuf,
}

impl GuidelineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self, alias: &str) -> String {
        let Some(service) = lookup(alias) else {
            return String::new();
        };
        let path = self.dir.join(service.guideline_file);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no guideline for service");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to read guideline");
                String::new()
            }
        }
    }
}
