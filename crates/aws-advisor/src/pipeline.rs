/// The request pipeline behind `/api/ask` and the direct prompt routes.
///
/// `/api/ask` runs at most two assistant invocations, in sequence:
/// 1. classify the raw body with the classification persona; a READ verdict ends the request
/// 2. detect the service, load its guideline, build the augmented prompt, and run the
///    analysis persona on it; then extract the delimited sections
///
/// Every invocation is attempted once. A timeout or (by default) any stderr output fails the
/// whole request.
use std::sync::Arc;
use std::time::Duration;

use advisor_common::assistant::{Assistant, Invocation};
use advisor_common::context::ContextStore;
use tracing::{debug, info, warn};

use crate::augment;
use crate::error::AppError;
use crate::extract::ResponseExtractor;
use crate::model::{Analysis, AnalysisReport, AskOutcome};
use crate::services::{self, GuidelineStore};

/// Agent names passed to the assistant at each call site.
#[derive(Debug, Clone)]
pub struct Personas {
    pub classify: String,
    pub security_on: String,
    pub security_off: String,
    pub prompt: String,
}

impl Default for Personas {
    fn default() -> Self {
        Self {
            classify: "checkAction".to_string(),
            security_on: "Security-on-dev".to_string(),
            security_off: "Security-off-dev".to_string(),
            prompt: "promptChatbot".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub classify: Duration,
    pub analysis: Duration,
    pub prompt: Duration,
    pub chat: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            classify: Duration::from_secs(120),
            analysis: Duration::from_secs(120),
            prompt: Duration::from_secs(120),
            chat: Duration::from_secs(30),
        }
    }
}

pub struct Advisor {
    assistant: Arc<dyn Assistant>,
    context: Arc<dyn ContextStore>,
    guidelines: GuidelineStore,
    extractor: ResponseExtractor,
    personas: Personas,
    timeouts: Timeouts,
    stderr_fatal: bool,
}

impl Advisor {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        context: Arc<dyn ContextStore>,
        guidelines: GuidelineStore,
        personas: Personas,
        timeouts: Timeouts,
        stderr_fatal: bool,
    ) -> Self {
        Self {
            assistant,
            context,
            guidelines,
            extractor: ResponseExtractor::new(),
            personas,
            timeouts,
            stderr_fatal,
        }
    }

    pub fn context(&self) -> &dyn ContextStore {
        self.context.as_ref()
    }

    async fn run(
        &self,
        stage: &'static str,
        prompt: &str,
        persona: Option<&str>,
        timeout: Duration,
    ) -> Result<Invocation, AppError> {
        let invocation = self
            .assistant
            .invoke(prompt, persona, timeout)
            .await
            .inspect_err(|e| warn!(stage, error = %e, "assistant invocation failed"))?;
        info!(
            stage,
            exit_code = ?invocation.exit_code,
            stdout_len = invocation.stdout.len(),
            stderr_len = invocation.stderr.len(),
            "assistant responded"
        );
        debug!(stage, stdout = %invocation.stdout, "assistant stdout");
        Ok(invocation.checked(self.stderr_fatal)?)
    }

    /// Classify, and unless the request is read-only, analyse it.
    pub async fn ask(&self, raw_body: &str, security_mode: bool) -> Result<AskOutcome, AppError> {
        if raw_body.trim().is_empty() {
            return Err(AppError::MissingInput("No body provided"));
        }

        let verdict = self
            .run(
                "classify",
                raw_body,
                Some(self.personas.classify.as_str()),
                self.timeouts.classify,
            )
            .await?;
        match self.extractor.classify(&verdict.stdout) {
            Some(c) if c.is_read() => {
                info!("classified as READ, skipping analysis");
                return Ok(AskOutcome::ReadOnly);
            }
            Some(c) => info!(classification = ?c, "classified, running analysis"),
            None => warn!("no classification token in reply, running analysis"),
        }

        let service = services::detect(raw_body);
        let guideline = match service {
            Some(s) => self.guidelines.load(s.alias).await,
            None => String::new(),
        };
        info!(
            service = service.map(|s| s.alias).unwrap_or("-"),
            guideline_len = guideline.len(),
            "building analysis prompt"
        );
        let prompt = augment::augment(self.context.as_ref(), raw_body, service, &guideline).await;

        let persona = if security_mode {
            &self.personas.security_on
        } else {
            &self.personas.security_off
        };
        let reply = self
            .run("analyse", &prompt, Some(persona.as_str()), self.timeouts.analysis)
            .await?;

        let analysis = self.extractor.extract(&reply.stdout);
        match &analysis {
            Analysis::Sections(s) => {
                info!(sections = s.iter().count(), "extracted analysis sections")
            }
            Analysis::FormatMismatch => warn!("analysis reply carried no delimited sections"),
        }
        Ok(AskOutcome::Report(AnalysisReport { service, analysis }))
    }

    /// Send `query` straight to the prompt persona and return its cleaned stdout.
    pub async fn prompt(&self, query: &str) -> Result<String, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::MissingInput("No query provided"));
        }
        let reply = self
            .run(
                "prompt",
                query,
                Some(self.personas.prompt.as_str()),
                self.timeouts.prompt,
            )
            .await?;
        Ok(self.extractor.clean(&reply.stdout))
    }

    /// Bare chat without a persona. Stderr is returned to the caller instead of failing.
    pub async fn chat(&self, query: &str) -> Result<Invocation, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::MissingInput("No query provided"));
        }
        Ok(self
            .assistant
            .invoke(query, None, self.timeouts.chat)
            .await?)
    }

    /// Human-readable detection report for `query`.
    pub async fn detect_report(&self, query: &str) -> String {
        let service = services::detect(query);
        let guideline_available = match service {
            Some(s) => !self.guidelines.load(s.alias).await.is_empty(),
            None => false,
        };
        format!(
            "Query: {query}\nDetected Service: {}\nGuideline Available: {}\nAvailable Services: {}",
            service.map(|s| s.alias).unwrap_or(augment::UNKNOWN_SERVICE),
            if guideline_available { "Yes" } else { "No" },
            services::aliases().collect::<Vec<_>>().join(", ")
        )
    }
}
