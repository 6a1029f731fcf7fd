/// Composition of the analysis-stage prompt.
use advisor_common::context::ContextStore;

use crate::model::Service;

/// Stands in for a user context that is missing, empty, or unreadable.
pub const CONTEXT_PLACEHOLDER: &str = "not provided";

/// Stands in for the service name when detection found nothing.
pub const UNKNOWN_SERVICE: &str = "UNKNOWN";

pub const REVIEW_CHECKLIST: &str = "\
Focus your review on the following points:
1. Security recommendations
2. Which IAM permissions, roles, or users this command uses, and whether they are granted appropriately
3. Operational cautions
4. Potential infrastructure or architecture issues, especially ones that are hard to see from the console
5. Recommendations that balance security and functionality against the effort required";

/// Build the analysis prompt, reading the user context from `context`.
pub async fn augment(
    context: &dyn ContextStore,
    raw_body: &str,
    service: Option<Service>,
    guideline: &str,
) -> String {
    let user_context = context.get().await;
    let service_name = service
        .map(|s| s.display_name())
        .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
    compose_prompt(user_context.as_deref(), raw_body, &service_name, guideline)
}

/// Sections appear in fixed order: user context, framing, body, instruction, guideline,
/// checklist. Body and guideline are embedded verbatim.
pub fn compose_prompt(
    user_context: Option<&str>,
    raw_body: &str,
    service_name: &str,
    guideline: &str,
) -> String {
    let user_context = user_context
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(CONTEXT_PLACEHOLDER);

    format!(
        "User context: {user_context}\n\n\
The following is an HTTP request made against the AWS {service_name} service:\n\n\
{raw_body}\n\n\
Using the guideline below, work out what activity this HTTP request performs and analyse the \
recommendations, cautions, and potential problems that apply if it is carried out:\n\n\
{guideline}\n\n\
{REVIEW_CHECKLIST}\n"
    )
}
