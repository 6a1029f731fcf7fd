use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use advisor_common::assistant::Invocation;

use crate::cloudtrail::FailureLookup;
use crate::error::AppError;
use crate::extract::{render_json, render_text};
use crate::model::AskOutcome;
use crate::pipeline::Advisor;

/// Body of `/profile-check` when no profile is stored.
pub const PROFILE_MISSING: &str = "Could not read file or no data";

#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<Advisor>,
    pub cloudtrail: Arc<FailureLookup>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index).post(chat))
        .route("/api/ask", get(ask).post(ask))
        .route("/prompt", post(prompt))
        .route("/profile-check", get(profile_check).post(profile_check))
        .route("/profile", post(set_profile))
        .route("/errors", post(report_error))
        .route("/api/detect-service", post(detect_service))
        .route("/cloudtrail/failures", get(cloudtrail_failures))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

fn pretty_json(body: &str) -> Result<String, AppError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    serde_json::to_string_pretty(&value).map_err(|e| AppError::InvalidInput(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileBody {
    #[serde(default)]
    profile: String,
}

#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(rename = "securityMode")]
    security_mode: Option<String>,
    query: Option<String>,
    format: Option<String>,
}

/// POST bodies are analysed as sent (JSON re-indented); GET analyses `Query: <query>`.
async fn ask(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<AskParams>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let security_mode = params
        .security_mode
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let wants_json = params
        .format
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let raw_body = if method == Method::POST {
        if is_json(&headers) {
            pretty_json(&body)?
        } else {
            body
        }
    } else {
        match params.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => format!("Query: {query}"),
            _ => return Err(AppError::MissingInput("No body provided")),
        }
    };
    info!(
        %method,
        security_mode,
        body_len = raw_body.len(),
        "analysis requested"
    );

    let response = match state.advisor.ask(&raw_body, security_mode).await? {
        AskOutcome::ReadOnly => StatusCode::NO_CONTENT.into_response(),
        AskOutcome::Report(report) if wants_json => Json(render_json(&report)).into_response(),
        AskOutcome::Report(report) => render_text(&report).into_response(),
    };
    Ok(response)
}

/// The query comes from a JSON `{"query"}`, a form field, or the raw body.
async fn prompt(State(state): State<AppState>, req: Request) -> Result<String, AppError> {
    let query = if is_json(req.headers()) {
        let Json(body) = Json::<QueryBody>::from_request(req, &())
            .await
            .map_err(|e| AppError::InvalidInput(e.body_text()))?;
        body.query
    } else if is_form(req.headers()) {
        let Form(body) = Form::<QueryBody>::from_request(req, &())
            .await
            .map_err(|e| AppError::InvalidInput(e.body_text()))?;
        body.query
    } else {
        String::from_request(req, &())
            .await
            .map_err(|e| AppError::InvalidInput(e.body_text()))?
    };
    state.advisor.prompt(&query).await
}

async fn profile_check(State(state): State<AppState>) -> String {
    state
        .advisor
        .context()
        .get()
        .await
        .map(|profile| profile.trim().to_string())
        .filter(|profile| !profile.is_empty())
        .unwrap_or_else(|| PROFILE_MISSING.to_string())
}

async fn set_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<String, AppError> {
    let profile = if is_json(&headers) {
        serde_json::from_str::<Option<ProfileBody>>(&body)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?
            .unwrap_or_default()
            .profile
    } else {
        body
    };
    state.advisor.context().set(&profile).await?;
    info!(profile_len = profile.len(), "user context replaced");
    Ok(format!("Profile updated: {profile}"))
}

/// Client-side error reports; logged and acknowledged.
async fn report_error(headers: HeaderMap, body: String) -> &'static str {
    let body = if is_json(&headers) {
        pretty_json(&body).unwrap_or(body)
    } else {
        body
    };
    warn!(report = %body, "client reported an error");
    "OK"
}

async fn detect_service(
    State(state): State<AppState>,
    body: String,
) -> Result<String, AppError> {
    let query = serde_json::from_str::<Option<QueryBody>>(&body)
        .ok()
        .flatten()
        .unwrap_or_default()
        .query;
    if query.is_empty() {
        return Err(AppError::MissingInput("No query provided"));
    }
    Ok(state.advisor.detect_report(&query).await)
}

#[derive(Debug, Deserialize)]
struct FailureParams {
    hours: Option<i64>,
}

async fn cloudtrail_failures(
    State(state): State<AppState>,
    params: Result<Query<FailureParams>, QueryRejection>,
) -> Response {
    let hours = match params {
        Ok(Query(params)) => params.hours.unwrap_or(1),
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };
    match state.cloudtrail.failures(hours).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!(error = %e, "cloudtrail lookup failed");
            (e.status(), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Amazon Q Chat</title></head>
<body style="font-family: Arial; margin: 20px;">
    <h2>Amazon Q Chat Interface</h2>
    <form method="post">
        <textarea name="query" placeholder="Enter your question for Amazon Q"
                  rows="5" cols="80" style="width: 100%; padding: 10px;"></textarea><br><br>
        <input type="submit" value="Ask Amazon Q" style="padding: 10px 20px;">
    </form>
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

#[derive(Debug, Default, Deserialize)]
struct ChatForm {
    #[serde(default)]
    query: String,
}

async fn chat(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Html<String> {
    match state.advisor.chat(&form.query).await {
        Ok(invocation) => Html(chat_page(&form.query, &invocation)),
        Err(AppError::MissingInput(_)) => Html("<p>No query provided</p>".to_string()),
        Err(e) if e.is_timeout() => Html("<p>Request timed out</p>".to_string()),
        Err(e) => Html(format!("<p>Error: {}</p>", escape_html(&e.to_string()))),
    }
}

fn chat_page(query: &str, invocation: &Invocation) -> String {
    let response = escape_html(&invocation.stdout).replace('\n', "<br>");
    let error = if invocation.stderr.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div style="background: #ffe6e6; padding: 15px; border-radius: 5px; margin: 10px 0;"><strong>Error:</strong><br>{}</div>"#,
            escape_html(&invocation.stderr).replace('\n', "<br>")
        )
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Amazon Q Response</title></head>
<body style="font-family: Arial; margin: 20px;">
    <h2>Amazon Q Response</h2>
    <div style="background: #f5f5f5; padding: 15px; border-radius: 5px; margin: 10px 0;">
        <strong>Query:</strong> {query}
    </div>
    <div style="background: #e8f4fd; padding: 15px; border-radius: 5px; margin: 10px 0;">
        <strong>Response:</strong><br>{response}
    </div>
    {error}
    <a href="/" style="display: inline-block; margin-top: 20px; padding: 10px 20px; background: #007cba; color: white; text-decoration: none; border-radius: 5px;">Ask Another Question</a>
</body>
</html>
"#,
        query = escape_html(query),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
