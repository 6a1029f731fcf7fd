mod augment;
mod cloudtrail;
mod config;
mod error;
mod extract;
mod model;
mod pipeline;
mod server;
mod services;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use advisor_common::assistant::CliAssistant;
use advisor_common::context::FileContextStore;

use cloudtrail::{CloudTrailSource, FailureLookup};
use config::Config;
use pipeline::Advisor;
use server::AppState;
use services::GuidelineStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting aws-advisor");

    let config = Config::from_env()?;
    info!(
        bind = %config.bind,
        guidelines_dir = %config.guidelines_dir.display(),
        user_context = %config.user_context_path.display(),
        assistant = %config.assistant.program,
        stderr_fatal = config.stderr_fatal,
        "configuration loaded"
    );

    let guidelines = GuidelineStore::new(&config.guidelines_dir);
    if !tokio::fs::try_exists(guidelines.dir()).await.unwrap_or(false) {
        warn!(
            dir = %guidelines.dir().display(),
            "guidelines directory missing, prompts will carry no guideline"
        );
    }

    let advisor = Advisor::new(
        Arc::new(CliAssistant::new(config.assistant.clone())),
        Arc::new(FileContextStore::new(&config.user_context_path)),
        guidelines,
        config.personas.clone(),
        config.timeouts.clone(),
        config.stderr_fatal,
    );

    let source = CloudTrailSource::for_region(&config.cloudtrail_region).await;
    let cloudtrail = FailureLookup::new(
        Arc::new(source),
        config.cloudtrail_region.clone(),
        config.cloudtrail_max_results,
    );

    let app = server::router(AppState {
        advisor: Arc::new(advisor),
        cloudtrail: Arc::new(cloudtrail),
    });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "HTTP server ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .inspect_err(|e| error!(error = %e, "HTTP server error"))?;

    info!("HTTP server shut down");
    Ok(())
}
