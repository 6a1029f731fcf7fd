/// CloudTrail lookups for recently failed API calls.
///
/// One `LookupEvents` page over the requested window, filtered down to events whose embedded
/// CloudTrail record carries an error. Each failure links to its event in the console.
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_cloudtrail as cloudtrail_sdk;
use aws_sdk_cloudtrail::error::DisplayErrorContext;
use aws_sdk_cloudtrail::primitives::DateTime as SdkDateTime;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::error::AppError;
use crate::model::{FailedEvent, FailureReport};

/// The parts of a CloudTrail event this service looks at.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub event_id: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    /// The event's full CloudTrail JSON record, as returned by the API.
    pub cloud_trail_event: Option<String>,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn lookup(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<RawEvent>, AppError>;
}

/// `EventSource` backed by the AWS SDK, using the default credential chain.
pub struct CloudTrailSource {
    client: cloudtrail_sdk::Client,
}

impl CloudTrailSource {
    pub async fn for_region(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: cloudtrail_sdk::Client::new(&config),
        }
    }
}

#[async_trait]
impl EventSource for CloudTrailSource {
    async fn lookup(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<RawEvent>, AppError> {
        let response = self
            .client
            .lookup_events()
            .start_time(SdkDateTime::from_millis(start.timestamp_millis()))
            .end_time(SdkDateTime::from_millis(end.timestamp_millis()))
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| AppError::CloudTrail(DisplayErrorContext(&e).to_string()))?;

        Ok(response
            .events()
            .iter()
            .map(|event| RawEvent {
                event_id: event.event_id().map(str::to_string),
                event_time: event
                    .event_time()
                    .and_then(|t| t.to_millis().ok())
                    .and_then(DateTime::<Utc>::from_timestamp_millis),
                cloud_trail_event: event.cloud_trail_event().map(str::to_string),
            })
            .collect())
    }
}

/// CloudTrail keeps 90 days of management events for `LookupEvents`.
pub const MAX_LOOKBACK_HOURS: i64 = 90 * 24;

pub struct FailureLookup {
    source: Arc<dyn EventSource>,
    region: String,
    max_results: i32,
}

impl FailureLookup {
    pub fn new(source: Arc<dyn EventSource>, region: impl Into<String>, max_results: i32) -> Self {
        Self {
            source,
            region: region.into(),
            max_results,
        }
    }

    /// Failed events from the last `hours` hours.
    pub async fn failures(&self, hours: i64) -> Result<FailureReport, AppError> {
        if !(1..=MAX_LOOKBACK_HOURS).contains(&hours) {
            return Err(AppError::InvalidInput(format!(
                "hours must be between 1 and {MAX_LOOKBACK_HOURS}"
            )));
        }
        let end = Utc::now();
        let start = end - Duration::hours(hours);
        let events = self.source.lookup(start, end, self.max_results).await?;
        let report = collect_failures(events, &self.region);
        info!(hours, failed = report.count, "cloudtrail failures looked up");
        Ok(report)
    }
}

pub fn collect_failures(events: Vec<RawEvent>, region: &str) -> FailureReport {
    let events: Vec<FailedEvent> = events
        .into_iter()
        .filter_map(|event| to_failure(event, region))
        .collect();
    FailureReport {
        count: events.len(),
        events,
    }
}

/// An event failed if its record has `errorCode`/`errorMessage` or mentions `AccessDenied`.
fn to_failure(event: RawEvent, region: &str) -> Option<FailedEvent> {
    let raw = event.cloud_trail_event.as_deref().unwrap_or_default();
    let record: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    let field = |name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);

    let error_code = field("errorCode");
    let error_message = field("errorMessage");
    if error_code.is_none() && error_message.is_none() && !raw.contains("AccessDenied") {
        return None;
    }

    Some(FailedEvent {
        error_code,
        error_message,
        event_time: event.event_time.map(|t| t.to_rfc3339()),
        url: event.event_id.map(|id| console_url(region, &id)),
    })
}

pub fn console_url(region: &str, event_id: &str) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/cloudtrailv2/home?region={region}#/events/{event_id}"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Returns canned events and remembers the requested window.
    #[derive(Default)]
    pub(crate) struct StaticEvents {
        pub events: Vec<RawEvent>,
        pub windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>, i32)>>,
    }

    #[async_trait]
    impl EventSource for StaticEvents {
        async fn lookup(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            max_results: i32,
        ) -> Result<Vec<RawEvent>, AppError> {
            self.windows.lock().unwrap().push((start, end, max_results));
            Ok(self.events.clone())
        }
    }

    pub(crate) fn event(id: Option<&str>, record: &str) -> RawEvent {
        RawEvent {
            event_id: id.map(str::to_string),
            event_time: DateTime::<Utc>::from_timestamp(1_700_000_000, 0),
            cloud_trail_event: Some(record.to_string()),
        }
    }

    #[test]
    fn keeps_only_error_bearing_events() {
        let events = vec![
            event(Some("ok-1"), r#"{"eventName":"DescribeInstances"}"#),
            event(
                Some("err-1"),
                r#"{"eventName":"RunInstances","errorCode":"UnauthorizedOperation","errorMessage":"not authorized"}"#,
            ),
            event(Some("err-2"), r#"{"eventName":"GetObject","errorMessage":"slow down"}"#),
            event(None, r#"{"eventName":"AssumeRole","responseElements":"AccessDenied"}"#),
        ];
        let report = collect_failures(events, "us-east-1");
        assert_eq!(report.count, 3);

        let first = &report.events[0];
        assert_eq!(first.error_code.as_deref(), Some("UnauthorizedOperation"));
        assert_eq!(first.error_message.as_deref(), Some("not authorized"));
        assert_eq!(first.event_time.as_deref(), Some("2023-11-14T22:13:20+00:00"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://us-east-1.console.aws.amazon.com/cloudtrailv2/home?region=us-east-1#/events/err-1")
        );

        assert_eq!(report.events[1].error_code, None);
        assert_eq!(report.events[2].url, None);
    }

    #[test]
    fn unparsable_record_without_errors_is_skipped() {
        let report = collect_failures(vec![event(Some("x"), "not json")], "eu-west-1");
        assert_eq!(report.count, 0);
    }

    #[test]
    fn report_serializes_with_console_field_names() {
        let report = collect_failures(
            vec![event(Some("e"), r#"{"errorCode":"AccessDenied"}"#)],
            "eu-west-1",
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["events"][0]["ErrorCode"], "AccessDenied");
        assert!(json["events"][0]["ErrorMessage"].is_null());
        assert!(json["events"][0]["URL"]
            .as_str()
            .unwrap()
            .starts_with("https://eu-west-1.console.aws.amazon.com/"));
    }

    #[tokio::test]
    async fn lookup_window_spans_requested_hours() {
        let source = Arc::new(StaticEvents::default());
        let lookup = FailureLookup::new(source.clone(), "us-east-1", 50);

        let report = lookup.failures(3).await.unwrap();
        assert_eq!(report.count, 0);

        let windows = source.windows.lock().unwrap();
        let (start, end, max) = windows[0];
        assert_eq!(end - start, Duration::hours(3));
        assert_eq!(max, 50);
    }

    #[tokio::test]
    async fn non_positive_hours_are_rejected() {
        let lookup = FailureLookup::new(Arc::new(StaticEvents::default()), "us-east-1", 50);
        assert!(matches!(
            lookup.failures(0).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn hours_beyond_retention_are_rejected() {
        let source = Arc::new(StaticEvents::default());
        let lookup = FailureLookup::new(source.clone(), "us-east-1", 50);
        for hours in [MAX_LOOKBACK_HOURS + 1, 100_000_000_000, i64::MAX] {
            assert!(
                matches!(lookup.failures(hours).await, Err(AppError::InvalidInput(_))),
                "hours={hours} should be rejected"
            );
        }
        assert!(source.windows.lock().unwrap().is_empty());

        lookup.failures(MAX_LOOKBACK_HOURS).await.unwrap();
        let windows = source.windows.lock().unwrap();
        let (start, end, _) = windows[0];
        assert_eq!(end - start, Duration::hours(MAX_LOOKBACK_HOURS));
    }
}
