mod basic_ext;

use crate::observability::metrics::{histograms, labels};
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use reqwest_retry::policies::{ExponentialBackoff, ExponentialBackoffTimed};
use reqwest_retry::RetryTransientMiddleware;
use std::time::{Duration, Instant};

pub(crate) mod prelude {
    pub(crate) use super::basic_ext::{RequestBuilderBasicExt as _, ResponseBasicExt as _};
}

labels! {
    HttpResponseLabels { version, method, host, status }
}

histograms! {
    /// Duration of a single real http request. If there were retries, then these
    /// will appear as as separate observations.
    http_request_duration_seconds;

    /// Same as `http_request_duration_seconds` but covers the time it took to
    /// do retries of the request.
    http_request_effective_duration_seconds;
}

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

pub(crate) fn default_retry_policy() -> ExponentialBackoffTimed {
    // Retry exponentially increasing intervals between attempts.
    ExponentialBackoff::builder()
        .base(2)
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
        .build_with_total_retry_duration(Duration::from_secs(10))
}

pub(crate) fn create_client() -> Result<Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        // The channel preview pages are served in a reduced form
        // to clients without a browser-like user agent
        .user_agent(concat!(
            "Mozilla/5.0 (compatible; MemecastTelegramBot/",
            env!("CARGO_PKG_VERSION"),
            ")",
        ))
        .build()
        .fatal_ctx(|| "Failed to create the HTTP client")?;

    let client = reqwest_middleware::ClientBuilder::new(client)
        .with(OutermostObservingMiddleware)
        .with(RetryTransientMiddleware::new_with_policy(
            default_retry_policy(),
        ))
        .with(InnermostObservingMiddleware)
        .build();

    Ok(client)
}

struct OutermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for OutermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut http::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            version = ?request.version(),
            method = %request.method(),
            url = %request.url(),
        );
        measure_request(
            http_request_effective_duration_seconds,
            request,
            extensions,
            next,
        )
        .instrument(span)
        .await
    }
}

struct InnermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for InnermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut http::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let (result, duration) =
            measure_request(http_request_duration_seconds, request, extensions, next)
                .with_duration()
                .await;

        let duration = tracing_duration(duration);

        let response = match &result {
            Ok(response) => response,
            Err(err) => {
                error!(duration, err = tracing_err(err), "Network request failed");
                return result;
            }
        };

        let status = response.status();

        let Err(err) = response.error_for_status_ref() else {
            debug!(duration, %status, "Network request succeeded");
            return result;
        };

        warn!(
            err = tracing_err(&err),
            duration,
            %status,
            "Network request failed (error status)"
        );

        result
    }
}

async fn measure_request(
    histogram: fn(HttpResponseLabels) -> metrics::Histogram,
    request: reqwest::Request,
    extensions: &mut http::Extensions,
    next: reqwest_middleware::Next<'_>,
) -> reqwest_middleware::Result<reqwest::Response> {
    let version = format!("{:?}", request.version());
    let method = request.method().to_string();
    let host = request.url().host_str().unwrap_or("{unknown}").to_owned();

    let start = Instant::now();
    let result = next.run(request, extensions).await;
    let elapsed = start.elapsed();

    let status = match &result {
        Ok(response) => response.status().to_string(),
        Err(_) => "{fatal}".to_owned(),
    };

    let labels = HttpResponseLabels {
        version,
        method,
        host,
        status,
    };

    histogram(labels).record(elapsed);

    result
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },

    #[error("HTTP request has failed (HTTP status code: {status}):\n{body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },
}
