//! Client for the external report-generation service.
//!
//! The service receives the full evaluation list and answers with per-move
//! classifications and accuracy figures. Nothing here interprets the report
//! beyond deserializing it.
//!
//! Two deployments speak slightly different dialects, see [`ReportEndpoint`].

use std::time::Duration;

use engine::Line;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::{EvaluatedPosition, MoveNotation};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Report request failed: {status} - {error}")]
    Rejected { status: u16, error: String },
    #[error("Malformed report: {0}")]
    Malformed(String),
}

/// Move quality as labelled by the reporting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Brilliant,
    Great,
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    Book,
    Forced,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPosition {
    #[serde(rename = "move", default)]
    pub mv: MoveNotation,
    #[serde(default)]
    pub fen: Option<String>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub opening: Option<String>,
    #[serde(rename = "topLines", default)]
    pub top_lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accuracies {
    pub white: f64,
    pub black: f64,
}

/// The reporting service's verdict on a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub positions: Vec<ClassifiedPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifications: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracies: Option<Accuracies>,
}

/// Which hop of the reporting service the client talks to.
#[derive(Clone)]
pub enum ReportEndpoint {
    /// The web app's `/api/report` route: a bare JSON array in,
    /// `{"report": {"results": ...}}` out. No credentials.
    Proxy,
    /// The reporting API itself: `{"positions": [...]}` in with an
    /// `x-api-secret` header, `{"results": ...}` out.
    Upstream { api_secret: String },
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    positions: &'a [EvaluatedPosition],
}

#[derive(Deserialize)]
struct ReportEnvelope {
    report: ReportBody,
}

#[derive(Deserialize)]
struct ReportBody {
    results: Report,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    details: Option<String>,
}

pub struct ReportClient {
    client: Client,
    url: String,
    endpoint: ReportEndpoint,
}

impl ReportClient {
    pub fn new(
        url: impl Into<String>,
        endpoint: ReportEndpoint,
        timeout: Duration,
    ) -> Result<Self, ReportError> {
        let client = Client::builder()
            .user_agent(concat!("chessreview/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            endpoint,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the evaluations and return the generated report.
    #[tracing::instrument(level = "info", skip_all, fields(url = %self.url, positions = evaluations.len()))]
    pub async fn submit(&self, evaluations: &[EvaluatedPosition]) -> Result<Report, ReportError> {
        let request = match &self.endpoint {
            ReportEndpoint::Proxy => self.client.post(&self.url).json(evaluations),
            ReportEndpoint::Upstream { api_secret } => self
                .client
                .post(&self.url)
                .header("x-api-secret", api_secret)
                .json(&UpstreamRequest {
                    positions: evaluations,
                }),
        };

        let resp = request.send().await.map_err(|e| {
            tracing::error!("Report request error: {e}");
            ReportError::Http(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(ErrorBody {
                    error: Some(error),
                    details: Some(details),
                }) => format!("{error} ({details})"),
                Ok(ErrorBody {
                    error: Some(error), ..
                }) => error,
                _ => text,
            };
            tracing::error!(status = status.as_u16(), "Report request rejected: {error}");
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                error,
            });
        }

        let text = resp.text().await?;
        let report = parse_report(&self.endpoint, &text)?;

        tracing::info!(classified = report.positions.len(), "Report received");
        Ok(report)
    }
}

fn parse_report(endpoint: &ReportEndpoint, text: &str) -> Result<Report, ReportError> {
    let parsed = match endpoint {
        ReportEndpoint::Proxy => {
            serde_json::from_str::<ReportEnvelope>(text).map(|envelope| envelope.report)
        }
        ReportEndpoint::Upstream { .. } => serde_json::from_str::<ReportBody>(text),
    };
    parsed
        .map(|body| body.results)
        .map_err(|e| ReportError::Malformed(e.to_string()))
}
