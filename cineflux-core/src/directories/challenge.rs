//! Anti-bot challenge solving proxy client and HTML unwrapping helpers.
//!
//! Some directories sit behind browser-challenge interstitials. Requests to
//! them are routed through a solver service that executes the challenge in a
//! headless browser and hands back the final response body, which may arrive
//! wrapped in HTML.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, SourceError};

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    status: u16,
    response: String,
}

/// Response from a challenge-proxied request.
#[derive(Debug, Clone)]
pub struct ChallengeResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ChallengeClient {
    http: reqwest::Client,
    endpoint: Url,
    max_timeout_ms: u64,
}

impl ChallengeClient {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            max_timeout_ms: 60_000,
        }
    }

    /// Fetches `url` through the solver. Solver-level failures (challenge
    /// unsolved, proxy down) map to [`SourceError::Challenge`].
    pub async fn get(&self, url: &str) -> Result<ChallengeResponse> {
        let request = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: self.max_timeout_ms,
        };
        let response: SolverResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if response.status != "ok" {
            warn!(url, status = %response.status, "challenge solver refused request");
            return Err(SourceError::Challenge(response.message));
        }
        let solution = response
            .solution
            .ok_or_else(|| SourceError::Challenge("solver returned no solution".into()))?;

        Ok(ChallengeResponse {
            status: solution.status,
            body: solution.response,
        })
    }
}

static PRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<pre[^>]*>(.*?)</pre>").unwrap());
static EMBEDDED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").unwrap());

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// Extracts a JSON payload from a possibly HTML-wrapped body.
///
/// Tries, in order: the body as-is, `<pre>` blocks, then the widest embedded
/// `{...}`/`[...]` match. Returns the input unchanged when nothing inside
/// parses as JSON.
pub fn unwrap_json_from_html(body: &str) -> String {
    if is_valid_json(body) {
        return body.to_owned();
    }

    for capture in PRE_RE.captures_iter(body) {
        let text = capture[1].trim();
        if (text.starts_with('{') || text.starts_with('[')) && is_valid_json(text) {
            debug!("extracted JSON payload from <pre> block");
            return text.to_owned();
        }
    }

    if let Some(capture) = EMBEDDED_JSON_RE.captures(body) {
        let text = capture[1].trim();
        if is_valid_json(text) {
            debug!("extracted embedded JSON payload from body text");
            return text.to_owned();
        }
    }

    warn!("could not extract JSON from HTML body, passing it through");
    body.to_owned()
}
