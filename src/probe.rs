// MIT License - Copyright (c) 2026 Peter Wright

//! Firmware dialect detection ("API guessing").
//!
//! The panel does not advertise its firmware family, so the prober tries
//! each known dialect against the live device and validates the result by
//! the shape of the login challenge token.

use std::time::Duration;

use reqwest::{redirect, Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::challenge;
use crate::dialect::{ApiType, Dialect, Page, SelectorKind};
use crate::error::{ProtexialError, Result};
use crate::scrape;

/// Outcome of one unauthenticated probe request.
enum Probe {
    /// 200 with a decoded body.
    Body(String),
    /// 3xx: the panel is mid-redirect (e.g. rebooting into its landing
    /// page); probing now would misdetect.
    Redirect,
    /// Any other HTTP status.
    Status(u16),
    /// Connection-level failure (refused, reset, timed out).
    Unreachable,
}

/// Determine which dialect the panel at `base_url` speaks.
///
/// Candidates are tried in fixed priority order and the first confirmed one
/// wins. A candidate is confirmed when its login page yields a challenge
/// token of the canonical shape under the candidate's own selector and
/// encoding. Redirects abort the whole probe as "try later"; anything else
/// just disqualifies the candidate.
pub async fn guess_api_type(base_url: &Url, timeout: Duration) -> Result<ApiType> {
    // Probing must see redirects rather than follow them.
    let client = Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|e| ProtexialError::Config(format!("http client: {e}")))?;

    for candidate in ApiType::PROBE_ORDER {
        if probe_candidate(&client, base_url, candidate).await? {
            return Ok(candidate);
        }
        debug!("panel does not speak {candidate}");
    }
    Err(ProtexialError::PanelNotDetected)
}

async fn probe_candidate(client: &Client, base_url: &Url, candidate: ApiType) -> Result<bool> {
    let dialect = candidate.descriptor();

    // Firmwares with a version endpoint must answer it before the login
    // page is even considered; its absence rules the candidate out cheaply.
    if let Some(version_path) = dialect.path(Page::Version) {
        match fetch(client, base_url, version_path, dialect).await? {
            Probe::Body(_) => {}
            Probe::Redirect => return Err(ProtexialError::TryLater),
            Probe::Status(status) => {
                debug!("{candidate}: version page answered {status}");
                return Ok(false);
            }
            Probe::Unreachable => return Ok(false),
        }
    }

    let Some(login_path) = dialect.path(Page::Login) else {
        return Ok(false);
    };
    let body = match fetch(client, base_url, login_path, dialect).await? {
        Probe::Body(body) => body,
        Probe::Redirect => return Err(ProtexialError::TryLater),
        Probe::Status(status) => {
            debug!("{candidate}: login page answered {status}");
            return Ok(false);
        }
        Probe::Unreachable => return Ok(false),
    };

    let token = scrape::first_text(&body, dialect.selector(SelectorKind::LoginChallenge))?;
    match token {
        Some(token) if challenge::is_login_challenge(token.trim()) => Ok(true),
        Some(token) => {
            debug!("{candidate}: challenge element reads {token:?}, not a challenge");
            Ok(false)
        }
        None => Ok(false),
    }
}

async fn fetch(client: &Client, base_url: &Url, path: &str, dialect: &Dialect) -> Result<Probe> {
    let url = base_url
        .join(path)
        .map_err(|e| ProtexialError::Config(format!("bad page path {path}: {e}")))?;
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("probe of {path} failed: {e}");
            return Ok(Probe::Unreachable);
        }
    };

    if response.status().is_redirection() {
        return Ok(Probe::Redirect);
    }
    if response.status() != StatusCode::OK {
        return Ok(Probe::Status(response.status().as_u16()));
    }
    match response.bytes().await {
        Ok(bytes) => Ok(Probe::Body(dialect.decode(&bytes))),
        Err(e) => {
            debug!("probe of {path} failed mid-body: {e}");
            Ok(Probe::Unreachable)
        }
    }
}
