// MIT License - Copyright (c) 2026 Peter Wright

use std::collections::HashMap;

use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info, warn};

use crate::challenge;
use crate::config::ClientConfig;
use crate::dialect::{ApiType, Dialect, Page, Payload, SelectorKind};
use crate::error::{PanelErrorCode, ProtexialError, Result};
use crate::probe;
use crate::scrape;
use crate::status::Status;
use crate::zones::Zones;

/// A decoded panel response.
///
/// `path` is the *resolved* URL path after redirects; the panel signals
/// session expiry by silently redirecting to its default page, and errors by
/// redirecting to the error page, all with HTTP 200.
#[derive(Debug)]
struct PanelResponse {
    status: StatusCode,
    path: String,
    body: String,
    set_cookie: Option<String>,
}

/// Per-call behavior flags.
#[derive(Debug, Clone, Copy)]
struct CallOpts {
    /// Whether one transparent recovery (re-login or conflict reset) may be
    /// spent on this call.
    retry: bool,
    /// Whether to send the session cookie and re-login after a conflict.
    authenticated: bool,
}

impl Default for CallOpts {
    fn default() -> Self {
        Self {
            retry: true,
            authenticated: true,
        }
    }
}

/// What to do with a 200 response after inspecting its resolved path.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// Hand the response to the caller.
    Done,
    /// Session expired or not yet authorized: log in, then retry once.
    Relogin,
    /// Another session holds the panel: acknowledge the conflict, then
    /// retry once.
    ResetConflict,
}

/// One authenticated session against a panel.
///
/// Owns the cookie and all HTTP traffic; callers must serialize access (the
/// panel supports a single authenticated session, and concurrent calls
/// against one cookie race into spurious "session already open" conflicts).
pub struct PanelSession {
    client: Client,
    config: ClientConfig,
    dialect: Option<&'static Dialect>,
    cookie: Option<String>,
}

impl PanelSession {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProtexialError::Config(format!("http client: {e}")))?;
        let dialect = config.api_type.map(ApiType::descriptor);
        Ok(Self {
            client,
            config,
            dialect,
            cookie: None,
        })
    }

    /// The active dialect, if one is configured or has been detected.
    pub fn api_type(&self) -> Option<ApiType> {
        self.dialect.map(Dialect::kind)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn dialect(&self) -> Result<&'static Dialect> {
        self.dialect.ok_or_else(|| {
            ProtexialError::Config(
                "api_type is not set; configure one or call guess_and_set_api_type".to_string(),
            )
        })
    }

    /// Probe the panel and install the detected dialect on this session.
    pub async fn guess_and_set_api_type(&mut self) -> Result<ApiType> {
        let api_type = probe::guess_api_type(&self.config.base_url, self.config.timeout).await?;
        info!("panel speaks the {api_type} dialect");
        self.config.api_type = Some(api_type);
        self.dialect = Some(api_type.descriptor());
        Ok(api_type)
    }

    /// Open the session: log in with the configured credentials, resolving
    /// the login code from the challenge card.
    pub async fn init(&mut self) -> Result<()> {
        self.login(None).await
    }

    /// Log in with the configured credentials. `code` overrides the
    /// challenge-card lookup (used during onboarding, before a card exists).
    pub async fn login(&mut self, code: Option<&str>) -> Result<()> {
        let username = self.config.username.clone();
        let password = self.config.password.clone();
        self.perform_login(&username, &password, code).await
    }

    /// Fire the logout page and drop the local cookie. The cookie is cleared
    /// even when the request fails; a half-dead session is worthless.
    pub async fn logout(&mut self) -> Result<()> {
        let result = self
            .call(
                Method::GET,
                Page::Logout,
                None,
                CallOpts {
                    retry: false,
                    authenticated: true,
                },
            )
            .await;
        self.cookie = None;
        result.map(|_| ())
    }

    /// Fetch the current login challenge key (e.g. "B3") from the login
    /// page.
    pub async fn get_challenge(&self) -> Result<String> {
        let response = self.execute(Method::GET, Page::Login, None, false).await?;
        self.classify(&response, false)?;
        let dialect = self.dialect()?;
        let text =
            scrape::first_text(&response.body, dialect.selector(SelectorKind::LoginChallenge))?;
        match text {
            Some(t) if !t.is_empty() => Ok(t),
            _ => Err(ProtexialError::ChallengeNotFound),
        }
    }

    /// Fetch and parse the panel status.
    ///
    /// A document without any zone tags means the panel silently dropped the
    /// session while still serving status.xml; recover by forcing a fresh
    /// login and re-fetching, exactly once.
    pub async fn get_status(&mut self) -> Result<Status> {
        let response = self
            .call(Method::GET, Page::Status, None, CallOpts::default())
            .await?;
        let status = Status::from_xml(&response.body)?;
        if !status.zones_missing() {
            return Ok(status);
        }

        warn!("status came back without zone data, forcing a new session");
        self.logout().await?;
        self.login(None).await?;
        let response = self
            .call(Method::GET, Page::Status, None, CallOpts::default())
            .await?;
        Status::from_xml(&response.body)
    }

    /// Firmware version string, for panels that expose one.
    pub async fn get_version(&mut self) -> Result<String> {
        let response = self
            .call(
                Method::GET,
                Page::Version,
                None,
                CallOpts {
                    retry: true,
                    authenticated: false,
                },
            )
            .await?;
        Ok(response.body.trim().to_string())
    }

    /// Onboarding: log in with an explicitly supplied one-time code, read
    /// the full challenge card and return the key -> code table. The session
    /// is closed afterwards regardless of the outcome.
    pub async fn get_challenge_card(
        &mut self,
        username: &str,
        password: &str,
        code: &str,
    ) -> Result<HashMap<String, String>> {
        self.perform_login(username, password, Some(code)).await?;
        let response = self
            .call(Method::GET, Page::ChallengeCard, None, CallOpts::default())
            .await?;
        let dialect = self.dialect()?;
        let cells = scrape::all_texts(&response.body, dialect.selector(SelectorKind::ChallengeCard));
        if let Err(e) = self.logout().await {
            warn!("logout after challenge card capture failed: {e}");
        }
        Ok(challenge::decode_challenge_card(cells?))
    }

    // --- Control actions --------------------------------------------------

    /// Arm a zone set. Subsets other than the full union arm one zone at a
    /// time, the way the control form does.
    pub async fn arm(&mut self, zones: Zones) -> Result<()> {
        for zone in zones.decompose() {
            debug!("arming zone {}", zone.letters());
            let payload = self.dialect()?.arm_payload(zone);
            self.control(payload).await?;
        }
        Ok(())
    }

    /// Disarm all zones.
    pub async fn disarm(&mut self) -> Result<()> {
        let payload = self.dialect()?.disarm_payload();
        self.control(payload).await
    }

    pub async fn turn_light_on(&mut self) -> Result<()> {
        let payload = self.dialect()?.light_on_payload();
        self.control(payload).await
    }

    pub async fn turn_light_off(&mut self) -> Result<()> {
        let payload = self.dialect()?.light_off_payload();
        self.control(payload).await
    }

    pub async fn open_cover(&mut self) -> Result<()> {
        let payload = self.dialect()?.open_cover_payload();
        self.control(payload).await
    }

    pub async fn close_cover(&mut self) -> Result<()> {
        let payload = self.dialect()?.close_cover_payload();
        self.control(payload).await
    }

    pub async fn stop_cover(&mut self) -> Result<()> {
        let payload = self.dialect()?.stop_cover_payload();
        self.control(payload).await
    }

    /// Clear the battery-fault memory.
    pub async fn reset_battery_status(&mut self) -> Result<()> {
        let payload = self.dialect()?.reset_battery_status_payload();
        self.control(payload).await
    }

    /// Clear the radio-link-fault memory.
    pub async fn reset_link_status(&mut self) -> Result<()> {
        let payload = self.dialect()?.reset_link_status_payload();
        self.control(payload).await
    }

    /// Clear the alarm memory.
    pub async fn reset_alarm_status(&mut self) -> Result<()> {
        let payload = self.dialect()?.reset_alarm_status_payload();
        self.control(payload).await
    }

    async fn control(&mut self, payload: Payload) -> Result<()> {
        self.call(
            Method::POST,
            Page::Control,
            Some(&payload),
            CallOpts::default(),
        )
        .await
        .map(|_| ())
    }

    // --- Call engine ------------------------------------------------------

    /// Execute one logical panel request with at most one transparent
    /// recovery.
    ///
    /// An explicit loop with a one-shot `retry` flag instead of re-entrant
    /// calls: the flag flips to false after the first recovery, so a second
    /// recoverable condition on the same logical call fails instead of
    /// looping.
    async fn call(
        &mut self,
        method: Method,
        page: Page,
        payload: Option<&Payload>,
        opts: CallOpts,
    ) -> Result<PanelResponse> {
        let mut retry = opts.retry;
        loop {
            let response = self
                .execute(method.clone(), page, payload, opts.authenticated)
                .await?;
            match self.classify(&response, retry)? {
                Disposition::Done => return Ok(response),
                Disposition::Relogin => {
                    debug!(
                        "panel pushed {} to {}, re-authenticating",
                        page_name(page),
                        response.path
                    );
                    self.login(None).await?;
                }
                Disposition::ResetConflict => {
                    warn!("another session is open on the panel, resetting it");
                    self.acknowledge_session_conflict().await?;
                    self.cookie = None;
                    if opts.authenticated {
                        self.login(None).await?;
                    }
                }
            }
            retry = false;
        }
    }

    /// Decide what a 200 response means by its resolved path. With `retry`
    /// false, every recoverable condition degrades into success-as-is or a
    /// typed error, so the caller's loop is structurally bounded.
    fn classify(&self, response: &PanelResponse, retry: bool) -> Result<Disposition> {
        if response.status != StatusCode::OK {
            return Err(ProtexialError::Http {
                status: response.status.as_u16(),
                path: response.path.clone(),
            });
        }

        let dialect = self.dialect()?;
        if Some(response.path.as_str()) == dialect.path(Page::Default) {
            // Landing on the default page means the session expired. With the
            // retry spent, the page is handed back as-is, matching the
            // panel's own behavior for unauthenticated areas.
            return Ok(if retry {
                Disposition::Relogin
            } else {
                Disposition::Done
            });
        }

        if Some(response.path.as_str()) != dialect.path(Page::Error) {
            return Ok(Disposition::Done);
        }

        let code_text =
            scrape::first_text(&response.body, dialect.selector(SelectorKind::ErrorCode))?
                .unwrap_or_default();
        match PanelErrorCode::from_code(&code_text) {
            Some(PanelErrorCode::NotAuthorized) if self.cookie.is_none() && retry => {
                Ok(Disposition::Relogin)
            }
            Some(PanelErrorCode::SessionAlreadyOpen) => {
                if retry {
                    Ok(Disposition::ResetConflict)
                } else {
                    Err(ProtexialError::TooManyLoginRetries)
                }
            }
            Some(PanelErrorCode::WrongCredentials) => Err(ProtexialError::WrongCredentials),
            Some(PanelErrorCode::MaxLoginAttempts) => Err(ProtexialError::MaxLoginAttempts),
            Some(PanelErrorCode::WrongCode) => Err(ProtexialError::WrongCode),
            Some(PanelErrorCode::UnknownParameter) => Err(ProtexialError::UnknownParameter),
            _ => Err(ProtexialError::UnknownPanelError {
                code: code_text,
                body: response.body.clone(),
            }),
        }
    }

    /// Log in. Never reuses a stale cookie, never recovers transparently
    /// (a login attempt must not trigger the auto-re-login path), and keeps
    /// whatever cookie the panel returned, possibly none: some firmwares
    /// reject credentials silently and only fail the next authenticated
    /// call.
    async fn perform_login(
        &mut self,
        username: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<()> {
        self.cookie = None;
        let code = match code {
            Some(c) => c.to_string(),
            None => {
                let challenge = self.get_challenge().await?;
                self.config
                    .codes
                    .get(&challenge)
                    .cloned()
                    .ok_or(ProtexialError::CodeNotFound { challenge })?
            }
        };

        let payload = self.dialect()?.login_payload(username, password, &code);
        let response = self
            .execute(Method::POST, Page::Login, Some(&payload), false)
            .await?;
        // No retries here: classify() either accepts the page or fails with
        // a typed login error.
        self.classify(&response, false)?;

        if response.set_cookie.is_none() {
            debug!("login returned no session cookie");
        }
        self.cookie = response.set_cookie.clone();
        Ok(())
    }

    /// Acknowledge a "session already open" conflict by pressing OK on the
    /// error page, the way the browser UI does.
    async fn acknowledge_session_conflict(&self) -> Result<()> {
        let payload = self.dialect()?.reset_session_payload();
        self.execute(Method::POST, Page::Error, Some(&payload), false)
            .await?;
        Ok(())
    }

    /// Send one HTTP request and decode the response with the dialect
    /// encoding. No session semantics beyond attaching the cookie.
    async fn execute(
        &self,
        method: Method,
        page: Page,
        payload: Option<&Payload>,
        authenticated: bool,
    ) -> Result<PanelResponse> {
        let dialect = self.dialect()?;
        let path = dialect
            .path(page)
            .ok_or(ProtexialError::PageUnavailable(page))?;
        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| ProtexialError::Config(format!("bad page path {path}: {e}")))?;

        let mut request = self.client.request(method, url);
        if authenticated {
            if let Some(cookie) = &self.cookie {
                request = request.header(COOKIE, cookie.as_str());
            }
        }
        if let Some(payload) = payload {
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(dialect.encode_payload(payload));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, path))?;
        let status = response.status();
        let resolved_path = response.url().path().to_string();
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, path))?;

        Ok(PanelResponse {
            status,
            path: resolved_path,
            body: dialect.decode(&bytes),
            set_cookie,
        })
    }
}

/// Map a transport failure: timeouts are the one retryable class, anything
/// else is a hard failure.
fn transport_error(error: reqwest::Error, path: &str) -> ProtexialError {
    if error.is_timeout() {
        ProtexialError::Timeout {
            path: path.to_string(),
        }
    } else {
        ProtexialError::Transport {
            path: path.to_string(),
            source: error,
        }
    }
}

fn page_name(page: Page) -> &'static str {
    match page {
        Page::Login => "login",
        Page::Logout => "logout",
        Page::Control => "control",
        Page::Status => "status",
        Page::Error => "error",
        Page::Elements => "elements",
        Page::ChallengeCard => "challenge card",
        Page::Version => "version",
        Page::Default => "default",
    }
}
