// MIT License - Copyright (c) 2026 Peter Wright
//
//! # protexial-web-bridge
//!
//! Client for the web interface of Somfy Protexial / Protexiom alarm
//! panels, plus an MQTT bridge binary.
//!
//! These panels expose no API: everything is server-rendered HTML forms, a
//! tiny XML status endpoint, a challenge/response login and three mutually
//! incompatible firmware dialects. This library hides all of that behind a
//! typed session: it detects the dialect, logs in with codes from the
//! pre-captured challenge card, polls status and drives the alarm zones,
//! the light output and the roller shutters.
//!
//! ## Quick Start
//!
//! ```no_run
//! use protexial_web_bridge::{ClientConfig, PanelSession, Zones};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://192.168.1.147")
//!         .username("u")
//!         .password("1234")
//!         .codes([("A1".to_string(), "5678".to_string())].into())
//!         .build()?;
//!
//!     let mut session = PanelSession::new(config)?;
//!     session.guess_and_set_api_type().await?;
//!     session.init().await?;
//!
//!     let status = session.get_status().await?;
//!     println!("armed zones: {:?}", status.armed_zones());
//!
//!     session.arm(Zones::ABC).await?;
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```

pub mod challenge;
pub mod config;
pub mod dialect;
pub mod error;
pub mod poll;
pub mod probe;
pub mod scrape;
pub mod session;
pub mod status;
pub mod zones;

// Re-exports for convenience
pub use config::{ClientConfig, ClientConfigBuilder, HTTP_TIMEOUT};
pub use dialect::{ApiType, Dialect, Page, Payload, SelectorKind};
pub use error::{PanelErrorCode, ProtexialError, Result};
pub use poll::{StatusPoller, DEFAULT_MAX_POLL_FAILURES};
pub use session::PanelSession;
pub use status::Status;
pub use zones::Zones;
