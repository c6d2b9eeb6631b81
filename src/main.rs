// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use protexial_web_bridge::{
    ApiType, ClientConfig, PanelSession, ProtexialError, Status, StatusPoller, Zones,
    DEFAULT_MAX_POLL_FAILURES,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "protexial2mqtt")]
#[command(about = "Bridge between a Somfy Protexial alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    /// Panel base URL, e.g. "http://192.168.1.147".
    url: String,
    /// Dialect name ("protexial", "protexial_io", "protexiom"). Optional:
    /// when omitted, the dialect is probed from the live panel at startup.
    #[serde(default)]
    api_type: Option<String>,
    #[serde(default = "default_username")]
    username: String,
    password: String,
    /// Challenge card captured during onboarding, keyed "A1".."F6".
    #[serde(default)]
    codes: HashMap<String, String>,
    #[serde(default = "default_scan_interval")]
    scan_interval_secs: u64,
    /// Optional code required on ARM_*/DISARM commands.
    #[serde(default)]
    arm_code: Option<String>,
    /// Zones armed by ARM_NIGHT, as a bitmask (A=1, B=2, C=4).
    #[serde(default)]
    night_zones: u8,
    /// Zones armed by ARM_HOME, as a bitmask (A=1, B=2, C=4).
    #[serde(default)]
    home_zones: u8,
    #[serde(default = "default_max_poll_failures")]
    max_poll_failures: u32,
}

fn default_username() -> String {
    // The panel web UI has a single fixed user account.
    "u".to_string()
}
fn default_scan_interval() -> u64 {
    20
}
fn default_max_poll_failures() -> u32 {
    DEFAULT_MAX_POLL_FAILURES
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "protexial-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "protexial/cmd".to_string()
}
fn default_publish_topic() -> String {
    "protexial".to_string()
}

fn build_client_config(toml: &PanelToml) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .base_url(&toml.url)
        .username(&toml.username)
        .password(&toml.password)
        .codes(toml.codes.clone());
    if let Some(name) = &toml.api_type {
        match ApiType::from_name(name) {
            Some(api_type) => builder = builder.api_type(api_type),
            None => bail!("Unknown api_type: {name}"),
        }
    }
    Ok(builder.build()?)
}

fn parse_mqtt_url(raw: &str) -> Result<(String, u16)> {
    let parsed = url::Url::parse(raw).with_context(|| format!("Invalid MQTT URL: {raw}"))?;
    if parsed.scheme() != "mqtt" && parsed.scheme() != "tcp" {
        bail!("Unsupported MQTT scheme: {}", parsed.scheme());
    }
    let host = parsed
        .host_str()
        .with_context(|| format!("MQTT URL has no host: {raw}"))?
        .to_string();
    Ok((host, parsed.port().unwrap_or(1883)))
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published state, one retained message per poll: {now, op: "STATE", ...}

#[derive(Serialize)]
struct MqttState {
    now: u64,
    op: &'static str,
    available: bool,
    /// "disarmed" / "armed_away" / "armed_night" / "armed_home"; absent when
    /// the armed zones match no configured mode or the panel is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    alarm: Option<&'static str>,
    #[serde(rename = "armedZones")]
    armed_zones: String,
    sensors: MqttSensors,
}

/// Binary-sensor view of the diagnostic fields. Absent fields mean the
/// panel did not report the underlying tag.
#[derive(Serialize)]
struct MqttSensors {
    #[serde(skip_serializing_if = "Option::is_none", rename = "batteryLow")]
    battery_low: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "radioOk")]
    radio_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "doorOpen")]
    door_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "alarmTriggered")]
    alarm_triggered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "boxTamper")]
    box_tamper: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "gsmOk")]
    gsm_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "cameraOk")]
    camera_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "gsmSignal")]
    gsm_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator: Option<String>,
}

// CMD_ACK response: {now, op: "CMD_ACK", success, src, message?}
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: &'static str,
    success: bool,
    src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    code: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Map the armed zone set onto an alarm mode the way the panel's own keypad
/// modes are configured: all zones is "away", and the night/home modes are
/// whatever zone subsets the user configured for them.
fn alarm_state(status: &Status, night_zones: Zones, home_zones: Zones) -> Option<&'static str> {
    if status.zones_missing() {
        return None;
    }
    let armed = status.armed_zones();
    if armed == Zones::empty() {
        Some("disarmed")
    } else if armed == Zones::ABC {
        Some("armed_away")
    } else if !night_zones.is_empty() && armed == night_zones {
        Some("armed_night")
    } else if !home_zones.is_empty() && armed == home_zones {
        Some("armed_home")
    } else {
        None
    }
}

fn build_state(
    status: &Status,
    available: bool,
    night_zones: Zones,
    home_zones: Zones,
) -> MqttState {
    MqttState {
        now: now_epoch_ms(),
        op: "STATE",
        available,
        alarm: alarm_state(status, night_zones, home_zones),
        armed_zones: status.armed_zones().letters(),
        sensors: MqttSensors {
            battery_low: status.battery.as_deref().map(|v| v != "ok"),
            // The radio tag is inverted: "ok" means the link is healthy.
            radio_ok: status.radio.as_deref().map(|v| v == "ok"),
            door_open: status.door.as_deref().map(|v| v != "ok"),
            alarm_triggered: status.alarm.as_deref().map(|v| v != "ok"),
            box_tamper: status.box_tamper.as_deref().map(|v| v != "ok"),
            gsm_ok: status.gsm.as_deref().map(|v| v == "gsm connect au rseau"),
            camera_ok: status.camera.as_deref().map(|v| v == "enabled"),
            gsm_signal: status.recgsm.clone(),
            operator: status.opegsm.clone(),
        },
    }
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    src: &str,
    success: bool,
    message: Option<String>,
) {
    let ack = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK",
        success,
        src: src.to_string(),
        message,
    };
    publish_json(client, topic, &ack, false).await;
}

fn check_arm_code(arm_code: Option<&str>, supplied: Option<&str>) -> Result<()> {
    if arm_code != supplied {
        bail!("Invalid code");
    }
    Ok(())
}

async fn dispatch_command(
    session: &mut PanelSession,
    command: &MqttCommand,
    arm_code: Option<&str>,
    night_zones: Zones,
    home_zones: Zones,
) -> Result<()> {
    match command.op.as_str() {
        "ARM_AWAY" => {
            check_arm_code(arm_code, command.code.as_deref())?;
            session.arm(Zones::ABC).await?;
        }
        "ARM_NIGHT" => {
            check_arm_code(arm_code, command.code.as_deref())?;
            if night_zones.is_empty() {
                bail!("night_zones is not configured");
            }
            session.arm(night_zones).await?;
        }
        "ARM_HOME" => {
            check_arm_code(arm_code, command.code.as_deref())?;
            if home_zones.is_empty() {
                bail!("home_zones is not configured");
            }
            session.arm(home_zones).await?;
        }
        "DISARM" => {
            check_arm_code(arm_code, command.code.as_deref())?;
            session.disarm().await?;
        }
        "LIGHT_ON" => session.turn_light_on().await?,
        "LIGHT_OFF" => session.turn_light_off().await?,
        "COVER_OPEN" => session.open_cover().await?,
        "COVER_CLOSE" => session.close_cover().await?,
        "COVER_STOP" => session.stop_cover().await?,
        "RESET_BATTERY" => session.reset_battery_status().await?,
        "RESET_LINK" => session.reset_link_status().await?,
        "RESET_ALARM" => session.reset_alarm_status().await?,
        other => bail!("Unknown op: {other}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or
    // RUST_LOG=protexial_web_bridge=trace). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let night_zones = Zones::from_bits_lossy(config.panel.night_zones);
    let home_zones = Zones::from_bits_lossy(config.panel.home_zones);
    let arm_code = config.panel.arm_code.clone();

    // Connect to panel
    info!("Connecting to panel at {}", config.panel.url);
    let mut session = PanelSession::new(build_client_config(&config.panel)?)?;
    if session.api_type().is_none() {
        info!("No api_type configured; probing the panel");
        session.guess_and_set_api_type().await?;
    }
    session.init().await?;
    match session.get_version().await {
        Ok(version) => info!("Panel firmware: {version}"),
        Err(ProtexialError::PageUnavailable(_)) => debug!("Panel has no version endpoint"),
        Err(e) => warn!("Cannot retrieve firmware version: {e}"),
    }
    info!("Panel session established ({})", config.panel.url);

    let mut poller = StatusPoller::new(session, config.panel.max_poll_failures);

    // Set up MQTT
    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
    let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 64);

    client
        .subscribe(&config.mqtt.subscribe_topic, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe to MQTT topic")?;
    info!("MQTT: subscribed to {}", config.mqtt.subscribe_topic);

    let mut poll_timer = interval(Duration::from_secs(config.panel.scan_interval_secs.max(1)));
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                match poller.poll().await {
                    Ok(status) => {
                        let state = build_state(
                            &status,
                            poller.is_available(),
                            night_zones,
                            home_zones,
                        );
                        publish_json(&client, &config.mqtt.publish_topic, &state, true).await;
                    }
                    Err(e) => error!("Status poll failed: {e}"),
                }
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let command: MqttCommand = match serde_json::from_slice(&publish.payload) {
                            Ok(command) => command,
                            Err(e) => {
                                warn!("Ignoring malformed MQTT command: {e}");
                                continue;
                            }
                        };
                        let result = dispatch_command(
                            poller.session_mut(),
                            &command,
                            arm_code.as_deref(),
                            night_zones,
                            home_zones,
                        )
                        .await;
                        match result {
                            Ok(()) => {
                                publish_cmd_ack(
                                    &client,
                                    &config.mqtt.publish_topic,
                                    &command.op,
                                    true,
                                    None,
                                )
                                .await;
                                // Refresh immediately so the new zone state
                                // lands before the next scheduled poll.
                                if let Ok(status) = poller.poll().await {
                                    let state = build_state(
                                        &status,
                                        poller.is_available(),
                                        night_zones,
                                        home_zones,
                                    );
                                    publish_json(&client, &config.mqtt.publish_topic, &state, true)
                                        .await;
                                }
                            }
                            Err(e) => {
                                error!("Command {} failed: {e}", command.op);
                                publish_cmd_ack(
                                    &client,
                                    &config.mqtt.publish_topic,
                                    &command.op,
                                    false,
                                    Some(e.to_string()),
                                )
                                .await;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    if let Err(e) = poller.session_mut().logout().await {
        warn!("Logout failed: {e}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_zones(a: &str, b: &str, c: &str) -> Status {
        Status {
            zone_a: Some(a.to_string()),
            zone_b: Some(b.to_string()),
            zone_c: Some(c.to_string()),
            ..Status::default()
        }
    }

    #[test]
    fn test_alarm_state_mapping() {
        let night = Zones::A | Zones::B;
        let home = Zones::C;

        let disarmed = status_with_zones("off", "off", "off");
        assert_eq!(alarm_state(&disarmed, night, home), Some("disarmed"));

        let away = status_with_zones("on", "on", "on");
        assert_eq!(alarm_state(&away, night, home), Some("armed_away"));

        let at_night = status_with_zones("on", "on", "off");
        assert_eq!(alarm_state(&at_night, night, home), Some("armed_night"));

        let at_home = status_with_zones("off", "off", "on");
        assert_eq!(alarm_state(&at_home, night, home), Some("armed_home"));

        // Armed subset matching no configured mode
        let odd = status_with_zones("on", "off", "off");
        assert_eq!(alarm_state(&odd, night, home), None);

        // Modes never match when unconfigured
        assert_eq!(alarm_state(&at_night, Zones::empty(), Zones::empty()), None);
    }

    #[test]
    fn test_alarm_state_unavailable() {
        assert_eq!(
            alarm_state(&Status::default(), Zones::ABC, Zones::empty()),
            None
        );
    }

    #[test]
    fn test_sensor_interpretation() {
        let status = Status {
            battery: Some("ok".to_string()),
            radio: Some("ok".to_string()),
            door: Some("nok".to_string()),
            gsm: Some("gsm connect au rseau".to_string()),
            camera: Some("disabled".to_string()),
            ..Status::default()
        };
        let state = build_state(&status, true, Zones::empty(), Zones::empty());
        assert_eq!(state.sensors.battery_low, Some(false));
        assert_eq!(state.sensors.radio_ok, Some(true));
        assert_eq!(state.sensors.door_open, Some(true));
        assert_eq!(state.sensors.gsm_ok, Some(true));
        assert_eq!(state.sensors.camera_ok, Some(false));
        assert_eq!(state.sensors.alarm_triggered, None);
    }

    #[test]
    fn test_check_arm_code() {
        assert!(check_arm_code(None, None).is_ok());
        assert!(check_arm_code(Some("1234"), Some("1234")).is_ok());
        assert!(check_arm_code(Some("1234"), None).is_err());
        assert!(check_arm_code(Some("1234"), Some("0000")).is_err());
        assert!(check_arm_code(None, Some("1234")).is_err());
    }

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(
            parse_mqtt_url("mqtt://broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("mqtt://10.0.0.2:11883").unwrap(),
            ("10.0.0.2".to_string(), 11883)
        );
        assert!(parse_mqtt_url("http://broker.local").is_err());
        assert!(parse_mqtt_url("not a url").is_err());
    }
}
