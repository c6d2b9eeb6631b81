// MIT License - Copyright (c) 2026 Peter Wright

use serde::Serialize;

use crate::error::{ProtexialError, Result};
use crate::zones::Zones;

/// One polled snapshot of the panel state.
///
/// Fields keep the panel's raw vocabulary ("on"/"off", "ok"/"nok", free-form
/// GSM text) rather than booleans; the bridge layer decides how to interpret
/// them. A field is `None` when the status document did not carry its tag;
/// the blank default value doubles as the "panel unavailable" record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub zone_a: Option<String>,
    pub zone_b: Option<String>,
    pub zone_c: Option<String>,
    pub battery: Option<String>,
    /// "ok" means the radio link is healthy (inverted w.r.t. the fault tags).
    pub radio: Option<String>,
    pub door: Option<String>,
    pub alarm: Option<String>,
    pub box_tamper: Option<String>,
    pub gsm: Option<String>,
    pub recgsm: Option<String>,
    pub opegsm: Option<String>,
    pub camera: Option<String>,
}

impl Status {
    /// Parse the panel's status.xml document.
    ///
    /// The document is a flat element whose children are matched by name;
    /// unknown tags are ignored and absent tags leave the field unset, so
    /// parsing is total over any firmware's tag subset.
    pub fn from_xml(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| ProtexialError::InvalidStatus(e.to_string()))?;

        let mut status = Status::default();
        for child in doc.root_element().children().filter(|n| n.is_element()) {
            let value = Some(normalize(child.text().unwrap_or_default()));
            match child.tag_name().name() {
                "defaut0" => status.battery = value,
                "defaut1" => status.radio = value,
                "defaut2" => status.door = value,
                "defaut3" => status.alarm = value,
                "defaut4" => status.box_tamper = value,
                "zone0" => status.zone_a = value,
                "zone1" => status.zone_b = value,
                "zone2" => status.zone_c = value,
                "gsm" => status.gsm = value,
                "recgsm" => status.recgsm = value,
                "opegsm" => status.opegsm = value,
                "camera" => status.camera = value,
                _ => {}
            }
        }
        Ok(status)
    }

    /// True when none of the zone tags were present. The panel sometimes
    /// keeps serving status.xml without zone data after a silent session
    /// desynchronization; the session engine uses this to force a re-login.
    pub fn zones_missing(&self) -> bool {
        self.zone_a.is_none() && self.zone_b.is_none() && self.zone_c.is_none()
    }

    /// The set of currently armed zones.
    pub fn armed_zones(&self) -> Zones {
        let mut zones = Zones::empty();
        if self.zone_a.as_deref() == Some("on") {
            zones |= Zones::A;
        }
        if self.zone_b.as_deref() == Some("on") {
            zones |= Zones::B;
        }
        if self.zone_c.as_deref() == Some("on") {
            zones |= Zones::C;
        }
        zones
    }
}

/// Normalize a device-reported string: drop everything outside printable
/// ASCII and lowercase the rest.
///
/// Devices report text in whatever encoding their own firmware fancies;
/// after this filter, comparisons against the fixed vocabulary ("ok", "on",
/// "gsm connect au rseau") hold regardless of source encoding quirks.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| (' '..='~').contains(c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-15\" ?>\
        <response>\
        <defaut0>ok</defaut0><defaut1>ok</defaut1><defaut2>nok</defaut2>\
        <defaut3>ok</defaut3><defaut4>ok</defaut4>\
        <zone0>on</zone0><zone1>off</zone1><zone2>off</zone2>\
        <gsm>GSM connect\u{e9} au r\u{e9}seau</gsm>\
        <recgsm>5</recgsm><opegsm>Orange F</opegsm><camera>disabled</camera>\
        </response>";

    #[test]
    fn test_parse_full_document() {
        let status = Status::from_xml(FULL).unwrap();
        assert_eq!(status.zone_a.as_deref(), Some("on"));
        assert_eq!(status.zone_b.as_deref(), Some("off"));
        assert_eq!(status.zone_c.as_deref(), Some("off"));
        assert_eq!(status.battery.as_deref(), Some("ok"));
        assert_eq!(status.door.as_deref(), Some("nok"));
        assert_eq!(status.gsm.as_deref(), Some("gsm connect au rseau"));
        assert_eq!(status.opegsm.as_deref(), Some("orange f"));
        assert_eq!(status.camera.as_deref(), Some("disabled"));
        assert!(!status.zones_missing());
    }

    #[test]
    fn test_parse_partial_document() {
        let status =
            Status::from_xml("<response><zone0>off</zone0><gsm>x</gsm></response>").unwrap();
        assert_eq!(status.zone_a.as_deref(), Some("off"));
        assert!(status.zone_b.is_none());
        assert!(status.battery.is_none());
        assert!(status.camera.is_none());
    }

    #[test]
    fn test_unknown_tags_ignored() {
        let status = Status::from_xml(
            "<response><frobnicate>1</frobnicate><zone1>on</zone1></response>",
        )
        .unwrap();
        assert_eq!(status.zone_b.as_deref(), Some("on"));
        assert_eq!(
            status,
            Status {
                zone_b: Some("on".to_string()),
                ..Status::default()
            }
        );
    }

    #[test]
    fn test_empty_document_is_blank() {
        let status = Status::from_xml("<response></response>").unwrap();
        assert_eq!(status, Status::default());
        assert!(status.zones_missing());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            Status::from_xml("<response><zone0>on"),
            Err(ProtexialError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = Status::from_xml(FULL).unwrap();
        let b = Status::from_xml(FULL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_strips_non_ascii_and_lowercases() {
        assert_eq!(normalize("GSM connect\u{e9} au r\u{e9}seau"), "gsm connect au rseau");
        assert_eq!(normalize("OK"), "ok");
        assert_eq!(normalize("\u{7}\u{feff}on\r\n"), "on");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_armed_zones() {
        let mut status = Status::default();
        assert_eq!(status.armed_zones(), Zones::empty());
        status.zone_a = Some("on".to_string());
        status.zone_c = Some("on".to_string());
        assert_eq!(status.armed_zones(), Zones::A | Zones::C);
        status.zone_b = Some("on".to_string());
        assert_eq!(status.armed_zones(), Zones::ABC);
    }
}
