// MIT License - Copyright (c) 2026 Peter Wright

use std::fmt;

use encoding_rs::{Encoding, ISO_8859_15, UTF_8};
use serde::{Deserialize, Serialize};

use crate::zones::Zones;

/// Panel firmware dialect.
///
/// Replaces the per-firmware page/selector/payload vocabulary with a single
/// enum and a static descriptor table. Each variant only differs in page
/// paths, DOM selectors, text encoding and form-field vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// Protexial firmware (ISO-8859-15 pages under /fr/)
    Protexial,
    /// Protexial IO firmware (UTF-8 pages, reworked login markup)
    ProtexialIo,
    /// Legacy Protexiom firmware (no /fr/ prefix, no version endpoint)
    Protexiom,
}

impl ApiType {
    /// Probe priority: newest firmware first (see `probe`).
    pub const PROBE_ORDER: [ApiType; 3] =
        [ApiType::ProtexialIo, ApiType::Protexial, ApiType::Protexiom];

    /// Parse a configuration name (e.g. "protexial_io").
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "protexial" => Some(Self::Protexial),
            "protexial_io" => Some(Self::ProtexialIo),
            "protexiom" => Some(Self::Protexiom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protexial => "protexial",
            Self::ProtexialIo => "protexial_io",
            Self::Protexiom => "protexiom",
        }
    }

    /// The immutable descriptor for this dialect.
    pub fn descriptor(self) -> &'static Dialect {
        match self {
            Self::Protexial => &PROTEXIAL,
            Self::ProtexialIo => &PROTEXIAL_IO,
            Self::Protexiom => &PROTEXIOM,
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical pages of the panel web server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Login,
    Logout,
    Control,
    Status,
    Error,
    Elements,
    ChallengeCard,
    Version,
    Default,
}

/// Logical DOM selectors used against the panel's HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    ContentType,
    LoginChallenge,
    ErrorCode,
    Footer,
    ChallengeCard,
}

/// A form body for a control action.
///
/// `Form` fields are encoded with the dialect's charset at send time. `Raw`
/// ships a pre-encoded body for the one case the form encoder cannot
/// produce (see `Dialect::disarm_payload`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Form(Vec<(&'static str, String)>),
    Raw(&'static str),
}

struct PageTable {
    login: &'static str,
    logout: &'static str,
    control: &'static str,
    status: &'static str,
    error: &'static str,
    elements: &'static str,
    challenge_card: &'static str,
    version: Option<&'static str>,
    default: &'static str,
}

struct SelectorTable {
    content_type: &'static str,
    login_challenge: &'static str,
    error_code: &'static str,
    footer: &'static str,
    challenge_card: &'static str,
}

/// Immutable per-dialect descriptor: page paths, selectors, text encoding
/// and form-payload vocabulary. One instance per session; pure data plus
/// payload construction, no I/O.
pub struct Dialect {
    kind: ApiType,
    pages: PageTable,
    selectors: SelectorTable,
    encoding: &'static Encoding,
}

static PROTEXIAL: Dialect = Dialect {
    kind: ApiType::Protexial,
    pages: PageTable {
        login: "/fr/login.htm",
        logout: "/logout.htm",
        control: "/fr/u_pilotage.htm",
        status: "/status.xml",
        error: "/fr/error.htm",
        elements: "/fr/u_listelmt.htm",
        challenge_card: "/fr/u_print.htm",
        version: Some("/cfg/vers"),
        default: "/default.htm",
    },
    selectors: SelectorTable {
        content_type: "meta[http-equiv='content-type']",
        login_challenge: "#form_id table tr:nth-child(4) td:nth-child(1) b",
        error_code: "#infobox b",
        footer: "[id^='menu_footer']",
        challenge_card: "td:not([class])",
    },
    encoding: ISO_8859_15,
};

static PROTEXIAL_IO: Dialect = Dialect {
    kind: ApiType::ProtexialIo,
    pages: PageTable {
        login: "/fr/login.htm",
        logout: "/logout.htm",
        control: "/fr/u_pilotage.htm",
        status: "/status.xml",
        error: "/fr/error.htm",
        elements: "/fr/u_listelmt.htm",
        challenge_card: "/fr/u_challenge.htm",
        version: Some("/cfg/vers"),
        default: "/default.htm",
    },
    selectors: SelectorTable {
        content_type: "meta[http-equiv='content-type']",
        login_challenge: "#form_id div:nth-child(6) b",
        error_code: "#infobox b",
        footer: "[id^='menu_footer']",
        challenge_card: "td:not([class])",
    },
    encoding: UTF_8,
};

static PROTEXIOM: Dialect = Dialect {
    kind: ApiType::Protexiom,
    pages: PageTable {
        login: "/login.htm",
        logout: "/logout.htm",
        control: "/u_pilotage.htm",
        status: "/status.xml",
        error: "/error.htm",
        elements: "/u_listelmt.htm",
        challenge_card: "/u_print.htm",
        version: None,
        default: "/default.htm",
    },
    selectors: SelectorTable {
        content_type: "meta[http-equiv='content-type']",
        login_challenge: "#form_id table tr:nth-child(3) td:nth-child(1)",
        error_code: "#infobox b",
        footer: "[id^='menu_footer']",
        challenge_card: "td:not([class])",
    },
    encoding: ISO_8859_15,
};

impl Dialect {
    pub fn kind(&self) -> ApiType {
        self.kind
    }

    /// URL path for a logical page. Only `Page::Version` can be absent.
    pub fn path(&self, page: Page) -> Option<&'static str> {
        match page {
            Page::Login => Some(self.pages.login),
            Page::Logout => Some(self.pages.logout),
            Page::Control => Some(self.pages.control),
            Page::Status => Some(self.pages.status),
            Page::Error => Some(self.pages.error),
            Page::Elements => Some(self.pages.elements),
            Page::ChallengeCard => Some(self.pages.challenge_card),
            Page::Version => self.pages.version,
            Page::Default => Some(self.pages.default),
        }
    }

    /// DOM query string for a logical selector.
    pub fn selector(&self, kind: SelectorKind) -> &'static str {
        match kind {
            SelectorKind::ContentType => self.selectors.content_type,
            SelectorKind::LoginChallenge => self.selectors.login_challenge,
            SelectorKind::ErrorCode => self.selectors.error_code,
            SelectorKind::Footer => self.selectors.footer,
            SelectorKind::ChallengeCard => self.selectors.challenge_card,
        }
    }

    /// The text encoding the panel uses for this dialect, applied to both
    /// request bodies and response decoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decode a response body with the dialect encoding.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _, _) = self.encoding.decode(bytes);
        text.into_owned()
    }

    /// Encode form fields into an `application/x-www-form-urlencoded` body,
    /// percent-escaping in the dialect's charset rather than UTF-8.
    pub fn encode_form(&self, fields: &[(&'static str, String)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            if !body.is_empty() {
                body.push('&');
            }
            append_form_encoded(&mut body, name.as_bytes());
            body.push('=');
            let (bytes, _, _) = self.encoding.encode(value);
            append_form_encoded(&mut body, &bytes);
        }
        body
    }

    /// Render a payload into the final request body.
    pub fn encode_payload(&self, payload: &Payload) -> String {
        match payload {
            Payload::Form(fields) => self.encode_form(fields),
            Payload::Raw(body) => (*body).to_string(),
        }
    }

    // --- Payload builders -------------------------------------------------

    pub fn login_payload(&self, username: &str, password: &str, code: &str) -> Payload {
        let mut fields = vec![
            ("login", username.to_string()),
            ("password", password.to_string()),
            ("key", code.to_string()),
        ];
        match self.kind {
            ApiType::Protexial => fields.push(("btn_login", "Connexion".to_string())),
            ApiType::ProtexialIo => fields.push(("btn_login", "Se connecter".to_string())),
            ApiType::Protexiom => fields.push(("action", "Connexion".to_string())),
        }
        Payload::Form(fields)
    }

    /// Acknowledges a "session already open" conflict on the error page.
    pub fn reset_session_payload(&self) -> Payload {
        match self.kind {
            ApiType::Protexial | ApiType::ProtexialIo => {
                Payload::Form(vec![("btn_ok", "OK".to_string())])
            }
            ApiType::Protexiom => Payload::Form(vec![("action", "OK".to_string())]),
        }
    }

    /// Arm one zone or the full union. Callers pass a value produced by
    /// `Zones::decompose`, so `zone` is always A, B, C or ABC.
    pub fn arm_payload(&self, zone: Zones) -> Payload {
        let suffix = if zone == Zones::A {
            "A"
        } else if zone == Zones::B {
            "B"
        } else if zone == Zones::C {
            "C"
        } else {
            "ABC"
        };
        match self.kind {
            ApiType::Protexial => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                (arm_button(suffix), "Marche".to_string()),
            ]),
            ApiType::ProtexialIo => {
                let label = if suffix == "ABC" {
                    "Marche A B C".to_string()
                } else {
                    format!("Marche {suffix}")
                };
                Payload::Form(vec![
                    ("hidden", "hidden".to_string()),
                    (arm_button(suffix), label),
                ])
            }
            ApiType::Protexiom => {
                let label = if suffix == "ABC" {
                    "Marche A B C".to_string()
                } else {
                    format!("Marche {suffix}")
                };
                Payload::Form(vec![("hidden", "hidden".to_string()), ("zone", label)])
            }
        }
    }

    pub fn disarm_payload(&self) -> Payload {
        match self.kind {
            // The disarm button is labeled "Arrêt A B C" and this firmware
            // expects ISO-8859-15; the stock form encoder would mangle the
            // 'ê', so the body ships pre-encoded (0xEA).
            ApiType::Protexial => Payload::Raw("hidden=hidden&btn_zone_off_ABC=Arr%EAt+A+B+C"),
            ApiType::ProtexialIo => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_zone_off_ABC", "Arrêt A B C".to_string()),
            ]),
            ApiType::Protexiom => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("zone", "Arrêt A B C".to_string()),
            ]),
        }
    }

    pub fn light_on_payload(&self) -> Payload {
        let button = match self.kind {
            ApiType::Protexial | ApiType::ProtexialIo => "btn_lum_on",
            ApiType::Protexiom => "action_lum",
        };
        Payload::Form(vec![
            ("hidden", "hidden".to_string()),
            (button, "ON".to_string()),
        ])
    }

    pub fn light_off_payload(&self) -> Payload {
        let button = match self.kind {
            ApiType::Protexial | ApiType::ProtexialIo => "btn_lum_off",
            ApiType::Protexiom => "action_lum",
        };
        Payload::Form(vec![
            ("hidden", "hidden".to_string()),
            (button, "OFF".to_string()),
        ])
    }

    pub fn open_cover_payload(&self) -> Payload {
        let button = match self.kind {
            ApiType::Protexial | ApiType::ProtexialIo => "btn_vol_up",
            ApiType::Protexiom => "action_vol_montee",
        };
        Payload::Form(vec![
            ("hidden", "hidden".to_string()),
            (button, String::new()),
        ])
    }

    pub fn close_cover_payload(&self) -> Payload {
        let button = match self.kind {
            ApiType::Protexial | ApiType::ProtexialIo => "btn_vol_down",
            ApiType::Protexiom => "action_vol_descente",
        };
        Payload::Form(vec![
            ("hidden", "hidden".to_string()),
            (button, String::new()),
        ])
    }

    pub fn stop_cover_payload(&self) -> Payload {
        match self.kind {
            ApiType::Protexial => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_vol_stop", String::new()),
            ]),
            ApiType::ProtexialIo => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_vol_stop", "Stop".to_string()),
            ]),
            ApiType::Protexiom => Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("action_vol_stop", String::new()),
            ]),
        }
    }

    pub fn reset_battery_status_payload(&self) -> Payload {
        Payload::Form(vec![("btn_del_pil", "Piles".to_string())])
    }

    pub fn reset_link_status_payload(&self) -> Payload {
        Payload::Form(vec![("btn_del_lia", "Liaisons".to_string())])
    }

    pub fn reset_alarm_status_payload(&self) -> Payload {
        Payload::Form(vec![("btn_del_alm", "Alarmes".to_string())])
    }
}

/// Percent-escape one form component over already charset-encoded bytes:
/// spaces become '+', ASCII alphanumerics and `*-._` pass through,
/// everything else is `%XX`.
fn append_form_encoded(out: &mut String, bytes: &[u8]) {
    for &byte in bytes {
        match byte {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
}

/// Form field name for an arm button, by zone suffix.
fn arm_button(suffix: &str) -> &'static str {
    match suffix {
        "A" => "btn_zone_on_A",
        "B" => "btn_zone_on_B",
        "C" => "btn_zone_on_C",
        _ => "btn_zone_on_ABC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_kinds() {
        for kind in ApiType::PROBE_ORDER {
            assert_eq!(kind.descriptor().kind(), kind);
        }
    }

    #[test]
    fn test_api_type_names() {
        assert_eq!(ApiType::from_name("protexial"), Some(ApiType::Protexial));
        assert_eq!(ApiType::from_name("protexial_io"), Some(ApiType::ProtexialIo));
        assert_eq!(ApiType::from_name("protexiom"), Some(ApiType::Protexiom));
        assert_eq!(ApiType::from_name("protexium"), None);
        for kind in ApiType::PROBE_ORDER {
            assert_eq!(ApiType::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_version_page_presence() {
        assert_eq!(
            ApiType::Protexial.descriptor().path(Page::Version),
            Some("/cfg/vers")
        );
        assert_eq!(ApiType::Protexiom.descriptor().path(Page::Version), None);
    }

    #[test]
    fn test_protexiom_paths_have_no_language_prefix() {
        let d = ApiType::Protexiom.descriptor();
        assert_eq!(d.path(Page::Login), Some("/login.htm"));
        assert_eq!(d.path(Page::Control), Some("/u_pilotage.htm"));
        // status.xml is shared across firmwares
        assert_eq!(d.path(Page::Status), Some("/status.xml"));
    }

    #[test]
    fn test_login_payload_vocabulary() {
        let p = ApiType::Protexial
            .descriptor()
            .login_payload("u", "secret", "1234");
        assert_eq!(
            p,
            Payload::Form(vec![
                ("login", "u".to_string()),
                ("password", "secret".to_string()),
                ("key", "1234".to_string()),
                ("btn_login", "Connexion".to_string()),
            ])
        );

        let Payload::Form(io) = ApiType::ProtexialIo
            .descriptor()
            .login_payload("u", "secret", "1234")
        else {
            panic!("expected form payload");
        };
        assert!(io.contains(&("btn_login", "Se connecter".to_string())));

        let Payload::Form(alt) = ApiType::Protexiom
            .descriptor()
            .login_payload("u", "secret", "1234")
        else {
            panic!("expected form payload");
        };
        assert!(alt.contains(&("action", "Connexion".to_string())));
    }

    #[test]
    fn test_protexial_disarm_is_preencoded() {
        let d = ApiType::Protexial.descriptor();
        let body = d.encode_payload(&d.disarm_payload());
        assert_eq!(body, "hidden=hidden&btn_zone_off_ABC=Arr%EAt+A+B+C");
    }

    #[test]
    fn test_form_encoding_follows_dialect_charset() {
        // Same accented label, two charsets: ISO-8859-15 escapes the single
        // 0xEA byte, UTF-8 escapes the two-byte sequence.
        let alt = ApiType::Protexiom.descriptor();
        let body = alt.encode_payload(&alt.disarm_payload());
        assert_eq!(body, "hidden=hidden&zone=Arr%EAt+A+B+C");

        let io = ApiType::ProtexialIo.descriptor();
        let body = io.encode_payload(&io.disarm_payload());
        assert_eq!(body, "hidden=hidden&btn_zone_off_ABC=Arr%C3%AAt+A+B+C");
    }

    #[test]
    fn test_arm_payload_per_zone() {
        let d = ApiType::Protexial.descriptor();
        assert_eq!(
            d.arm_payload(Zones::A),
            Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_zone_on_A", "Marche".to_string()),
            ])
        );
        assert_eq!(
            d.arm_payload(Zones::ABC),
            Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_zone_on_ABC", "Marche".to_string()),
            ])
        );

        let io = ApiType::ProtexialIo.descriptor();
        assert_eq!(
            io.arm_payload(Zones::B),
            Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("btn_zone_on_B", "Marche B".to_string()),
            ])
        );

        let alt = ApiType::Protexiom.descriptor();
        assert_eq!(
            alt.arm_payload(Zones::C),
            Payload::Form(vec![
                ("hidden", "hidden".to_string()),
                ("zone", "Marche C".to_string()),
            ])
        );
    }

    #[test]
    fn test_encodings() {
        assert_eq!(ApiType::Protexial.descriptor().encoding(), ISO_8859_15);
        assert_eq!(ApiType::ProtexialIo.descriptor().encoding(), UTF_8);
        assert_eq!(ApiType::Protexiom.descriptor().encoding(), ISO_8859_15);
    }

    #[test]
    fn test_decode_iso_8859_15() {
        let d = ApiType::Protexial.descriptor();
        // "connecté" with 0xE9 for 'é'
        let decoded = d.decode(b"connect\xE9");
        assert_eq!(decoded, "connecté");
    }
}
