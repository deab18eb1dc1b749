use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use reqwest::Url;
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::errors::ValidationError;
use crate::probe::interval::parse_interval;

pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

lazy_static! {
    static ref NAME_REGEX: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9 \-_.,:/]+$").unwrap();
}

/// Kind of a recorded failure.
///
/// Encodes as `"unknown"`, `"down"` or `"error"`. Decoding is lenient: JSON
/// `null` and unrecognised strings become `Unknown`, while non-string tokens
/// are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FailureType {
    #[default]
    Unknown,
    /// The request did not complete.
    Down,
    /// The request completed with a status of 400 or above.
    Error,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Unknown => "unknown",
            FailureType::Down => "down",
            FailureType::Error => "error",
        }
    }

    fn from_label(label: &str) -> FailureType {
        match label {
            "down" => FailureType::Down,
            "error" => FailureType::Error,
            _ => FailureType::Unknown,
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct FailureTypeVisitor;

impl<'de> Visitor<'de> for FailureTypeVisitor {
    type Value = FailureType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a failure type string or null")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FailureType, E> {
        Ok(FailureType::from_label(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<FailureType, E> {
        Ok(FailureType::Unknown)
    }

    fn visit_none<E: de::Error>(self) -> Result<FailureType, E> {
        Ok(FailureType::Unknown)
    }
}

impl<'de> Deserialize<'de> for FailureType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<FailureType, D::Error> {
        deserializer.deserialize_any(FailureTypeVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    #[serde(rename = "type", default)]
    pub kind: FailureType,
    pub time: DateTime<Utc>,
}

impl FailureEvent {
    pub fn down(time: DateTime<Utc>) -> FailureEvent {
        FailureEvent {
            kind: FailureType::Down,
            time,
        }
    }

    pub fn error(time: DateTime<Utc>) -> FailureEvent {
        FailureEvent {
            kind: FailureType::Error,
            time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHttp {
    pub url: String,
}

impl CheckHttp {
    pub fn new<S: Into<String>>(url: S) -> CheckHttp {
        CheckHttp { url: url.into() }
    }

    /// Parses the URL, accepting only absolute `http` and `https` URLs.
    pub fn to_url(&self) -> Result<Url, ValidationError> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| ValidationError::Url(self.url.clone(), e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(ValidationError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// A monitored endpoint, as stored in a polling spec file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    #[serde(rename = "system")]
    pub name: String,
    #[serde(rename = "interval")]
    pub check_interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<CheckHttp>,
    #[serde(
        rename = "failedChecks",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub failed_checks: Vec<FailureEvent>,
}

/// What a prober executes for a system.
#[derive(Debug, Clone)]
pub enum ProbeTarget {
    Http(Url),
}

impl System {
    pub fn http<N: Into<String>, I: Into<String>, U: Into<String>>(
        name: N,
        interval: I,
        url: U,
    ) -> System {
        System {
            name: name.into(),
            check_interval: interval.into(),
            http: Some(CheckHttp::new(url)),
            failed_checks: Vec::new(),
        }
    }

    pub fn interval(&self) -> Result<Duration, ValidationError> {
        let interval = parse_interval(&self.check_interval)
            .map_err(|e| ValidationError::Interval(self.check_interval.clone(), e))?;
        if interval < MIN_INTERVAL {
            return Err(ValidationError::IntervalTooShort(self.check_interval.clone()));
        }
        Ok(interval)
    }

    pub fn probe_target(&self) -> Result<ProbeTarget, ValidationError> {
        match &self.http {
            Some(http) => http.to_url().map(ProbeTarget::Http),
            None => Err(ValidationError::MissingProbe),
        }
    }

    /// Checks the name, interval and probe descriptor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !NAME_REGEX.is_match(&self.name) {
            return Err(ValidationError::Name(self.name.clone()));
        }
        self.interval()?;
        self.probe_target()?;
        Ok(())
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Final status in 100..=399.
    Ok(u16),
    /// Final status of 400 or above.
    Err(u16),
    /// Transport failure, timeout, or a configuration problem.
    Down(String),
}

impl Observation {
    pub fn from_status(code: u16) -> Observation {
        if code >= 400 {
            Observation::Err(code)
        } else {
            Observation::Ok(code)
        }
    }

    /// The failure recorded for this observation, if any.
    pub fn failure_type(&self) -> Option<FailureType> {
        match self {
            Observation::Ok(_) => None,
            Observation::Err(_) => Some(FailureType::Error),
            Observation::Down(_) => Some(FailureType::Down),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Observation::Ok(code) | Observation::Err(code) => Some(*code),
            Observation::Down(_) => None,
        }
    }
}

/// Latest known state of a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LastStatus {
    #[default]
    Unknown,
    Ok(u16),
    Err(u16),
    Down(String),
}

impl From<Observation> for LastStatus {
    fn from(observation: Observation) -> Self {
        match observation {
            Observation::Ok(code) => LastStatus::Ok(code),
            Observation::Err(code) => LastStatus::Err(code),
            Observation::Down(cause) => LastStatus::Down(cause),
        }
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_067_200 + secs, 0).unwrap()
    }

    #[test]
    fn test_failure_type_encodes_as_lowercase_labels() {
        assert_eq!(
            r#""unknown""#,
            serde_json::to_string(&FailureType::Unknown).unwrap()
        );
        assert_eq!(r#""down""#, serde_json::to_string(&FailureType::Down).unwrap());
        assert_eq!(
            r#""error""#,
            serde_json::to_string(&FailureType::Error).unwrap()
        );
    }

    #[test]
    fn test_failure_type_decoding_is_lenient_for_null_and_strings() {
        let cases = [
            ("null", FailureType::Unknown),
            (r#""unknown""#, FailureType::Unknown),
            (r#""down""#, FailureType::Down),
            (r#""error""#, FailureType::Error),
            (r#""DOWN""#, FailureType::Unknown),
            (r#""exploded""#, FailureType::Unknown),
            (r#""""#, FailureType::Unknown),
        ];
        for (input, expected) in cases {
            let decoded: FailureType = serde_json::from_str(input).unwrap();
            assert_eq!(expected, decoded, "decoding {}", input);
        }
    }

    #[test]
    fn test_failure_type_rejects_non_string_tokens() {
        for input in ["1", "true", "[]", r#"{"type":"down"}"#] {
            assert!(
                serde_json::from_str::<FailureType>(input).is_err(),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_failure_event_missing_type_is_unknown() {
        let event: FailureEvent = serde_json::from_str(r#"{"time":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(FailureType::Unknown, event.kind);
        assert_eq!(at(0), event.time);
    }

    #[test]
    fn test_system_json_layout() {
        let mut system = System::http("Descriptive name", "30s", "https://google.com");
        assert_eq!(
            r#"{"system":"Descriptive name","interval":"30s","http":{"url":"https://google.com"}}"#,
            serde_json::to_string(&system).unwrap()
        );

        system.failed_checks = vec![FailureEvent::down(at(0)), FailureEvent::error(at(30))];
        let value = serde_json::to_value(&system).unwrap();
        assert_eq!("down", value["failedChecks"][0]["type"]);
        assert_eq!("2024-01-01T00:00:00Z", value["failedChecks"][0]["time"]);
        assert_eq!("error", value["failedChecks"][1]["type"]);

        let decoded: System = serde_json::from_value(value).unwrap();
        assert_eq!(system, decoded);
    }

    #[test]
    fn test_system_without_probe_decodes() {
        let system: System = serde_json::from_str(r#"{"system":"bare","interval":"5s"}"#).unwrap();
        assert!(system.http.is_none());
        assert!(system.failed_checks.is_empty());
        assert_eq!(Err(ValidationError::MissingProbe), system.validate());
    }

    #[test]
    fn test_system_requires_name_and_interval() {
        assert!(serde_json::from_str::<System>(r#"{"interval":"5s"}"#).is_err());
        assert!(serde_json::from_str::<System>(r#"{"system":"x"}"#).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_system() {
        let system = System::http("API: eu-west/1, v2.0_beta", "1m30s", "http://localhost:8080/health");
        assert_eq!(Ok(()), system.validate());
        assert_eq!(Duration::from_secs(90), system.interval().unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for name in ["", "bad|name", "semi;colon", "new\nline"] {
            let system = System::http(name, "30s", "https://example.com");
            assert!(
                matches!(system.validate(), Err(ValidationError::Name(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_intervals() {
        let system = System::http("svc", "soon", "https://example.com");
        assert!(matches!(system.validate(), Err(ValidationError::Interval(_, _))));

        let system = System::http("svc", "500ms", "https://example.com");
        assert!(matches!(
            system.validate(),
            Err(ValidationError::IntervalTooShort(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let system = System::http("svc", "30s", "not a url");
        assert!(matches!(system.validate(), Err(ValidationError::Url(_, _))));

        let system = System::http("svc", "30s", "ftp://example.com/file");
        assert_eq!(
            Err(ValidationError::UnsupportedScheme("ftp".to_owned())),
            system.validate()
        );
    }

    #[test]
    fn test_observation_classification() {
        assert_eq!(Observation::Ok(100), Observation::from_status(100));
        assert_eq!(Observation::Ok(302), Observation::from_status(302));
        assert_eq!(Observation::Ok(399), Observation::from_status(399));
        assert_eq!(Observation::Err(400), Observation::from_status(400));
        assert_eq!(Observation::Err(503), Observation::from_status(503));

        assert_eq!(None, Observation::Ok(200).failure_type());
        assert_eq!(Some(FailureType::Error), Observation::Err(500).failure_type());
        assert_eq!(
            Some(FailureType::Down),
            Observation::Down("timeout".to_owned()).failure_type()
        );
    }
}
