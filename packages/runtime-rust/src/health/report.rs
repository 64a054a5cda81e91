//! JSON rendering of aggregated health results.
//!
//! The document shape mirrors a management health endpoint:
//!
//! ```json
//! { "status": "DOWN",
//!   "checks": [ { "name": "db", "status": "DOWN", "message": "...", "data": { ... } } ] }
//! ```
//!
//! Transport (HTTP status codes, content negotiation) is left to the caller.

use std::fmt;
use std::str::FromStr;

use lodestar_core::{HealthCheckResult, HealthState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::helper::is_results_up;

/// How much of the aggregated result a report exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureLevel {
    /// Status plus every check.
    Full,
    /// Status plus the checks that are DOWN.
    #[default]
    Default,
    /// Status only.
    Oneline,
}

impl ExposureLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Default => "default",
            Self::Oneline => "oneline",
        }
    }
}

impl fmt::Display for ExposureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExposureLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "default" => Ok(Self::Default),
            "oneline" => Ok(Self::Oneline),
            other => Err(format!("unknown exposure level: {other}")),
        }
    }
}

/// Optional report sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Emit `error-message` at every level and add the full error chain as `stack-trace`.
    pub include_stack_trace: bool,
    /// Emit each check's details under `data`.
    pub include_data: bool,
}

/// Renders `results` as a health document.
///
/// The top-level status follows [`is_results_up`] for the given probe kind.
#[must_use]
pub fn render_report(
    results: &[HealthCheckResult],
    level: ExposureLevel,
    readiness: bool,
    options: ReportOptions,
) -> Value {
    let status = if is_results_up(results, readiness) {
        HealthState::Up
    } else {
        HealthState::Down
    };

    let mut root = Map::new();
    root.insert("status".to_string(), json!(status.as_str()));

    let shown: Vec<&HealthCheckResult> = match level {
        ExposureLevel::Oneline => return Value::Object(root),
        ExposureLevel::Full => results.iter().collect(),
        ExposureLevel::Default => results
            .iter()
            .filter(|r| r.state() == HealthState::Down)
            .collect(),
    };

    if level == ExposureLevel::Full || !shown.is_empty() {
        let checks = shown
            .into_iter()
            .map(|result| render_check(result, level, options))
            .collect();
        root.insert("checks".to_string(), Value::Array(checks));
    }
    Value::Object(root)
}

fn render_check(result: &HealthCheckResult, level: ExposureLevel, options: ReportOptions) -> Value {
    let mut check = Map::new();
    check.insert("name".to_string(), json!(result.check_id()));
    check.insert("status".to_string(), json!(result.state().as_str()));
    if let Some(group) = result.group() {
        check.insert("group".to_string(), json!(group));
    }
    if let Some(message) = result.message() {
        check.insert("message".to_string(), json!(message));
    }
    if let Some(error) = result.error() {
        if level == ExposureLevel::Full || options.include_stack_trace {
            check.insert("error-message".to_string(), json!(format!("{error:#}")));
        }
        if options.include_stack_trace {
            check.insert("stack-trace".to_string(), json!(format!("{error:?}")));
        }
    }
    if options.include_data && !result.details().is_empty() {
        let data: Map<String, Value> = result
            .details()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        check.insert("data".to_string(), Value::Object(data));
    }
    Value::Object(check)
}

#[cfg(test)]
mod tests {
    use lodestar_core::HealthCheckResultBuilder;

    use super::*;

    fn result(id: &str, state: HealthState) -> HealthCheckResult {
        let mut builder = HealthCheckResultBuilder::new(id, None);
        builder.state(state);
        builder.build()
    }

    fn failing(id: &str) -> HealthCheckResult {
        let mut builder = HealthCheckResultBuilder::new(id, Some("storage"));
        builder
            .down()
            .message("ping failed")
            .error(anyhow::anyhow!("timeout").context("connect"))
            .detail("b.count", 2)
            .detail("a.count", 1);
        builder.build()
    }

    #[test]
    fn oneline_has_status_only() {
        let report = render_report(
            &[result("a", HealthState::Up), failing("db")],
            ExposureLevel::Oneline,
            true,
            ReportOptions::default(),
        );
        assert_eq!(report, json!({ "status": "DOWN" }));
    }

    #[test]
    fn default_level_lists_only_down_checks() {
        let report = render_report(
            &[result("a", HealthState::Up), failing("db")],
            ExposureLevel::Default,
            true,
            ReportOptions::default(),
        );
        assert_eq!(
            report,
            json!({
                "status": "DOWN",
                "checks": [
                    { "name": "db", "status": "DOWN", "group": "storage", "message": "ping failed" }
                ]
            })
        );
    }

    #[test]
    fn default_level_omits_checks_when_all_up() {
        let report = render_report(
            &[result("a", HealthState::Up)],
            ExposureLevel::Default,
            true,
            ReportOptions::default(),
        );
        assert_eq!(report, json!({ "status": "UP" }));
    }

    #[test]
    fn full_level_includes_error_message_and_every_check() {
        let report = render_report(
            &[result("a", HealthState::Up), failing("db")],
            ExposureLevel::Full,
            true,
            ReportOptions::default(),
        );
        let checks = report["checks"].as_array().unwrap();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0]["name"], "a");
        assert_eq!(checks[1]["error-message"], "connect: timeout");
        assert!(checks[1].get("stack-trace").is_none());
        assert!(checks[1].get("data").is_none());
    }

    #[test]
    fn data_is_sorted_by_key() {
        let report = render_report(
            &[failing("db")],
            ExposureLevel::Default,
            true,
            ReportOptions {
                include_stack_trace: true,
                include_data: true,
            },
        );
        let check = &report["checks"][0];
        let keys: Vec<&String> = check["data"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a.count", "b.count"]);
        assert_eq!(check["error-message"], "connect: timeout");
        assert!(check["stack-trace"].as_str().unwrap().contains("timeout"));
    }

    #[test]
    fn liveness_tolerates_unknown() {
        let results = [result("a", HealthState::Unknown)];
        let live = render_report(&results, ExposureLevel::Oneline, false, ReportOptions::default());
        let ready = render_report(&results, ExposureLevel::Oneline, true, ReportOptions::default());
        assert_eq!(live["status"], "UP");
        assert_eq!(ready["status"], "DOWN");
    }

    #[test]
    fn exposure_level_parses() {
        assert_eq!("FULL".parse::<ExposureLevel>().unwrap(), ExposureLevel::Full);
        assert_eq!("oneline".parse::<ExposureLevel>().unwrap(), ExposureLevel::Oneline);
        assert!("verbose".parse::<ExposureLevel>().is_err());
        assert_eq!(ExposureLevel::default(), ExposureLevel::Default);
    }
}
