//! Scenario execution and reports.

use crate::config::Environment;
use crate::context::ScenarioContext;
use crate::model::ApiSnapshot;
use crate::steps::Step;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, instrument};

/// A scenario as written in a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Tags for filtering scenarios.
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
}

impl ScenarioFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Result of running a single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
    pub steps: Vec<StepReport>,
    pub calls: Vec<ApiSnapshot>,
    pub duration_ms: u64,
}

/// Result of running a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    pub keyword: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub environment: String,
    pub scenarios: Vec<ScenarioReport>,
    pub total_duration_ms: u64,
    pub timestamp: String,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.scenarios.iter().all(|s| s.success || s.skipped)
    }
}

/// Runs scenarios sequentially, one fresh [`ScenarioContext`] each.
#[derive(Debug)]
pub struct ScenarioRunner<T> {
    transport: T,
    tags: Vec<String>,
}

impl<T: Transport> ScenarioRunner<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            tags: Vec::new(),
        }
    }

    /// Only run scenarios carrying at least one of `tags`; the others
    /// are reported as skipped.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn is_selected(&self, scenario: &ScenarioFile) -> bool {
        self.tags.is_empty()
            || scenario
                .tags
                .iter()
                .any(|t| self.tags.iter().any(|f| f.eq_ignore_ascii_case(t)))
    }

    #[instrument(skip_all, fields(name = %scenario.name))]
    pub async fn run(
        &self,
        environment: &Environment,
        scenario: &ScenarioFile,
    ) -> ScenarioReport {
        let start_time = Instant::now();
        let mut context = ScenarioContext::new(environment.clone());
        context.skipped = !self.is_selected(scenario);

        let mut step_reports = Vec::new();
        let mut scenario_error = None;

        if context.skipped {
            info!("Skipping scenario: {}", scenario.name);
        } else {
            info!("Starting scenario: {}", scenario.name);
            for (step_idx, step) in scenario.steps.iter().enumerate() {
                info!(
                    "Running step {}/{}: {} {}",
                    step_idx + 1,
                    scenario.steps.len(),
                    step.keyword(),
                    step.id()
                );
                let step_start = Instant::now();
                let outcome = step.execute(&mut context, &self.transport).await;
                let error = outcome.err().map(|e| e.to_string());
                if let Some(err) = &error {
                    error!("Step {} failed: {}", step.id(), err);
                }
                step_reports.push(StepReport {
                    step: step.id().to_string(),
                    keyword: step.keyword().to_string(),
                    success: error.is_none(),
                    error: error.clone(),
                    duration_ms: step_start.elapsed().as_millis() as u64,
                });
                if let Some(err) = error {
                    scenario_error = Some(format!("step {} ({}) failed: {err}", step_idx + 1, step.id()));
                    break;
                }
            }
        }

        let report = ScenarioReport {
            name: scenario.name.clone(),
            success: !context.skipped && scenario_error.is_none(),
            skipped: context.skipped,
            error: scenario_error,
            steps: step_reports,
            calls: context.snapshots(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Scenario finished: {} ({} ms) - Success: {}",
            report.name, report.duration_ms, report.success
        );
        report
    }

    pub async fn run_all(
        &self,
        environment: &Environment,
        scenarios: &[ScenarioFile],
    ) -> RunReport {
        let start_time = Instant::now();
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(environment, scenario).await);
        }
        RunReport {
            environment: environment.name.clone(),
            scenarios: reports,
            total_duration_ms: start_time.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{environment, FailingTransport, StubTransport};
    use serde_json::json;

    const SCENARIO: &str = r#"
name: create user
tags: [smoke]
steps:
  - step: gateway
  - step: method
    method: POST
  - step: payload
    path: name
    value: john
  - step: run
  - step: status
    status: 201
  - step: body_equals
    path: id
    value: "7"
"#;

    #[tokio::test]
    async fn test_successful_scenario() {
        let scenario = ScenarioFile::from_yaml(SCENARIO).unwrap();
        let runner = ScenarioRunner::new(StubTransport::json(201, json!({"id": 7})));
        let report = runner.run(&environment(), &scenario).await;

        assert!(report.success, "{:?}", report.error);
        assert!(!report.skipped);
        assert_eq!(report.steps.len(), 6);
        assert_eq!(report.steps[3].keyword, "When");
        assert_eq!(report.calls.len(), 1);
        assert_eq!(report.calls[0].response.as_ref().unwrap().status_code, 201);
    }

    #[tokio::test]
    async fn test_failing_step_stops_scenario() {
        let scenario = ScenarioFile::from_yaml(SCENARIO).unwrap();
        let runner = ScenarioRunner::new(StubTransport::json(400, json!({})));
        let report = runner.run(&environment(), &scenario).await;

        assert!(!report.success);
        assert_eq!(report.steps.len(), 5);
        assert!(report.error.unwrap().contains("step 5 (status)"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let scenario = ScenarioFile::from_yaml(SCENARIO).unwrap();
        let runner = ScenarioRunner::new(FailingTransport("connection refused"));
        let report = runner.run(&environment(), &scenario).await;

        assert!(!report.success);
        assert_eq!(report.steps.len(), 4);
        assert!(report.calls[0].response.is_none());
        assert_eq!(report.calls[0].error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_tag_filter_skips_scenario() {
        let scenario = ScenarioFile::from_yaml(SCENARIO).unwrap();
        let runner = ScenarioRunner::new(StubTransport::json(201, json!({"id": 7})))
            .with_tags(vec!["nightly".into()]);
        let report = runner.run_all(&environment(), &[scenario]).await;

        assert!(report.scenarios[0].skipped);
        assert!(report.scenarios[0].steps.is_empty());
        assert!(report.success());
    }

    #[test]
    fn test_scenario_yaml_round_trip() {
        let scenario = ScenarioFile::from_yaml(SCENARIO).unwrap();
        let yaml = scenario.to_yaml().unwrap();
        let again = ScenarioFile::from_yaml(&yaml).unwrap();
        assert_eq!(again.steps, scenario.steps);
    }
}
