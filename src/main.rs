//! Demo entrypoint for the incident response pipeline.
//!
//! Wires a [`System`] out of the in-memory mock collaborators (no real
//! cloud credentials, LLM, or SOP store required) and drives it through two
//! of the scenarios from the specification's end-to-end list: an alarm
//! webhook notification and a proactive-scheduler heartbeat tick. This is a
//! demonstration harness, not a production server — the HTTP surface,
//! Kubernetes wrapper, and CLI command tree described in the specification
//! are out of scope for this core crate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use incident_pipeline::domain::models::{
    AlarmInfo, AlarmState, Comparison, MetricDataPoint, SourceName, Statistic,
};
use incident_pipeline::domain::ports::SourcePayload;
use incident_pipeline::infrastructure::config::ConfigLoader;
use incident_pipeline::infrastructure::logging;
use incident_pipeline::infrastructure::mock::{
    MockCloudSource, MockKnowledgeBase, MockRcaAnalyzer, MockSopBridge, MockSopExecutor,
};
use incident_pipeline::{CloudSources, Collaborators, System};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// Drive the pipeline via `AlarmIngestor`, as a CloudWatch-style alarm
    /// webhook notification would.
    Alarm,
    /// Drive the pipeline via one `ProactiveScheduler` heartbeat tick.
    Heartbeat,
    /// Run both scenarios in sequence.
    Both,
}

#[derive(Debug, Parser)]
#[command(name = "incident-pipeline", about = "Autonomous cloud incident response pipeline demo runner")]
struct Cli {
    /// Which scenario to run against the in-memory mock collaborators.
    #[arg(long, value_enum, default_value = "both")]
    scenario: Scenario,

    /// Path to a YAML config file; falls back to built-in defaults plus
    /// `INCIDENT_*` environment overrides when omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

/// Builds the demo `System`: mock cloud sources seeded with a CPU-exhaustion
/// scenario on `i-demo0001`, plus mock RCA/SOP/knowledge-base collaborators.
fn build_demo_system(config: incident_pipeline::infrastructure::config::settings::Config) -> Arc<System> {
    let now = Utc::now();

    let mut sources: CloudSources = HashMap::new();
    sources.insert(
        SourceName::Metrics,
        Arc::new(MockCloudSource::new(
            SourceName::Metrics,
            SourcePayload::Metrics(vec![MetricDataPoint {
                resource_id: "i-demo0001".to_string(),
                metric_name: "CPUUtilization".to_string(),
                namespace: "AWS/EC2".to_string(),
                value: 94.5,
                unit: "Percent".to_string(),
                timestamp: now,
                statistic: Statistic::Average,
            }]),
        )),
    );
    sources.insert(
        SourceName::Alarms,
        Arc::new(MockCloudSource::new(
            SourceName::Alarms,
            SourcePayload::Alarms(vec![AlarmInfo {
                name: "HighCPU".to_string(),
                state: AlarmState::Alarm,
                reason: "Threshold crossed: 94.5 > 90".to_string(),
                metric_name: "CPUUtilization".to_string(),
                threshold: 90.0,
                comparison: Comparison::GreaterThan,
                resource_id: "i-demo0001".to_string(),
                timestamp: now,
            }]),
        )),
    );
    sources.insert(
        SourceName::Trail,
        Arc::new(MockCloudSource::new(SourceName::Trail, SourcePayload::Trail(Vec::new()))),
    );
    sources.insert(
        SourceName::Anomaly,
        Arc::new(MockCloudSource::new(SourceName::Anomaly, SourcePayload::Anomaly(Vec::new()))),
    );
    sources.insert(
        SourceName::Health,
        Arc::new(MockCloudSource::new(SourceName::Health, SourcePayload::Health(Vec::new()))),
    );

    let collaborators = Collaborators {
        rca_analyzer: Arc::new(MockRcaAnalyzer::new()),
        sop_bridge: Arc::new(MockSopBridge::new()),
        sop_executor: Arc::new(MockSopExecutor::new()),
        knowledge_base: Arc::new(MockKnowledgeBase::new()),
    };

    Arc::new(System::new(config, sources, collaborators))
}

/// §6.1 scenario 1: a CloudWatch-style alarm notification envelope.
fn alarm_webhook_payload() -> serde_json::Value {
    serde_json::json!({
        "Message": serde_json::to_string(&serde_json::json!({
            "AlarmName": "HighCPU",
            "NewStateValue": "ALARM",
            "OldStateValue": "OK",
            "Region": "us-east-1",
            "Trigger": {
                "Namespace": "AWS/EC2",
                "MetricName": "CPUUtilization",
                "Threshold": 90.0,
            },
        })).expect("static payload serializes"),
    })
}

async fn run_alarm_scenario(system: &System) -> Result<()> {
    info!("running alarm webhook scenario");
    let outcome = system.alarm_ingestor.handle(alarm_webhook_payload()).await;
    println!("alarm scenario outcome:\n{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run_heartbeat_scenario(system: &Arc<System>) -> Result<()> {
    info!("running proactive scheduler heartbeat scenario");
    let result = system.scheduler.trigger_event("quick_scan", serde_json::json!({})).await;
    println!("heartbeat scenario outcome:\n{result:#?}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().unwrap_or_default(),
    };

    let _logger_guard = logging::init(&config.logging)?;
    info!(region = %config.region, "incident pipeline demo starting");

    let system = build_demo_system(config);

    match cli.scenario {
        Scenario::Alarm => run_alarm_scenario(&system).await?,
        Scenario::Heartbeat => run_heartbeat_scenario(&system).await?,
        Scenario::Both => {
            run_alarm_scenario(&system).await?;
            run_heartbeat_scenario(&system).await?;
        }
    }

    let stats = system.orchestrator.stats();
    println!("orchestrator stats:\n{stats:#?}");

    Ok(())
}
