//! restbdd CLI - runs YAML API scenarios and lists the available steps.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use restbdd::config::{DEFAULT_CONFIG_FILE, ENV_VARIABLE};
use restbdd::steps::catalog;
use restbdd::{
    Keyword, ProjectConfig, ReqwestTransport, RunReport, ScenarioLoader, ScenarioReport,
    ScenarioRunner,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// BDD-style HTTP API scenario runner.
#[derive(Parser, Debug)]
#[command(name = "restbdd", version = restbdd::VERSION, about)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scenario files against an environment.
    Run {
        /// Scenario file or directory paths.
        #[arg(short = 'p', long = "path", default_value = "tests/scenarios")]
        paths: Vec<PathBuf>,

        /// Project configuration file.
        #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Environment to run against.
        #[arg(short = 'e', long = "env", env = ENV_VARIABLE)]
        env: Option<String>,

        /// Only run scenarios carrying one of these tags.
        #[arg(short = 't', long = "tags", value_delimiter = ',')]
        tags: Vec<String>,

        /// Filter scenarios by name (partial match).
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,

        /// Directory to save the report file.
        #[arg(short = 'r', long = "report-dir")]
        report_dir: Option<PathBuf>,

        /// Report output format.
        #[arg(long = "report-format", default_value = "text")]
        report_format: ReportFormat,
    },
    /// List the available steps.
    Steps {
        /// Only list steps for one keyword.
        keyword: Option<KeywordArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum KeywordArg {
    Given,
    When,
    Then,
}

impl From<KeywordArg> for Keyword {
    fn from(arg: KeywordArg) -> Self {
        match arg {
            KeywordArg::Given => Keyword::Given,
            KeywordArg::When => Keyword::When,
            KeywordArg::Then => Keyword::Then,
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn print_scenario(report: &ScenarioReport) {
    let status = if report.skipped {
        "\x1b[33mSKIP\x1b[0m"
    } else if report.success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!("{} scenario: {} ({} ms)", status, report.name, report.duration_ms);

    for (i, step) in report.steps.iter().enumerate() {
        let mark = if step.success {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        info!(
            "  {}. {} {} {} ({} ms)",
            i + 1,
            mark,
            step.keyword,
            step.step,
            step.duration_ms
        );
        if let Some(error) = &step.error {
            error!("     \x1b[31mError: {}\x1b[0m", error);
        }
    }

    for call in &report.calls {
        if let Some(request) = &call.request {
            debug!("     Request: {} {}", request.method, request.url);
        }
        if let Some(response) = &call.response {
            debug!(
                "     Response: Status {} ({} ms)",
                response.status_code, response.timing_ms
            );
        }
    }
}

fn render_text(report: &RunReport) -> String {
    let mut content = String::new();
    content.push_str(&format!("Environment: {}\n", report.environment));
    content.push_str(&format!("Timestamp: {}\n\n", report.timestamp));
    for scenario in &report.scenarios {
        let status = if scenario.skipped {
            "SKIP"
        } else if scenario.success {
            "PASS"
        } else {
            "FAIL"
        };
        content.push_str(&format!("Scenario: {} ({status})\n", scenario.name));
        if let Some(error) = &scenario.error {
            content.push_str(&format!("  Error: {error}\n"));
        }
        for (i, step) in scenario.steps.iter().enumerate() {
            content.push_str(&format!(
                "  {}. {} {} ({})\n",
                i + 1,
                step.keyword,
                step.step,
                if step.success { "PASS" } else { "FAIL" }
            ));
        }
        content.push('\n');
    }
    content.push_str(&format!("Duration: {} ms\n", report.total_duration_ms));
    content
}

fn save_report(report: &RunReport, report_dir: &Path, format: ReportFormat) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("report-{timestamp}.json"),
            serde_json::to_string_pretty(report)?,
        ),
        ReportFormat::Yaml => (
            format!("report-{timestamp}.yaml"),
            serde_yaml::to_string(report)?,
        ),
        ReportFormat::Text => (format!("report-{timestamp}.txt"), render_text(report)),
    };

    let file_path = report_dir.join(filename);
    let mut file = File::create(&file_path)?;
    file.write_all(content.as_bytes())?;
    Ok(file_path)
}

fn list_steps(keyword: Option<KeywordArg>) {
    for doc in catalog(keyword.map(Keyword::from)) {
        println!("{:<6} {:<26} {}", doc.keyword, doc.id, doc.phrase);
        println!("{:<33}{}", "", doc.description);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    paths: Vec<PathBuf>,
    config: PathBuf,
    env: Option<String>,
    tags: Vec<String>,
    filter: Option<String>,
    report_dir: Option<PathBuf>,
    report_format: ReportFormat,
) -> Result<bool> {
    let project = ProjectConfig::load(&config)?;
    let environment = project.select(env.as_deref())?;
    info!("Using environment: {}", environment.name);

    let mut scenarios = ScenarioLoader::with_paths(&paths).load_all()?;
    if let Some(filter) = &filter {
        let filter = filter.to_lowercase();
        scenarios.retain(|s| s.name.to_lowercase().contains(&filter));
    }
    if scenarios.is_empty() {
        return Err(anyhow!("No scenarios found"));
    }

    let transport = ReqwestTransport::new(Duration::from_secs(environment.timeout))
        .context("Failed to initialise HTTP transport")?;
    let runner = ScenarioRunner::new(transport).with_tags(tags);

    info!("Running {} scenario(s)...", scenarios.len());
    let report = runner.run_all(&environment, &scenarios).await;
    for scenario in &report.scenarios {
        print_scenario(scenario);
    }

    let passed = report.scenarios.iter().filter(|s| s.success).count();
    let skipped = report.scenarios.iter().filter(|s| s.skipped).count();
    let failed = report.scenarios.len() - passed - skipped;
    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[33mSkipped: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        report.scenarios.len(),
        passed,
        skipped,
        failed,
        report.total_duration_ms
    );

    match report_dir {
        Some(dir) => {
            let path = save_report(&report, &dir, report_format)?;
            info!("Report saved: {}", path.display());
        }
        None if report_format != ReportFormat::Text => {
            let content = match report_format {
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
                _ => serde_yaml::to_string(&report)?,
            };
            println!("{content}");
        }
        None => {}
    }

    Ok(report.success())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Steps { keyword } => list_steps(keyword),
        Command::Run {
            paths,
            config,
            env,
            tags,
            filter,
            report_dir,
            report_format,
        } => {
            let success =
                run(paths, config, env, tags, filter, report_dir, report_format).await?;
            if !success {
                exit(1);
            }
        }
    }

    Ok(())
}
