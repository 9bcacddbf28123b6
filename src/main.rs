//! Analyst CLI
//!
//! 对一个问题文件（及若干 CSV）跑一次分析：结果 JSON 打印到 stdout，进度与日志写 stderr。
//!
//! 用法: analyst [--config PATH] [--analyzer agentic|stats] [--max-retries N] QUESTION_FILE [DATA_FILE]...

use std::path::PathBuf;

use analyst::analyzer::{create_analyzer, AgenticAnalyzer};
use analyst::config::load_config;
use analyst::core::{PipelineEvent, PipelinePhase};
use analyst::pipeline::AnalysisRequest;
use anyhow::Context;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "analyst", about = "LLM-powered data analyst", version)]
struct Cli {
    /// Text file containing the analysis question(s).
    #[arg(value_name = "QUESTION_FILE")]
    question_file: PathBuf,

    /// Data files made available to the generated script.
    #[arg(value_name = "DATA_FILE")]
    data_files: Vec<PathBuf>,

    /// Extra TOML config file layered over config/default.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Analyzer to run (agentic|stats).
    #[arg(long)]
    analyzer: Option<String>,

    /// Maximum number of repair-and-re-execute cycles.
    #[arg(long = "max-retries")]
    max_retries: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    analyst::observability::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(analyzer) = cli.analyzer {
        cfg.pipeline.analyzer = analyzer;
    }
    if let Some(n) = cli.max_retries {
        cfg.pipeline.max_retries = n;
    }

    let request = AnalysisRequest::load(&cli.question_file, &cli.data_files)
        .await
        .context("Failed to prepare analysis request")?;

    let value = if cfg.pipeline.analyzer.eq_ignore_ascii_case("agentic") {
        // 直接驱动流水线以便把进度事件打到 stderr
        let agentic = AgenticAnalyzer::from_config(&cfg).context("Failed to build analyzer")?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                print_event(&ev);
            }
        });
        let run = agentic.pipeline().run_with_events(&request, Some(&tx)).await;
        drop(tx);
        let _ = printer.await;
        let run = run.context("Analysis failed")?;
        if run.tokens.total() > 0 {
            eprintln!(
                "[usage] {} prompt + {} completion tokens",
                run.tokens.prompt, run.tokens.completion
            );
        }
        run.result.into_json()
    } else {
        let analyzer = create_analyzer(&cfg).context("Failed to build analyzer")?;
        analyzer.analyze(&request).await.context("Analysis failed")?
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_event(ev: &PipelineEvent) {
    match ev {
        PipelineEvent::PhaseChanged { phase } => match phase {
            PipelinePhase::Planning => eprintln!("[plan] asking for analysis steps"),
            PipelinePhase::Generating => eprintln!("[generate] writing analysis script"),
            PipelinePhase::Executing { attempt } => eprintln!("[execute] attempt {}", attempt),
            PipelinePhase::Repairing { attempt } => eprintln!("[repair] retry {}", attempt),
            PipelinePhase::DoneSuccess => eprintln!("[done] success"),
            PipelinePhase::DoneFailure => eprintln!("[done] retries exhausted"),
        },
        PipelineEvent::Planned { steps } => {
            for line in steps.lines().filter(|l| !l.trim().is_empty()) {
                eprintln!("    {}", line);
            }
        }
        PipelineEvent::AttemptFailed { attempt, reason } => {
            // Traceback 的最后一行通常就是异常本身
            let last = reason.lines().last().unwrap_or_default();
            eprintln!("[execute] attempt {} failed: {}", attempt, last);
        }
        PipelineEvent::RepairTimedOut { attempt } => {
            eprintln!("[repair] retry {} timed out, keeping previous script", attempt)
        }
    }
}
