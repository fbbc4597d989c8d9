//! CLI command handlers.

mod errors;
mod params;

pub use errors::CommandError;
pub use params::{Cli, Command, InspectArgs, PreviewArgs, RunArgs};

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, validate_base_url};
use crate::export;
use crate::gemini::{GeminiClient, GeminiSettings};
use crate::pipeline::{Batch, Phase, Pipeline, PipelineError, PipelineObserver, RunSummary};
use crate::state::AppState;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Preview cells longer than this are cut.
const PREVIEW_CELL_CHARS: usize = 60;

pub async fn dispatch(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Command::Inspect(args) => inspect(&args),
        Command::Run(args) => {
            let config = Config::from_env()?;
            let cancel = CancellationToken::new();
            let interrupt = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, stopping after the current row");
                        cancel.cancel();
                    }
                }
            });
            let result = run(args, config, cancel).await;
            interrupt.abort();
            let summary = result?;
            println!(
                "{} rows, {} with queries, {} searches ({} failed), {} facts",
                summary.rows,
                summary.rows_with_queries,
                summary.searches,
                summary.failed_searches,
                summary.facts
            );
            Ok(())
        }
        Command::Preview(args) => preview(&args),
    }
}

fn inspect(args: &InspectArgs) -> Result<(), CommandError> {
    let mut state = AppState::new();
    state.load_dataset(&args.file)?;
    if let Some(dataset) = state.dataset() {
        println!("Records: {}", dataset.record_count());
        println!("Columns: {}", dataset.column_count());
        for name in dataset.column_names() {
            println!("  {name}");
        }
    }
    Ok(())
}

/// Load, extract rows, run every phase, then export.
///
/// The JSON dump is written whatever the outcome; the CSV only on success or with
/// `--export-partial`.
pub async fn run(
    args: RunArgs,
    config: Config,
    cancel: CancellationToken,
) -> Result<RunSummary, CommandError> {
    let pipeline_config = args.timing.to_pipeline_config()?;

    let mut state = AppState::new();
    state.load_dataset(&args.file)?;
    let rows = state.unique_rows(&args.columns)?.unwrap_or_default();
    info!(rows = rows.len(), columns = ?args.columns, "rows extracted");

    let mut batch = Batch::new(args.query, args.columns, rows);
    let observer = TracingObserver;

    let outcome = async {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let (searcher, extractor) = build_clients(&http, &config)?;
        let pipeline = Pipeline::new(&searcher, &searcher, extractor, pipeline_config)
            .with_cancellation(cancel);
        Ok::<_, CommandError>(pipeline.run(&mut batch, &observer).await?)
    }
    .await;

    export::write_json_dump(&batch.rows, &args.dump)?;
    if outcome.is_ok() || args.export_partial {
        observer.progress(Phase::Export, 1, 1);
        export::write_csv_file(&batch.columns, &batch.rows, &args.output)?;
    }
    outcome
}

/// Search agent and extraction client. A bad base URL fails search agent setup.
fn build_clients(
    http: &Client,
    config: &Config,
) -> Result<(GeminiClient, Option<GeminiClient>), PipelineError> {
    let base_url = validate_base_url(&config.search.base_url)
        .map_err(|e| PipelineError::AgentSetup(e.to_string()))?;
    let with_base = |settings: &GeminiSettings| GeminiSettings {
        base_url: base_url.clone(),
        ..settings.clone()
    };

    let searcher = GeminiClient::new(http.clone(), &with_base(&config.search));
    let extractor = config
        .extract
        .as_ref()
        .map(|s| GeminiClient::new(http.clone(), &with_base(s)));
    info!(
        model = searcher.model(),
        extract_model = extractor.as_ref().map(GeminiClient::model),
        "model clients ready"
    );
    Ok((searcher, extractor))
}

fn preview(args: &PreviewArgs) -> Result<(), CommandError> {
    let (header, rows) = export::load_csv(&args.file)?;
    let schema = export::export_schema(&header, &rows);
    println!("{}", schema.join(" | "));
    for row in rows.iter().take(args.limit) {
        let cells: Vec<String> = schema
            .iter()
            .map(|key| {
                let text = row.get(key).map(|c| c.to_flat_string()).unwrap_or_default();
                truncate_cell(&text)
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    if rows.len() > args.limit {
        println!("... {} more rows", rows.len() - args.limit);
    }
    Ok(())
}

fn truncate_cell(text: &str) -> String {
    if text.len() <= PREVIEW_CELL_CHARS {
        return text.to_string();
    }
    let end = text.floor_char_boundary(PREVIEW_CELL_CHARS);
    format!("{}...", &text[..end])
}

/// Reports pipeline progress and warnings through `tracing`.
struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn progress(&self, phase: Phase, current: usize, total: usize) {
        info!(%phase, current, total, "progress");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_cell_respects_char_boundaries() {
        assert_eq!(truncate_cell("Kent"), "Kent");
        let long = "é".repeat(40);
        let cut = truncate_cell(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= PREVIEW_CELL_CHARS + 3);
    }
}

#[cfg(test)]
mod http_tests {
    use std::path::Path;

    use clap::Parser;
    use wiremock::matchers::{body_string_contains, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{BASE_URL_VAR, EXTRACT_KEY_VAR, SEARCH_KEY_VAR};
    use crate::table::TableError;

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
        }))
    }

    async fn mount(server: &MockServer, marker: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .and(body_string_contains(marker))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn config(base_url: &str, with_extract: bool) -> Config {
        let base_url = base_url.to_string();
        Config::from_lookup(move |key| match key {
            SEARCH_KEY_VAR => Some("search-key".into()),
            EXTRACT_KEY_VAR if with_extract => Some("extract-key".into()),
            BASE_URL_VAR => Some(base_url.clone()),
            _ => None,
        })
        .unwrap()
    }

    fn run_args(dir: &Path, extra: &[&str]) -> RunArgs {
        let input = dir.join("counties.csv");
        std::fs::write(&input, "County,Code\nKent,1\nKent,2\n").unwrap();
        let mut argv = vec![
            "rowscout".to_string(),
            "run".into(),
            input.display().to_string(),
            "-c".into(),
            "County".into(),
            "-q".into(),
            "population".into(),
            "--min-delay".into(),
            "0".into(),
            "--max-delay".into(),
            "0".into(),
            "--extract-delay".into(),
            "0".into(),
            "--output".into(),
            dir.join("output.csv").display().to_string(),
            "--dump".into(),
            dir.join("dump.json").display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let Command::Run(args) = Cli::try_parse_from(argv).unwrap().command else {
            panic!("expected run");
        };
        args
    }

    #[tokio::test]
    async fn run_end_to_end_writes_csv_and_dump() {
        let server = MockServer::start().await;
        mount(&server, "User's query", text_response("[\"Kent population 2024\"]")).await;
        mount(&server, "google_search", text_response("Kent has about 1,600,000 residents.")).await;
        mount(&server, "data extraction assistant", text_response("[\"Population\", \"1,600,000\"]")).await;

        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path(), &[]);
        let summary = run(args, config(&server.uri(), true), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(summary.facts, 1);
        let csv = std::fs::read_to_string(dir.path().join("output.csv")).unwrap();
        assert_eq!(csv, "County,Population\nKent,1600000\n");

        let dump: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("dump.json")).unwrap())
                .unwrap();
        assert_eq!(dump[0]["search_queries"][0], "Kent population 2024");
        assert_eq!(dump[0]["one_value"][0], "Kent has about 1,600,000 residents.");
    }

    #[tokio::test]
    async fn missing_extraction_key_writes_dump_but_no_csv() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path(), &[]);

        let err = run(args, config(&server.uri(), false), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommandError::Pipeline(PipelineError::MissingCredential(EXTRACT_KEY_VAR))
        ));
        assert!(dir.path().join("dump.json").exists());
        assert!(!dir.path().join("output.csv").exists());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_base_url_is_agent_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path(), &["--export-partial"]);

        let err = run(args, config("ftp://example.com", true), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Pipeline(PipelineError::AgentSetup(_))));
        let csv = std::fs::read_to_string(dir.path().join("output.csv")).unwrap();
        assert_eq!(csv, "County\nKent\n");
    }

    #[tokio::test]
    async fn header_only_dataset_exports_reloadable_csv() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path(), &[]);
        std::fs::write(&args.file, "County,Code\n").unwrap();
        let output = args.output.clone();

        let summary = run(args, config(&server.uri(), true), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.rows, 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "County\n");
        let (header, rows) = export::load_csv(&output).unwrap();
        assert_eq!(header, ["County"]);
        assert!(rows.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_column_fails_before_any_request() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_args(dir.path(), &[]);
        args.columns = vec!["Borough".into()];

        let err = run(args, config(&server.uri(), true), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Table(TableError::UnknownColumn(_))));
        assert!(!dir.path().join("dump.json").exists());
    }
}
