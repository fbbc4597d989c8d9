//! Enrichment pipeline: query generation, search, then fact extraction.
//!
//! Phases run strictly one after another over the whole batch, rows strictly in
//! order. Row-level failures never escape their row; [`PipelineError`] is only
//! returned for conditions that stop the batch.

mod facts;
pub mod parse;
mod prompts;
mod queries;
mod search;

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gemini::{SearchClient, TextGenerator};
use crate::table::{Cell, Row};
use crate::table::row::is_working_field;
use parse::Fact;

pub use facts::extract_facts;
pub use queries::generate_queries;
pub use search::execute_searches;

/// Placeholder recorded in `one_value` when a search fails.
pub const SEARCH_ERROR: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    QueryGeneration,
    Search,
    FactExtraction,
    Export,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::QueryGeneration => "generating search queries",
            Phase::Search => "searching",
            Phase::FactExtraction => "extracting facts",
            Phase::Export => "exporting",
        })
    }
}

/// Receives progress and non-fatal warnings while the pipeline runs.
pub trait PipelineObserver {
    fn progress(&self, phase: Phase, current: usize, total: usize);
    fn warning(&self, message: &str);
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0} is not set; fact extraction cannot run")]
    MissingCredential(&'static str),

    #[error("search agent setup failed: {0}")]
    AgentSetup(String),

    #[error("cancelled while {phase} ({completed} rows completed)")]
    Cancelled { phase: Phase, completed: usize },
}

/// Uniform random delay range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(fastrand::u64(..=span))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Attempts per row before giving up on an empty query list.
    pub max_query_attempts: u32,
    pub empty_retry_delay: Duration,
    pub query_rate_limit_wait: Duration,
    /// Pause between rows in the query phase.
    pub query_pacing: Duration,
    pub max_queries: usize,
    pub search_delay: DelayRange,
    pub extract_delay: Duration,
    pub extract_rate_limit_wait: Duration,
    /// Upper bound on total rate-limit waiting for a single row.
    pub max_rate_limit_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_query_attempts: 3,
            empty_retry_delay: Duration::from_secs(2),
            query_rate_limit_wait: Duration::from_secs(3),
            query_pacing: Duration::from_secs(2),
            max_queries: 3,
            search_delay: DelayRange {
                min: Duration::from_secs(1),
                max: Duration::from_secs(3),
            },
            extract_delay: Duration::from_secs(2),
            extract_rate_limit_wait: Duration::from_secs(39),
            max_rate_limit_wait: Duration::from_secs(600),
        }
    }
}

/// All rows processed for one user query.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub query: String,
    /// Source columns every row started with.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(query: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            query: query.into(),
            columns,
            rows,
        }
    }

    /// Fields that are neither source columns nor working fields.
    pub fn fact_keys<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a str> {
        row.keys()
            .filter(|k| !is_working_field(k) && !self.columns.iter().any(|c| c == k))
    }

    /// Store `fact` on row `index`, replacing any fact stored earlier.
    ///
    /// Returns the source column value the fact overwrote, if its type names one.
    fn set_fact(&mut self, index: usize, fact: Fact) -> Option<Cell> {
        let stale: Vec<String> = self
            .fact_keys(&self.rows[index])
            .map(str::to_string)
            .collect();
        let is_column = self.columns.iter().any(|c| *c == fact.kind);
        let row = &mut self.rows[index];
        for key in stale {
            row.remove(&key);
        }
        let replaced = if is_column { row.get(&fact.kind).cloned() } else { None };
        row.insert(fact.kind, fact.value);
        replaced
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub rows_with_queries: usize,
    pub searches: usize,
    pub failed_searches: usize,
    pub facts: usize,
}

/// Owns the model clients and runs every phase over a batch.
pub struct Pipeline<G, S, E> {
    generator: G,
    searcher: S,
    extractor: Option<E>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<G, S, E> Pipeline<G, S, E>
where
    G: TextGenerator,
    S: SearchClient,
    E: TextGenerator,
{
    pub fn new(generator: G, searcher: S, extractor: Option<E>, config: PipelineConfig) -> Self {
        Self {
            generator,
            searcher,
            extractor,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run all phases. On error, rows completed before the failure keep their fields.
    pub async fn run(
        &self,
        batch: &mut Batch,
        observer: &impl PipelineObserver,
    ) -> Result<RunSummary, PipelineError> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or(PipelineError::MissingCredential(crate::config::EXTRACT_KEY_VAR))?;

        info!(rows = batch.rows.len(), query = %batch.query, "pipeline started");

        let ctx = PhaseContext {
            config: &self.config,
            cancel: &self.cancel,
            observer,
        };

        let rows_with_queries = generate_queries(&self.generator, batch, &ctx).await?;
        let (searches, failed_searches) = execute_searches(&self.searcher, batch, &ctx).await?;
        let facts = extract_facts(Some(extractor), batch, &ctx).await?;

        let summary = RunSummary {
            rows: batch.rows.len(),
            rows_with_queries,
            searches,
            failed_searches,
            facts,
        };
        info!(?summary, "pipeline finished");
        Ok(summary)
    }
}

/// Shared inputs of every phase.
pub struct PhaseContext<'a, O> {
    pub config: &'a PipelineConfig,
    pub cancel: &'a CancellationToken,
    pub observer: &'a O,
}

impl<O> PhaseContext<'_, O> {
    fn cancelled(&self, phase: Phase, completed: usize) -> PipelineError {
        PipelineError::Cancelled { phase, completed }
    }

    /// Sleep for `duration`; `false` if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Tracks rate-limit waiting spent on one row.
struct RateLimitBudget {
    spent: Duration,
    max: Duration,
}

impl RateLimitBudget {
    fn new(max: Duration) -> Self {
        Self {
            spent: Duration::ZERO,
            max,
        }
    }

    /// Reserve `wait` if it fits in the budget.
    fn try_spend(&mut self, wait: Duration) -> bool {
        if self.spent + wait > self.max {
            return false;
        }
        self.spent += wait;
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::gemini::types::{GroundedResult, Source};
    use crate::gemini::{GeminiError, Prompt};

    /// Replays scripted generation responses and records prompts.
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, GeminiError>>>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedGenerator {
        pub fn new(responses: Vec<Result<String, GeminiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<Prompt> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &Prompt) -> Result<String, GeminiError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GeminiError::EmptyAnswer))
        }
    }

    /// Answers every query with `answer for <query>` unless the query is listed as failing.
    pub struct EchoSearch {
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl EchoSearch {
        pub fn new() -> Self {
            Self::failing(&[])
        }

        pub fn failing(queries: &[&str]) -> Self {
            Self {
                failing: queries.iter().map(|q| q.to_string()).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn captured_queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SearchClient for EchoSearch {
        async fn search(&self, query: &str) -> Result<GroundedResult, GeminiError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing.iter().any(|q| q == query) {
                return Err(GeminiError::Api {
                    code: 500,
                    message: "boom".into(),
                });
            }
            Ok(GroundedResult {
                answer: Some(format!("answer for {query}")),
                sources: vec![Source {
                    url: "https://example.com".into(),
                }],
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingObserver {
        pub progress: RefCell<Vec<(Phase, usize, usize)>>,
        pub warnings: RefCell<Vec<String>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn progress(&self, phase: Phase, current: usize, total: usize) {
            self.progress.borrow_mut().push((phase, current, total));
        }

        fn warning(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }
    }

    pub fn fast_config() -> PipelineConfig {
        PipelineConfig {
            max_query_attempts: 3,
            empty_retry_delay: Duration::ZERO,
            query_rate_limit_wait: Duration::ZERO,
            query_pacing: Duration::ZERO,
            max_queries: 3,
            search_delay: DelayRange {
                min: Duration::ZERO,
                max: Duration::ZERO,
            },
            extract_delay: Duration::ZERO,
            extract_rate_limit_wait: Duration::ZERO,
            max_rate_limit_wait: Duration::from_secs(600),
        }
    }

    pub fn batch(counties: &[&str]) -> Batch {
        let rows = counties
            .iter()
            .map(|c| [("County", *c)].into_iter().collect())
            .collect();
        Batch::new("population", vec!["County".to_string()], rows)
    }
}
