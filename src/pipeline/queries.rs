use tracing::{debug, info};

use super::parse::parse_query_list;
use super::prompts::search_query_prompt;
use super::{Batch, Phase, PhaseContext, PipelineError, PipelineObserver, RateLimitBudget};
use crate::gemini::{GeminiError, Prompt, TextGenerator};

/// Phase 1: set `search_queries` on every row. Returns the number of rows with queries.
pub async fn generate_queries<O: PipelineObserver>(
    generator: &impl TextGenerator,
    batch: &mut Batch,
    ctx: &PhaseContext<'_, O>,
) -> Result<usize, PipelineError> {
    let total = batch.rows.len();
    let mut with_queries = 0;

    for i in 0..total {
        if i > 0 && !ctx.pause(ctx.config.query_pacing).await {
            return Err(ctx.cancelled(Phase::QueryGeneration, i));
        }
        if ctx.cancel.is_cancelled() {
            return Err(ctx.cancelled(Phase::QueryGeneration, i));
        }
        ctx.observer.progress(Phase::QueryGeneration, i + 1, total);

        let prompt = search_query_prompt(&batch.query, &batch.rows[i]);
        let queries = queries_for_row(generator, &prompt, i + 1, total, ctx)
            .await
            .ok_or_else(|| ctx.cancelled(Phase::QueryGeneration, i))?;

        if !queries.is_empty() {
            with_queries += 1;
        }
        debug!(row = i + 1, queries = queries.len(), "search queries generated");
        batch.rows[i].set_search_queries(queries);
    }

    info!(rows = total, with_queries, "query generation finished");
    Ok(with_queries)
}

/// Queries for one row. `None` means cancelled mid-row.
///
/// Empty or unparseable output and rate limiting are retried through separate
/// budgets; any other failure yields an empty list.
async fn queries_for_row<O: PipelineObserver>(
    generator: &impl TextGenerator,
    prompt: &Prompt,
    row: usize,
    total: usize,
    ctx: &PhaseContext<'_, O>,
) -> Option<Vec<String>> {
    let config = ctx.config;
    let mut empty_attempts = 0;
    let mut budget = RateLimitBudget::new(config.max_rate_limit_wait);

    loop {
        match generator.generate(prompt).await {
            Ok(text) => {
                let queries = parse_query_list(&text).unwrap_or_else(|e| {
                    debug!(row, error = %e, "unparseable query list");
                    Vec::new()
                });
                if !queries.is_empty() {
                    return Some(queries);
                }

                empty_attempts += 1;
                ctx.observer.warning(&format!(
                    "Empty search queries for row {row}, attempt {empty_attempts}/{}",
                    config.max_query_attempts
                ));
                if empty_attempts >= config.max_query_attempts {
                    ctx.observer.warning(&format!(
                        "Failed to get valid search queries for row {row} after {} attempts",
                        config.max_query_attempts
                    ));
                    return Some(Vec::new());
                }
                if !ctx.pause(config.empty_retry_delay).await {
                    return None;
                }
            }
            Err(GeminiError::RateLimited) => {
                let wait = config.query_rate_limit_wait;
                if !budget.try_spend(wait) {
                    ctx.observer.warning(&format!(
                        "Rate limit persisted for row {row}/{total}, skipping its search queries"
                    ));
                    return Some(Vec::new());
                }
                ctx.observer.warning(&format!(
                    "Rate limit reached at row {row}/{total}. Waiting {}s...",
                    wait.as_secs_f32()
                ));
                if !ctx.pause(wait).await {
                    return None;
                }
            }
            Err(e) => {
                ctx.observer.warning(&format!(
                    "Error generating search queries for row {row}/{total}: {e}"
                ));
                return Some(Vec::new());
            }
        }
    }
}
