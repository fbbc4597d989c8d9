use tracing::{debug, info};

use super::{Batch, Phase, PhaseContext, PipelineError, PipelineObserver, SEARCH_ERROR};
use crate::gemini::grounding::render_search_text;
use crate::gemini::{GeminiError, SearchClient};

/// Phase 2: run each row's queries through the search agent and set `one_value`.
///
/// Returns `(searches, failed)`. Per-query failures record [`SEARCH_ERROR`] and never
/// stop the batch.
pub async fn execute_searches<O: PipelineObserver>(
    searcher: &impl SearchClient,
    batch: &mut Batch,
    ctx: &PhaseContext<'_, O>,
) -> Result<(usize, usize), PipelineError> {
    let total = batch.rows.len();
    let mut searches = 0;
    let mut failed = 0;
    let mut first_search = true;

    for i in 0..total {
        if ctx.cancel.is_cancelled() {
            return Err(ctx.cancelled(Phase::Search, i));
        }
        ctx.observer.progress(Phase::Search, i + 1, total);

        let queries: Vec<String> = batch.rows[i]
            .search_queries()
            .iter()
            .take(ctx.config.max_queries)
            .cloned()
            .collect();

        let mut results = Vec::with_capacity(queries.len());
        for (q, query) in queries.iter().enumerate() {
            if !first_search {
                let delay = ctx.config.search_delay.sample();
                debug!(delay_ms = delay.as_millis() as u64, "pausing between searches");
                if !ctx.pause(delay).await {
                    return Err(ctx.cancelled(Phase::Search, i));
                }
            }
            first_search = false;

            debug!(row = i + 1, query = q + 1, of = queries.len(), %query, "searching");
            searches += 1;
            let outcome = searcher
                .search(query)
                .await
                .and_then(|r| render_search_text(&r).ok_or(GeminiError::EmptyAnswer));
            match outcome {
                Ok(text) => results.push(text),
                Err(e) => {
                    failed += 1;
                    ctx.observer.warning(&format!(
                        "Error searching '{query}' for row {}/{total}: {e}",
                        i + 1
                    ));
                    results.push(SEARCH_ERROR.to_string());
                }
            }
        }

        batch.rows[i].set_one_value(results);
    }

    info!(rows = total, searches, failed, "search phase finished");
    Ok((searches, failed))
}
