use tracing::{debug, info};

use super::parse::{Fact, parse_fact};
use super::prompts::fact_prompt;
use super::{Batch, Phase, PhaseContext, PipelineError, PipelineObserver, RateLimitBudget};
use crate::config::EXTRACT_KEY_VAR;
use crate::gemini::{GeminiError, Prompt, TextGenerator};

/// Phase 3: distil each row's search results into one `(type, value)` field.
///
/// Without an extraction client nothing is processed. Returns the number of rows
/// that gained a fact.
pub async fn extract_facts<O: PipelineObserver>(
    extractor: Option<&impl TextGenerator>,
    batch: &mut Batch,
    ctx: &PhaseContext<'_, O>,
) -> Result<usize, PipelineError> {
    let extractor = extractor.ok_or(PipelineError::MissingCredential(EXTRACT_KEY_VAR))?;
    let total = batch.rows.len();
    let mut facts = 0;

    for i in 0..total {
        if i > 0 && !ctx.pause(ctx.config.extract_delay).await {
            return Err(ctx.cancelled(Phase::FactExtraction, i));
        }
        if ctx.cancel.is_cancelled() {
            return Err(ctx.cancelled(Phase::FactExtraction, i));
        }
        ctx.observer.progress(Phase::FactExtraction, i + 1, total);

        let prompt = fact_prompt(&batch.rows[i]);
        let Some(outcome) = fact_for_row(extractor, &prompt, i + 1, ctx).await else {
            return Err(ctx.cancelled(Phase::FactExtraction, i));
        };
        if let Some(fact) = outcome {
            debug!(row = i + 1, kind = %fact.kind, value = %fact.value, "fact extracted");
            let kind = fact.kind.clone();
            if let Some(previous) = batch.set_fact(i, fact) {
                ctx.observer.warning(&format!(
                    "Fact type '{kind}' for row {} replaced source column value '{}'",
                    i + 1,
                    previous.to_flat_string()
                ));
            }
            facts += 1;
        }
    }

    info!(rows = total, facts, "fact extraction finished");
    Ok(facts)
}

/// `None` when cancelled; `Some(None)` when the row yields no fact.
async fn fact_for_row<O: PipelineObserver>(
    extractor: &impl TextGenerator,
    prompt: &Prompt,
    row: usize,
    ctx: &PhaseContext<'_, O>,
) -> Option<Option<Fact>> {
    let wait = ctx.config.extract_rate_limit_wait;
    let mut budget = RateLimitBudget::new(ctx.config.max_rate_limit_wait);

    loop {
        match extractor.generate(prompt).await {
            Ok(text) => {
                return match parse_fact(&text) {
                    Ok(fact) => Some(Some(fact)),
                    Err(e) => {
                        ctx.observer
                            .warning(&format!("Could not parse fact for row {row}: {e}"));
                        Some(None)
                    }
                };
            }
            Err(GeminiError::RateLimited) => {
                if !budget.try_spend(wait) {
                    ctx.observer.warning(&format!(
                        "Rate limit persisted for row {row} beyond {}s, skipping it",
                        ctx.config.max_rate_limit_wait.as_secs()
                    ));
                    return Some(None);
                }
                ctx.observer.warning(&format!(
                    "Rate limit reached at row {row}. Waiting {}s...",
                    wait.as_secs_f32()
                ));
                if !ctx.pause(wait).await {
                    return None;
                }
            }
            Err(e) => {
                ctx.observer
                    .warning(&format!("Error extracting fact for row {row}: {e}"));
                return Some(None);
            }
        }
    }
}
