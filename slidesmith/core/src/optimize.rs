//! Prompt Optimizer
//!
//! Asks the model to critique and rewrite a slide prompt in one call. The
//! model answers with a JSON object somewhere in its text:
//!
//! ```json
//! {
//!   "original": "...",
//!   "optimized": "...",
//!   "improvements": ["..."],
//!   "score": { "before": 4, "after": 8 }
//! }
//! ```
//!
//! Several iterations chain: each one optimizes the previous result, the
//! improvements accumulate and the score runs from the first `before` to the
//! last `after`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::backend::{LlmBackend, LlmRequest};
use crate::limit::{RateLimited, RequestLimiter};
use crate::prompt::RequestError;
use crate::source::GenerationDefaults;

/// System prompt for a single optimization call
pub const OPTIMIZE_PROMPT: &str = include_str!("prompt/optimize_prompt.md");

/// Longest prompt accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 5000;

/// Iteration cap for a single prompt
pub const MAX_ITERATIONS: u32 = 3;

/// Prompts accepted in one batch
pub const MAX_BATCH_PROMPTS: usize = 10;

/// Iteration cap for each prompt of a batch
pub const MAX_BATCH_ITERATIONS: u32 = 2;

/// Score assumed when the model gives no `before`
const DEFAULT_SCORE_BEFORE: u8 = 5;

/// Score assumed when the model gives no `after`
const DEFAULT_SCORE_AFTER: u8 = 7;

const UNPARSEABLE: &str = "Unable to parse optimization response";

/// Outermost braces, greedy, across lines
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"));

/// Optimizer failures
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// The prompt or batch was refused before any model call
    #[error(transparent)]
    Invalid(#[from] RequestError),

    /// The limiter refused the call
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// The model call failed
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Model-assigned quality, 1 to 10
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationScore {
    /// Quality of the input prompt
    pub before: u8,
    /// Quality of the rewrite
    pub after: u8,
}

/// One optimized prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    /// Prompt as given
    pub original: String,
    /// Rewritten prompt
    pub optimized: String,
    /// What changed, across every iteration
    pub improvements: Vec<String>,
    /// Score before and after
    pub score: OptimizationScore,
}

/// Read the model's answer
///
/// Missing fields take defaults; text with no parseable object yields a
/// result with empty prompts and a single explanatory improvement.
#[must_use]
pub fn parse_optimization_response(response: &str) -> OptimizationResult {
    let parsed = JSON_OBJECT
        .find(response)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object);

    let Some(parsed) = parsed else {
        tracing::warn!(len = response.len(), "Optimization response had no JSON object");
        return OptimizationResult {
            original: String::new(),
            optimized: String::new(),
            improvements: vec![UNPARSEABLE.to_string()],
            score: OptimizationScore {
                before: DEFAULT_SCORE_BEFORE,
                after: DEFAULT_SCORE_BEFORE,
            },
        };
    };

    let text = |key: &str| {
        parsed
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let score = |key: &str, default: u8| {
        parsed
            .get("score")
            .and_then(|s| s.get(key))
            .and_then(Value::as_u64)
            .filter(|&n| n > 0)
            .and_then(|n| u8::try_from(n).ok())
            .unwrap_or(default)
    };

    let original = text("original").unwrap_or_default();
    let optimized = text("optimized").unwrap_or_else(|| original.clone());
    let improvements = parsed
        .get("improvements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    OptimizationResult {
        original,
        optimized,
        improvements,
        score: OptimizationScore {
            before: score("before", DEFAULT_SCORE_BEFORE),
            after: score("after", DEFAULT_SCORE_AFTER),
        },
    }
}

/// Check one prompt against the optimizer's limits
///
/// # Errors
///
/// [`RequestError::EmptyPrompt`] or [`RequestError::PromptTooLong`].
pub fn validate_prompt(prompt: &str) -> Result<(), RequestError> {
    if prompt.trim().is_empty() {
        return Err(RequestError::EmptyPrompt);
    }
    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(RequestError::PromptTooLong {
            len,
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(())
}

fn clamp_iterations(iterations: u32, cap: u32) -> u32 {
    iterations.clamp(1, cap)
}

/// Rewrites slide prompts through an [`LlmBackend`]
pub struct PromptOptimizer {
    backend: Arc<dyn LlmBackend>,
    defaults: GenerationDefaults,
    limiter: Option<Arc<RequestLimiter>>,
}

impl std::fmt::Debug for PromptOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptOptimizer")
            .field("backend", &self.backend.name())
            .field("defaults", &self.defaults)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl PromptOptimizer {
    /// Optimizer over `backend` with default model settings
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            defaults: GenerationDefaults::default(),
            limiter: None,
        }
    }

    /// Set the model defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Count every model call against `limiter`
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RequestLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Optimize one prompt over `iterations` rounds, capped at [`MAX_ITERATIONS`]
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError`] for an invalid prompt, a refused limiter slot
    /// or a failed model call.
    pub async fn optimize(&self, prompt: &str, iterations: u32) -> Result<OptimizationResult, OptimizeError> {
        validate_prompt(prompt)?;
        self.run(prompt, clamp_iterations(iterations, MAX_ITERATIONS)).await
    }

    /// Optimize up to [`MAX_BATCH_PROMPTS`] prompts in order
    ///
    /// Every prompt is checked before the first model call; iterations are
    /// capped at [`MAX_BATCH_ITERATIONS`].
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError`] for an invalid batch or the first failed
    /// prompt.
    pub async fn optimize_batch(
        &self,
        prompts: &[String],
        iterations: u32,
    ) -> Result<Vec<OptimizationResult>, OptimizeError> {
        if prompts.is_empty() {
            return Err(RequestError::NoPrompts.into());
        }
        if prompts.len() > MAX_BATCH_PROMPTS {
            return Err(RequestError::TooManyPrompts {
                count: prompts.len(),
                max: MAX_BATCH_PROMPTS,
            }
            .into());
        }
        for prompt in prompts {
            validate_prompt(prompt)?;
        }

        let iterations = clamp_iterations(iterations, MAX_BATCH_ITERATIONS);
        let mut results = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            tracing::debug!(index, total = prompts.len(), "Optimizing batch prompt");
            results.push(self.run(prompt, iterations).await?);
        }
        Ok(results)
    }

    async fn run(&self, prompt: &str, iterations: u32) -> Result<OptimizationResult, OptimizeError> {
        let mut current = prompt.to_string();
        let mut improvements = Vec::new();
        let mut score = OptimizationScore {
            before: DEFAULT_SCORE_BEFORE,
            after: DEFAULT_SCORE_BEFORE,
        };

        for round in 0..iterations {
            let result = self.call(&current).await?;
            if round == 0 {
                score.before = result.score.before;
            }
            score.after = result.score.after;
            if !result.optimized.is_empty() {
                current = result.optimized;
            }
            improvements.extend(result.improvements);
        }

        tracing::info!(
            iterations,
            improvements = improvements.len(),
            before = score.before,
            after = score.after,
            "Prompt optimized"
        );
        Ok(OptimizationResult {
            original: prompt.to_string(),
            optimized: current,
            improvements,
            score,
        })
    }

    async fn call(&self, prompt: &str) -> Result<OptimizationResult, OptimizeError> {
        if let Some(ref limiter) = self.limiter {
            limiter.check(self.backend.name())?;
        }

        let request = LlmRequest::new(format!("Optimize this slide prompt:\n\n{prompt}"), &self.defaults.model)
            .with_system(OPTIMIZE_PROMPT)
            .with_temperature(self.defaults.temperature)
            .with_max_tokens(self.defaults.max_tokens);

        let response = self
            .backend
            .send(&request)
            .await
            .map_err(|e| OptimizeError::Backend(e.to_string()))?;
        tracing::debug!(tokens = ?response.tokens_used, duration_ms = ?response.duration_ms, "Optimization call finished");
        Ok(parse_optimization_response(&response.content))
    }
}
