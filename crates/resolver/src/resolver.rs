// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`ServiceResolver`]: the dict → fuzzy → LLM → fallback pipeline
//! (§4.3).

use crate::synonyms::SYNONYMS;
use dashmap::{DashMap, DashSet};
use finops_core::provider::{CompletionOptions, LlmClient};
use finops_core::{ResolutionMethod, ResolutionResult};
use std::sync::Arc;

/// Score below which a fuzzy candidate is not considered a match at all.
const MIN_FUZZY_THRESHOLD: f64 = 80.0;

/// If the top two fuzzy candidates score within this many points of
/// each other, the match is ambiguous rather than confident.
const AMBIGUITY_GAP: f64 = 3.0;

/// Number of fuzzy candidates carried forward to LLM arbitration.
const CANDIDATE_LIMIT: usize = 5;

/// Normalize a phrase for dictionary lookup: lowercased, with spaces,
/// underscores, and hyphens stripped.
pub fn normalize(phrase: &str) -> String {
    phrase
        .to_lowercase()
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

/// Resolves free-text AWS service phrases to canonical CUR
/// `line_item_product_code` values.
///
/// The distinct-product-codes set is populated externally (typically by
/// a `DataSource` implementation refreshing it periodically) via
/// [`ServiceResolver::update_product_codes`]; reads and writes are
/// coordinated through a [`DashSet`] since the refresh can run
/// concurrently with in-flight resolutions.
pub struct ServiceResolver {
    product_codes: DashSet<String>,
    llm: Option<Arc<dyn LlmClient>>,
    llm_cache: DashMap<String, String>,
}

impl ServiceResolver {
    /// Build a resolver with no LLM arbitration stage.
    pub fn new() -> Self {
        Self {
            product_codes: DashSet::new(),
            llm: None,
            llm_cache: DashMap::new(),
        }
    }

    /// Build a resolver that falls back to LLM arbitration when the
    /// fuzzy stage produces candidates but no confident match.
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            product_codes: DashSet::new(),
            llm: Some(llm),
            llm_cache: DashMap::new(),
        }
    }

    /// Replace the known set of distinct CUR product codes.
    pub fn update_product_codes(&self, codes: impl IntoIterator<Item = String>) {
        self.product_codes.clear();
        let mut count = 0;
        for code in codes {
            if !code.is_empty() {
                self.product_codes.insert(code);
                count += 1;
            }
        }
        tracing::info!(count, "service resolver product codes updated");
    }

    /// Resolve `phrase` to a canonical product code.
    pub async fn resolve(&self, phrase: &str) -> ResolutionResult {
        if phrase.is_empty() {
            metrics::counter!("finops_service_resolution_total", "method" => "fallback").increment(1);
            return ResolutionResult {
                product_code: None,
                method: ResolutionMethod::Fallback,
                confidence: 0.0,
                candidates: Vec::new(),
                original: phrase.to_string(),
                normalized: String::new(),
                needs_clarification: false,
            };
        }

        let normalized = normalize(phrase);

        if let Some(code) = SYNONYMS.get(normalized.as_str()) {
            metrics::counter!("finops_service_resolution_total", "method" => "dict").increment(1);
            return ResolutionResult {
                product_code: Some((*code).to_string()),
                method: ResolutionMethod::Dict,
                confidence: 1.0,
                candidates: vec![((*code).to_string(), 100.0)],
                original: phrase.to_string(),
                normalized,
                needs_clarification: false,
            };
        }

        let candidates = self.fuzzy_candidates(phrase);
        if let Some(result) = self.judge_fuzzy_candidates(phrase, &normalized, &candidates) {
            return result;
        }

        if let Some(llm) = &self.llm {
            if !candidates.is_empty() {
                if let Some(cached) = self.llm_cache.get(phrase) {
                    metrics::counter!("finops_service_resolution_total", "method" => "llm_cached").increment(1);
                    return ResolutionResult {
                        product_code: Some(cached.clone()),
                        method: ResolutionMethod::Llm,
                        confidence: 1.0,
                        candidates,
                        original: phrase.to_string(),
                        normalized,
                        needs_clarification: false,
                    };
                }
                if let Some(selected) = resolve_with_llm(llm.as_ref(), phrase, &candidates).await {
                    self.llm_cache.insert(phrase.to_string(), selected.clone());
                    metrics::counter!("finops_service_resolution_total", "method" => "llm").increment(1);
                    return ResolutionResult {
                        product_code: Some(selected),
                        method: ResolutionMethod::Llm,
                        confidence: 0.9,
                        candidates,
                        original: phrase.to_string(),
                        normalized,
                        needs_clarification: false,
                    };
                }
            }
        }

        metrics::counter!("finops_service_resolution_total", "method" => "fallback").increment(1);
        ResolutionResult {
            product_code: None,
            method: ResolutionMethod::Fallback,
            confidence: 0.0,
            candidates,
            original: phrase.to_string(),
            normalized,
            needs_clarification: false,
        }
    }

    /// Score `phrase` against every known product code, returning the
    /// top [`CANDIDATE_LIMIT`] by descending score.
    fn fuzzy_candidates(&self, phrase: &str) -> Vec<(String, f64)> {
        if self.product_codes.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(String, f64)> = self
            .product_codes
            .iter()
            .map(|code| (code.clone(), weighted_ratio(phrase, &code)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(CANDIDATE_LIMIT);
        scored
    }

    fn judge_fuzzy_candidates(
        &self,
        phrase: &str,
        normalized: &str,
        candidates: &[(String, f64)],
    ) -> Option<ResolutionResult> {
        let best = candidates.first()?;
        if best.1 < MIN_FUZZY_THRESHOLD {
            return None;
        }
        if let Some(second) = candidates.get(1) {
            if (best.1 - second.1).abs() < AMBIGUITY_GAP {
                metrics::counter!("finops_service_resolution_total", "method" => "ambiguous").increment(1);
                return Some(ResolutionResult {
                    product_code: None,
                    method: ResolutionMethod::Ambiguous,
                    confidence: best.1 / 100.0,
                    candidates: candidates.to_vec(),
                    original: phrase.to_string(),
                    normalized: normalized.to_string(),
                    needs_clarification: true,
                });
            }
        }
        metrics::counter!("finops_service_resolution_total", "method" => "fuzzy").increment(1);
        Some(ResolutionResult {
            product_code: Some(best.0.clone()),
            method: ResolutionMethod::Fuzzy,
            confidence: best.1 / 100.0,
            candidates: candidates.to_vec(),
            original: phrase.to_string(),
            normalized: normalized.to_string(),
            needs_clarification: false,
        })
    }
}

impl Default for ServiceResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// A weighted-ratio similarity score in `[0, 100]`, approximating
/// `rapidfuzz.fuzz.WRatio`: the higher of a whole-string similarity
/// (`strsim::normalized_levenshtein`) and a best-substring-window
/// similarity (this crate's own [`partial_ratio`], modeled on
/// rapidfuzz's `partial_ratio`). No direct Rust equivalent of `WRatio`
/// exists; see DESIGN.md for the documented substitution.
fn weighted_ratio(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let full = strsim::normalized_levenshtein(&a, &b);
    let partial = partial_ratio(&a, &b);
    full.max(partial) * 100.0
}

/// Best normalized-Levenshtein similarity between the shorter string and
/// any equal-length window of the longer one. A perfect substring match
/// scores 1.0 outright.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return 0.0;
    }
    if longer.contains(shorter) {
        return 1.0;
    }
    let shorter_len = shorter.chars().count();
    let longer_chars: Vec<char> = longer.chars().collect();
    if longer_chars.len() < shorter_len {
        return strsim::normalized_levenshtein(shorter, longer);
    }
    (0..=(longer_chars.len() - shorter_len))
        .map(|start| {
            let window: String = longer_chars[start..start + shorter_len].iter().collect();
            strsim::normalized_levenshtein(shorter, &window)
        })
        .fold(0.0_f64, f64::max)
}

async fn resolve_with_llm(
    llm: &dyn LlmClient,
    phrase: &str,
    candidates: &[(String, f64)],
) -> Option<String> {
    let candidate_list = candidates
        .iter()
        .map(|(code, score)| format!("- {code} (fuzzy score: {score:.1})"))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "You are helping map user-entered AWS service names to official AWS CUR product codes.\n\n\
         User phrase: \"{phrase}\"\n\n\
         Candidate product codes from CUR data (ranked by fuzzy similarity):\n{candidate_list}\n\n\
         Select the SINGLE most appropriate product code that matches the user's intent. Respond ONLY with valid JSON in this exact format:\n\
         {{\"product_code\": \"<exact-code-from-list>\"}}\n\n\
         If none match confidently, respond:\n\
         {{\"product_code\": null}}\n\n\
         Rules:\n\
         1. Only return codes from the candidate list above\n\
         2. Consider common AWS service naming (e.g., \"VPC\" -> \"AmazonVPC\", \"EC2\" -> \"AmazonEC2\")\n\
         3. No explanations, just the JSON object"
    );

    let response = match llm.complete(&prompt, &CompletionOptions::json(256)).await {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(phrase, %error, "LLM service resolution failed");
            return None;
        }
    };

    let parsed: serde_json::Value = match serde_json::from_str(response.trim()) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(phrase, %error, "LLM service resolution returned invalid JSON");
            return None;
        }
    };

    let selected = parsed.get("product_code").and_then(|v| v.as_str())?;
    if candidates.iter().any(|(code, _)| code == selected) {
        tracing::info!(phrase, selected, "LLM resolved service name");
        Some(selected.to_string())
    } else {
        tracing::warn!(phrase, selected, "LLM returned a product code outside the candidate list");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::Result;
    use std::sync::Mutex;

    #[tokio::test]
    async fn dictionary_hit_short_circuits_fuzzy() {
        let resolver = ServiceResolver::new();
        let result = resolver.resolve("EC2").await;
        assert_eq!(result.method, ResolutionMethod::Dict);
        assert_eq!(result.product_code.as_deref(), Some("AmazonEC2"));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn dict_lookup_ignores_case_and_separators() {
        let resolver = ServiceResolver::new();
        let result = resolver.resolve("Amazon_S3").await;
        assert_eq!(result.product_code.as_deref(), Some("AmazonS3"));
    }

    #[tokio::test]
    async fn fuzzy_matches_close_product_code() {
        let resolver = ServiceResolver::new();
        resolver.update_product_codes(["AmazonRedshift".to_string(), "AmazonSageMaker".to_string()]);
        let result = resolver.resolve("redshift").await;
        assert_eq!(result.method, ResolutionMethod::Fuzzy);
        assert_eq!(result.product_code.as_deref(), Some("AmazonRedshift"));
    }

    #[tokio::test]
    async fn unknown_phrase_with_no_codes_falls_back() {
        let resolver = ServiceResolver::new();
        let result = resolver.resolve("some totally unknown widget").await;
        assert_eq!(result.method, ResolutionMethod::Fallback);
        assert!(result.product_code.is_none());
    }

    #[tokio::test]
    async fn empty_phrase_falls_back_without_panicking() {
        let resolver = ServiceResolver::new();
        let result = resolver.resolve("").await;
        assert_eq!(result.method, ResolutionMethod::Fallback);
    }

    struct StubLlm {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn llm_arbitration_picks_an_in_list_candidate() {
        let llm = Arc::new(StubLlm {
            responses: Mutex::new(vec![r#"{"product_code": "AmazonVPC"}"#.to_string()]),
        });
        let resolver = ServiceResolver::with_llm(llm);
        resolver.update_product_codes([
            "AmazonVPC".to_string(),
            "AWSDirectConnect".to_string(),
            "AWSTransitGateway".to_string(),
        ]);
        let result = resolver.resolve("private network thing").await;
        assert_eq!(result.method, ResolutionMethod::Llm);
        assert_eq!(result.product_code.as_deref(), Some("AmazonVPC"));
        assert_eq!(result.confidence, 0.9);
    }

    #[tokio::test]
    async fn llm_result_is_cached_per_phrase() {
        let llm = Arc::new(StubLlm {
            responses: Mutex::new(vec![r#"{"product_code": "AmazonVPC"}"#.to_string()]),
        });
        let resolver = ServiceResolver::with_llm(llm);
        resolver.update_product_codes([
            "AmazonVPC".to_string(),
            "AWSDirectConnect".to_string(),
            "AWSTransitGateway".to_string(),
        ]);
        let first = resolver.resolve("private network thing").await;
        let second = resolver.resolve("private network thing").await;
        assert_eq!(first.product_code, second.product_code);
    }
}
