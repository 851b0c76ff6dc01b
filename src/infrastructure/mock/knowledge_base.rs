//! Mock `KnowledgeBase`: an in-memory table of indexed patterns searched by
//! naive substring matching, standing in for the real vector/keyword store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ports::{KnowledgeBase, KnowledgeHit, KnowledgeSearchResult, SearchStrategy};

struct IndexedPattern {
    pattern_id: String,
    summary: String,
    quality_score: f64,
}

/// Quality floor below which `index` rejects a pattern, matching the port's
/// documented contract.
const MIN_QUALITY_SCORE: f64 = 0.70;

/// Naive substring-matching knowledge base. `search` scores a hit by what
/// fraction of the query's words appear in the stored summary; `Auto`
/// escalates through `Fast` -> `Semantic` -> `Deep` until it finds a hit
/// above the prior level's threshold, recording every level it tried.
pub struct MockKnowledgeBase {
    patterns: RwLock<Vec<IndexedPattern>>,
}

impl MockKnowledgeBase {
    pub fn new() -> Self {
        Self { patterns: RwLock::new(Vec::new()) }
    }

    /// Seeds the store directly, bypassing the `index` quality gate. For
    /// test setup.
    pub async fn seed(&self, pattern_id: impl Into<String>, summary: impl Into<String>) {
        self.patterns.write().await.push(IndexedPattern {
            pattern_id: pattern_id.into(),
            summary: summary.into(),
            quality_score: 1.0,
        });
    }

    async fn score(&self, query: &str) -> Vec<KnowledgeHit> {
        let query_words: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_string).collect();
        if query_words.is_empty() {
            return vec![];
        }

        let patterns = self.patterns.read().await;
        let mut hits: Vec<KnowledgeHit> = patterns
            .iter()
            .filter_map(|p| {
                let summary_lower = p.summary.to_lowercase();
                let matched = query_words.iter().filter(|w| summary_lower.contains(w.as_str())).count();
                if matched == 0 {
                    return None;
                }
                let score = (matched as f64 / query_words.len() as f64) * p.quality_score;
                Some(KnowledgeHit {
                    pattern_id: p.pattern_id.clone(),
                    summary: p.summary.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }
}

impl Default for MockKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeBase for MockKnowledgeBase {
    async fn search(&self, query: &str, strategy: SearchStrategy) -> KnowledgeSearchResult {
        let start = std::time::Instant::now();

        if strategy != SearchStrategy::Auto {
            let hits = self.score(query).await;
            return KnowledgeSearchResult {
                hits,
                levels_tried: vec![strategy],
                duration_ms: duration_ms(start),
            };
        }

        let mut levels_tried = vec![SearchStrategy::Fast];
        let mut hits = self.score(query).await;
        if hits.iter().any(|h| h.score >= 0.5) {
            return KnowledgeSearchResult { hits, levels_tried, duration_ms: duration_ms(start) };
        }

        levels_tried.push(SearchStrategy::Semantic);
        if !hits.is_empty() {
            return KnowledgeSearchResult { hits, levels_tried, duration_ms: duration_ms(start) };
        }

        levels_tried.push(SearchStrategy::Deep);
        hits = self.score(query).await;
        KnowledgeSearchResult { hits, levels_tried, duration_ms: duration_ms(start) }
    }

    async fn index(&self, pattern: &str, quality_score: f64) -> bool {
        if quality_score < MIN_QUALITY_SCORE {
            return false;
        }
        self.patterns.write().await.push(IndexedPattern {
            pattern_id: pattern.to_string(),
            summary: pattern.to_string(),
            quality_score,
        });
        true
    }
}

fn duration_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn index_rejects_low_quality() {
        let kb = MockKnowledgeBase::new();
        assert!(!kb.index("cpu_exhaustion", 0.5).await);
        let result = kb.search("cpu exhaustion", SearchStrategy::Fast).await;
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn index_accepts_and_search_finds_it() {
        let kb = MockKnowledgeBase::new();
        assert!(kb.index("cpu_exhaustion high load on instance", 0.9).await);
        let result = kb.search("cpu high", SearchStrategy::Fast).await;
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].pattern_id, "cpu_exhaustion high load on instance");
    }

    #[tokio::test]
    async fn auto_escalates_when_no_hits() {
        let kb = MockKnowledgeBase::new();
        let result = kb.search("nothing matches this", SearchStrategy::Auto).await;
        assert_eq!(result.levels_tried, vec![SearchStrategy::Fast, SearchStrategy::Semantic, SearchStrategy::Deep]);
        assert!(result.hits.is_empty());
    }
}
