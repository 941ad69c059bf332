//! Relevance scoring / 相关性评分
//!
//! Two scorers feed the same normalized scale:
//! - native: `-bm25` from FTS5, divided by the best hit of the merged set
//! - fallback: heuristic points over title/content, divided by the exact-title score (100)
//!
//! Tiers are applied only to the normalized score in `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::schema::SearchHit;

/// Exact title match points; also the fallback normalization ceiling
pub const EXACT_TITLE_SCORE: f64 = 100.0;
const TITLE_CONTAINS_SCORE: f64 = 50.0;
const TITLE_WORD_SCORE: f64 = 20.0;
const CONTENT_PHRASE_SCORE: f64 = 5.0;
const CONTENT_PHRASE_CAP: f64 = 30.0;
const CONTENT_WORD_SCORE: f64 = 2.0;
const CONTENT_WORD_CAP: f64 = 10.0;
/// Content length (chars) above which scores are scaled down / 长度归一化阈值
const LENGTH_NORM_CHARS: usize = 1000;

const HIGH_THRESHOLD: f64 = 0.8;
const MEDIUM_THRESHOLD: f64 = 0.5;

/// Display tier of a normalized score / 相关性等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceLevel {
    High,
    Medium,
    Low,
}

impl RelevanceLevel {
    pub fn from_score(normalized: f64) -> Self {
        if normalized >= HIGH_THRESHOLD {
            RelevanceLevel::High
        } else if normalized >= MEDIUM_THRESHOLD {
            RelevanceLevel::Medium
        } else {
            RelevanceLevel::Low
        }
    }
}

/// Heuristic score used by the legacy substring path / 启发式评分
pub fn fallback_score(query: &str, title: &str, content: &str) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let title = title.trim().to_lowercase();
    let content_lower = content.to_lowercase();

    let mut query_words: Vec<&str> = Vec::new();
    for w in query.split_whitespace() {
        if !query_words.contains(&w) {
            query_words.push(w);
        }
    }

    let mut score = 0.0;

    if title == query {
        score += EXACT_TITLE_SCORE;
    } else {
        if title.contains(&query) {
            score += TITLE_CONTAINS_SCORE;
        }
        let title_words: HashSet<&str> = title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        for word in &query_words {
            if title_words.contains(word) {
                score += TITLE_WORD_SCORE;
            }
        }
    }

    let phrase_hits = content_lower.matches(query.as_str()).count() as f64;
    score += (phrase_hits * CONTENT_PHRASE_SCORE).min(CONTENT_PHRASE_CAP);

    for word in &query_words {
        let hits = content_lower.matches(word).count() as f64;
        score += (hits * CONTENT_WORD_SCORE).min(CONTENT_WORD_CAP);
    }

    // 长文档只是偶然包含关键词，降低其得分
    let length = content.chars().count().max(LENGTH_NORM_CHARS);
    score *= LENGTH_NORM_CHARS as f64 / length as f64;

    round2(score)
}

/// Map a fallback score onto `[0, 1]`
pub fn normalize_fallback(raw: f64) -> f64 {
    round4((raw / EXACT_TITLE_SCORE).clamp(0.0, 1.0))
}

/// Map native scores onto `[0, 1]` relative to the best hit of the set
pub fn normalize_native(hits: &mut [SearchHit]) {
    let best = hits.iter().map(|h| h.raw_score).fold(f64::MIN, f64::max);
    for hit in hits.iter_mut() {
        hit.relevance_score = if best > 0.0 {
            round4((hit.raw_score / best).clamp(0.0, 1.0))
        } else {
            1.0
        };
    }
}

/// Convert an FTS5 bm25 rank (lower is better) into a positive raw score
pub fn native_raw_score(bm25_rank: f64) -> f64 {
    (-bm25_rank).max(0.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::schema::{ContentType, SearchDocument};
    use chrono::Utc;

    fn hit(raw: f64) -> SearchHit {
        let now = Utc::now();
        SearchHit {
            document: SearchDocument {
                content_type: ContentType::Note,
                id: raw.to_string(),
                owner_id: "u1".to_string(),
                title: String::new(),
                body: String::new(),
                tags_text: String::new(),
                parent_ref: None,
                created_at: now,
                updated_at: now,
                favorite: false,
                archived: false,
            },
            raw_score: raw,
            relevance_score: 0.0,
            tags: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_exact_title_match_without_content() {
        assert_eq!(fallback_score("python", "python", ""), 100.0);
        assert_eq!(fallback_score("Rust Notes", "rust notes", ""), 100.0);
    }

    #[test]
    fn test_title_contains_and_word_bonus() {
        // contains (+50) + one whole word (+20)
        assert_eq!(fallback_score("python", "Python Guide", ""), 70.0);
        // 只有单词匹配，不是子串
        assert_eq!(fallback_score("guide python", "Python Guide", ""), 40.0);
        // substring inside a word: no whole-word bonus
        assert_eq!(fallback_score("py", "Python", ""), 50.0);
    }

    #[test]
    fn test_content_caps() {
        let content = "rust ".repeat(50);
        // phrase capped at 30, word capped at 10
        assert_eq!(fallback_score("rust", "other", &content), 40.0);
        assert_eq!(fallback_score("rust", "other", "rust once"), 7.0);
    }

    #[test]
    fn test_length_normalization_is_monotonic() {
        let mut previous = f64::MAX;
        for padding in [0usize, 500, 1000, 2000, 5000, 20000] {
            let content = format!("needle {}", "x".repeat(padding));
            let score = fallback_score("needle", "title", &content);
            assert!(score <= previous, "{} > {} at padding {}", score, previous, padding);
            previous = score;
        }
        assert!(previous > 0.0);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        assert_eq!(fallback_score("  ", "anything", "anything"), 0.0);
    }

    #[test]
    fn test_levels() {
        assert_eq!(RelevanceLevel::from_score(1.0), RelevanceLevel::High);
        assert_eq!(RelevanceLevel::from_score(0.8), RelevanceLevel::High);
        assert_eq!(RelevanceLevel::from_score(0.5), RelevanceLevel::Medium);
        assert_eq!(RelevanceLevel::from_score(0.49), RelevanceLevel::Low);
    }

    #[test]
    fn test_normalize_fallback() {
        assert_eq!(normalize_fallback(100.0), 1.0);
        assert_eq!(normalize_fallback(140.0), 1.0);
        assert_eq!(normalize_fallback(70.0), 0.7);
        assert_eq!(normalize_fallback(-3.0), 0.0);
    }

    #[test]
    fn test_normalize_native_relative_to_best() {
        let mut hits = vec![hit(4.0), hit(2.0), hit(1.0)];
        normalize_native(&mut hits);
        assert_eq!(hits[0].relevance_score, 1.0);
        assert_eq!(hits[1].relevance_score, 0.5);
        assert_eq!(hits[2].relevance_score, 0.25);

        let mut zeros = vec![hit(0.0)];
        normalize_native(&mut zeros);
        assert_eq!(zeros[0].relevance_score, 1.0);
    }

    #[test]
    fn test_native_raw_score() {
        assert_eq!(native_raw_score(-3.5), 3.5);
        assert_eq!(native_raw_score(0.2), 0.0);
    }
}
