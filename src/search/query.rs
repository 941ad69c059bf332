//! Query compiler - turns raw user input into a safe FTS5 match expression / 查询编译器
//!
//! - Strips everything except letters, digits and whitespace / 去除特殊字符
//! - Drops terms shorter than 2 characters / 丢弃过短的词
//! - Every surviving term becomes a quoted prefix token, OR'd together / 前缀匹配，OR 连接

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum term length in characters / 最短词长
pub const MIN_TERM_CHARS: usize = 2;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex is valid"));

/// Compiled query / 编译后的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledQuery {
    /// At least one usable term / 至少有一个有效词
    Match {
        /// Lower-cased terms, input order, no duplicates / 小写词列表
        terms: Vec<String>,
        /// Sanitized, whitespace-collapsed query text / 清洗后的查询文本
        text: String,
    },
    /// Degenerate input; never matches anything / 永不命中
    AlwaysMiss,
}

impl CompiledQuery {
    pub fn is_always_miss(&self) -> bool {
        matches!(self, CompiledQuery::AlwaysMiss)
    }

    pub fn terms(&self) -> &[String] {
        match self {
            CompiledQuery::Match { terms, .. } => terms,
            CompiledQuery::AlwaysMiss => &[],
        }
    }

    /// Sanitized text used by the fallback scorer and previews
    pub fn text(&self) -> &str {
        match self {
            CompiledQuery::Match { text, .. } => text,
            CompiledQuery::AlwaysMiss => "",
        }
    }

    /// FTS5 expression, e.g. `"python"* OR "guide"*`. Always bound as a parameter.
    pub fn match_expression(&self) -> Option<String> {
        match self {
            CompiledQuery::Match { terms, .. } => Some(
                terms
                    .iter()
                    .map(|t| format!("\"{}\"*", t))
                    .collect::<Vec<_>>()
                    .join(" OR "),
            ),
            CompiledQuery::AlwaysMiss => None,
        }
    }
}

/// Sanitize raw input: special characters become whitespace / 清洗输入
pub fn sanitize(raw: &str) -> String {
    let cleaned = NON_WORD.replace_all(raw, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compile raw query text / 编译查询
pub fn compile(raw_query: &str) -> CompiledQuery {
    let text = sanitize(raw_query);

    let mut terms: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        if word.chars().count() < MIN_TERM_CHARS {
            continue;
        }
        let lower = word.to_lowercase();
        if !terms.contains(&lower) {
            terms.push(lower);
        }
    }

    if terms.is_empty() {
        return CompiledQuery::AlwaysMiss;
    }

    CompiledQuery::Match { terms, text }
}
