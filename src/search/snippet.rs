//! Preview extraction and suggestion helpers / 摘要提取与搜索建议

use std::collections::BTreeSet;

/// Default preview window in characters / 默认摘要长度
pub const DEFAULT_PREVIEW_LENGTH: usize = 200;
/// Partial queries shorter than this get no suggestions / 建议最短输入
pub const MIN_SUGGESTION_CHARS: usize = 2;

const ELLIPSIS: &str = "...";

/// Extract a preview window around the first match / 提取匹配位置附近的摘要
///
/// Full query first, then its first word, else the leading window. The match
/// sits about a third of the way into the window. Works on chars, so
/// multi-byte text is never split.
pub fn extract_preview(text: &str, query: &str, max_length: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let max_length = max_length.max(1);
    if chars.len() <= max_length {
        return text.to_string();
    }

    let query = query.trim();
    let match_index = find_ci(&chars, query).or_else(|| {
        query
            .split_whitespace()
            .next()
            .and_then(|first| find_ci(&chars, first))
    });

    let start = match match_index {
        Some(idx) => idx
            .saturating_sub(max_length / 3)
            .min(chars.len() - max_length),
        None => 0,
    };
    let end = (start + max_length).min(chars.len());

    let mut preview = String::with_capacity(max_length + 2 * ELLIPSIS.len());
    if start > 0 {
        preview.push_str(ELLIPSIS);
    }
    preview.extend(&chars[start..end]);
    if end < chars.len() {
        preview.push_str(ELLIPSIS);
    }
    preview
}

/// Case-insensitive char-index search / 忽略大小写查找（字符下标）
fn find_ci(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| {
        needle
            .iter()
            .enumerate()
            .all(|(j, n)| haystack[i + j].to_lowercase().eq(n.to_lowercase()))
    })
}

/// Case-insensitive substring test used for suggestions / 忽略大小写包含
pub fn contains_ci(candidate: &str, partial: &str) -> bool {
    candidate.to_lowercase().contains(&partial.to_lowercase())
}

/// Merge titles and `#tag` names: dedup, alphabetical, capped / 合并建议
pub fn collect_suggestions<T, G>(titles: T, tags: G, limit: usize) -> Vec<String>
where
    T: IntoIterator<Item = String>,
    G: IntoIterator<Item = String>,
{
    let mut set: BTreeSet<String> = BTreeSet::new();
    for title in titles {
        let title = title.trim();
        if !title.is_empty() {
            set.insert(title.to_string());
        }
    }
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() {
            set.insert(format!("#{}", tag));
        }
    }
    set.into_iter().take(limit).collect()
}
