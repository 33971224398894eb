//! サービス応答テキストの整形
//!
//! 翻訳は `{"translation": "..."}` の1フィールドで要求するが、崩れた応答は
//! コードフェンス除去 → 再解析 → 先頭ラベル除去 → 引用符除去 の順で救済する。
use serde_json::Value;

use crate::service::NOT_RECOGNIZABLE;

const TRANSLATION_FIELD: &str = "translation";
const MAX_LABEL_WORDS: usize = 3;
/// 先頭ラベルとして認める語（対象言語名も認める）
const LABEL_WORDS: [&str; 4] = ["translation", "translated", "text", "output"];

const QUOTE_PAIRS: [(char, char); 6] = [
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('‘', '’'),
    ('«', '»'),
    ('「', '」'),
];

/// 使える文字起こしなら前後空白を除いて返す
pub fn normalize_transcript(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty()
        || text.eq_ignore_ascii_case(NOT_RECOGNIZABLE)
        || !text.chars().any(char::is_alphanumeric)
    {
        return None;
    }
    Some(text.to_string())
}

/// 翻訳応答から訳文だけを取り出す。`target_language` は先頭ラベルの判定に使う
pub fn clean_translation(raw: &str, target_language: &str) -> String {
    let trimmed = raw.trim();
    if let Some(text) = extract_field(trimmed) {
        return text;
    }

    let unfenced = strip_code_fences(trimmed);
    if let Some(text) = extract_field(unfenced) {
        return text;
    }

    let unlabeled = strip_label(unfenced, target_language);
    strip_quotes(unlabeled).to_string()
}

fn extract_field(text: &str) -> Option<String> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => map
            .get(TRANSLATION_FIELD)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.trim_end().strip_suffix("```").unwrap_or(inner);
    let inner = match inner.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => inner.strip_prefix("json").unwrap_or(inner),
    };
    inner.trim()
}

/// `Translation:` や `Vietnamese translation:` のような先頭ラベルを除く
///
/// ラベルは既知の語と対象言語名だけで構成されている場合に限る。
fn strip_label<'a>(text: &'a str, target_language: &str) -> &'a str {
    let Some((label, rest)) = text.split_once(':') else {
        return text;
    };
    let words: Vec<String> = label
        .split_whitespace()
        .map(|w| w.trim_matches(|c| c == '(' || c == ')').to_lowercase())
        .collect();
    let target = target_language.trim().to_lowercase();
    let is_label = !words.is_empty()
        && words.len() <= MAX_LABEL_WORDS
        && words
            .iter()
            .all(|w| LABEL_WORDS.contains(&w.as_str()) || (!target.is_empty() && *w == target));
    if is_label && !rest.trim().is_empty() {
        rest.trim()
    } else {
        text
    }
}

fn strip_quotes(text: &str) -> &str {
    let mut text = text.trim();
    loop {
        let stripped = QUOTE_PAIRS.iter().find_map(|(open, close)| {
            text.strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        });
        match stripped {
            Some(inner) if !inner.trim().is_empty() => text = inner.trim(),
            _ => return text,
        }
    }
}
