//! 对齐校验（Alignment Validator）
//!
//! 纯函数：判断 src_string 能否在源文档中唯一定位，并为审核者生成展示分解
//! （前文 / 跳过的缺口 / 匹配 / 后文）。唯一性判断决定请求是否交给人工；分解仅用于展示。
//! 所有截取按字符计数，保证 UTF-8 边界安全。

use serde::Serialize;
use thiserror::Error;

/// 前文 / 后文展示窗口（字符）
pub const CONTEXT_WINDOW: usize = 100;

const ELLIPSIS: &str = "...";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("Source string not found in file")]
    NotFound,

    #[error("Source string is not unique in file")]
    NotUnique(usize),

    /// 当前上下文中还没有读取过该文件
    #[error("No file selected: read the file before translating it")]
    NoDocument,
}

/// 审核展示分解
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextDisplay {
    /// 与已接受译文衔接的前文（可能以 ... 开头）
    pub before: String,
    /// 已接受前缀之后、匹配之前未被翻译的内容；非空时需醒目标出
    pub gap: String,
    #[serde(rename = "match")]
    pub matched: String,
    /// 后文（超过窗口时以 ... 结尾）
    pub after: String,
}

impl ContextDisplay {
    pub fn has_gap(&self) -> bool {
        !self.gap.is_empty()
    }
}

/// 非重叠出现次数；空串返回 0
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// 校验唯一性并生成展示分解
pub fn validate(
    document: &str,
    accepted_source: &str,
    src: &str,
) -> Result<ContextDisplay, AlignmentError> {
    match count_occurrences(document, src) {
        0 => Err(AlignmentError::NotFound),
        1 => Ok(decompose(document, accepted_source, src)),
        n => Err(AlignmentError::NotUnique(n)),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 前 n 个字符
fn head(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// 去掉前 n 个字符后的剩余部分
fn skip(s: &str, n: usize) -> &str {
    &s[head(s, n).len()..]
}

/// 末尾 n 个字符
fn tail(s: &str, n: usize) -> &str {
    let len = char_len(s);
    skip(s, len.saturating_sub(n))
}

/// 末尾窗口；被截断时加前置省略号
fn trailing_window(s: &str, window: usize) -> String {
    if char_len(s) > window {
        format!("{ELLIPSIS}{}", tail(s, window))
    } else {
        s.to_string()
    }
}

fn leading_window(s: &str, window: usize) -> String {
    if char_len(s) > window {
        format!("{}{ELLIPSIS}", head(s, window))
    } else {
        s.to_string()
    }
}

/// 生成展示分解。调用方须保证 src 在 document 中恰好出现一次
pub fn decompose(document: &str, accepted_source: &str, src: &str) -> ContextDisplay {
    let Some(idx) = document.find(src) else {
        return ContextDisplay::default();
    };
    let before = &document[..idx];
    let after = &document[idx + src.len()..];

    let accepted_len = char_len(accepted_source);
    let (coherent, gap) = if let Some(rest) = before.strip_prefix(accepted_source) {
        if rest.trim().is_empty() {
            // 已接受前缀覆盖了匹配之前的全部内容
            (before, "")
        } else {
            (head(before, accepted_len), rest)
        }
    } else if char_len(before) <= accepted_len {
        ("", before)
    } else {
        (head(before, accepted_len), skip(before, accepted_len))
    };

    ContextDisplay {
        before: trailing_window(coherent, CONTEXT_WINDOW),
        gap: gap.to_string(),
        matched: src.to_string(),
        after: leading_window(after, CONTEXT_WINDOW),
    }
}
