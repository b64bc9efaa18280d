//! 模型响应解析
//!
//! 期望的格式（由 prompt 规定）：
//!
//! ```text
//! KEYWORDS: dog; snow; winter; park; running
//! CAPTION: A dog running through a snowy park.
//! ```
//!
//! 允许 markdown 修饰（`**KEYWORDS:**`、列表符号、代码块）以及多行说明。

use thiserror::Error;

/// 每张图片的关键词数量
pub const KEYWORD_COUNT: usize = 5;

/// 解析出的标注结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// 小写、去重后的关键词
    pub keywords: Vec<String>,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing {0} section")]
    MissingSection(&'static str),
    #[error("expected {expected} keywords, found {found}")]
    KeywordCount { expected: usize, found: usize },
    #[error("caption is empty")]
    EmptyCaption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Keywords,
    Caption,
}

fn is_decoration(c: char) -> bool {
    c == '*' || c == '_' || c == '"' || c == '\'' || c == '`' || c.is_whitespace()
}

/// 识别 `LABEL: value` 行
fn split_label(line: &str) -> Option<(Label, &str)> {
    let (head, rest) = line.split_once(':')?;
    let label = match head.trim_matches(is_decoration).to_ascii_lowercase().as_str() {
        "keywords" | "keyword" | "tags" => Label::Keywords,
        "caption" | "abstract" | "caption/abstract" | "description" => Label::Caption,
        _ => return None,
    };
    Some((label, rest.trim_matches(is_decoration)))
}

/// 去掉列表符号和标题符号
fn clean_line(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '-' | '>' | '•'))
        .trim()
}

fn parse_keywords(list: &str) -> Vec<String> {
    let separator = if list.contains(';') { ';' } else { ',' };
    let mut keywords: Vec<String> = Vec::new();
    for raw in list.split(separator) {
        let keyword = raw
            .trim_matches(|c: char| is_decoration(c) || c == '.')
            .to_lowercase();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

/// 从模型输出中提取五个关键词和一句说明
pub fn parse_response(text: &str) -> Result<Annotation, ParseError> {
    let mut keywords_line: Option<&str> = None;
    let mut caption_lines: Option<Vec<&str>> = None;
    let mut in_caption = false;

    for raw in text.lines() {
        let line = clean_line(raw);
        if line.starts_with("```") {
            continue;
        }

        match split_label(line) {
            Some((Label::Keywords, rest)) => {
                in_caption = false;
                keywords_line.get_or_insert(rest);
            }
            Some((Label::Caption, rest)) => {
                // 只取第一个说明段
                in_caption = caption_lines.is_none();
                if in_caption {
                    let mut lines = Vec::new();
                    if !rest.is_empty() {
                        lines.push(rest);
                    }
                    caption_lines = Some(lines);
                }
            }
            None => {
                if let (true, Some(lines)) = (in_caption, caption_lines.as_mut()) {
                    if line.is_empty() {
                        // 空行结束说明（说明开头的空行除外）
                        in_caption = lines.is_empty();
                    } else {
                        lines.push(line);
                    }
                }
            }
        }
    }

    let keywords_line = keywords_line.ok_or(ParseError::MissingSection("KEYWORDS"))?;
    let caption_lines = caption_lines.ok_or(ParseError::MissingSection("CAPTION"))?;

    let keywords = parse_keywords(keywords_line);
    if keywords.len() != KEYWORD_COUNT {
        return Err(ParseError::KeywordCount {
            expected: KEYWORD_COUNT,
            found: keywords.len(),
        });
    }

    let caption = caption_lines
        .join(" ")
        .trim_matches(is_decoration)
        .to_string();
    if caption.is_empty() {
        return Err(ParseError::EmptyCaption);
    }

    Ok(Annotation { keywords, caption })
}
