//! 频道文件格式
//!
//! 每条消息渲染为定宽分隔块：`=` 分隔线、`[序号] 作者`、`-` 子分隔线、正文、空行。
//! 解析时容忍缺失子分隔线与格式错误的消息头。

use std::sync::OnceLock;

use regex::Regex;

use crate::memory::Message;

pub const SEPARATOR_WIDTH: usize = 80;

/// 块分隔线（80 个 `=`）
pub fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

/// 消息头与正文之间的子分隔线（80 个 `-`）
pub fn subseparator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// 渲染单条消息为频道块（含结尾空行）
pub fn render_message(msg: &Message) -> String {
    render_block(msg.seq, msg.author.display_name(), &msg.body)
}

pub fn render_block(seq: u64, author: &str, body: &str) -> String {
    format!(
        "{}\n[{}] {}\n{}\n{}\n\n",
        separator(),
        seq,
        author,
        subseparator(),
        body
    )
}

/// 整段历史渲染为频道文本（即 Agent 看到的会话内容）
pub fn render_channel(messages: &[Message]) -> String {
    messages.iter().map(render_message).collect()
}

/// 从频道文本解析出的消息（不含时间戳与作者 id）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub seq: u64,
    pub author: String,
    pub body: String,
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+)\]\s+(.+)$").expect("static regex"))
}

/// 解析频道文本
///
/// 块边界是分隔线紧跟一行 `[序号] 作者`；正文原样保留，只去掉块末的空行。
/// 首个合法块之前无法识别的内容被忽略。
pub fn parse_channel(content: &str) -> Vec<ParsedMessage> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let sep = separator();
    let sub_prefix = "-".repeat(10);
    let lines: Vec<&str> = content
        .strip_suffix('\n')
        .unwrap_or(content)
        .split('\n')
        .collect();

    let header_at = |i: usize| -> Option<(u64, String)> {
        if lines[i].trim_end() != sep {
            return None;
        }
        let caps = header_re().captures(lines.get(i + 1)?.trim_end())?;
        let seq = caps[1].parse::<u64>().ok()?;
        Some((seq, caps[2].trim().to_string()))
    };
    let starts: Vec<(usize, u64, String)> = (0..lines.len())
        .filter_map(|i| header_at(i).map(|(seq, author)| (i, seq, author)))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(n, (i, seq, author))| {
            let end = starts.get(n + 1).map_or(lines.len(), |next| next.0);
            let mut body_start = (i + 2).min(end);
            if lines[body_start..end]
                .first()
                .is_some_and(|l| l.starts_with(&sub_prefix))
            {
                body_start += 1;
            }
            let mut body_lines = &lines[body_start..end];
            if let Some((last, rest)) = body_lines.split_last() {
                if last.is_empty() {
                    body_lines = rest;
                }
            }
            ParsedMessage {
                seq: *seq,
                author: author.clone(),
                body: body_lines.join("\n"),
            }
        })
        .collect()
}

/// 粗略 token 估算（英文约 4 字符 / token）
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
