//! nginx `json_logs` 行解析
//!
//! 每行一个 JSON 对象，字段全部是字符串（nginx `escape=json` 输出）。
//! 数值字段解析失败只影响该字段（记为 0），JSON 本身不合法时整行丢弃。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::rules::FilterRules;
use crate::clock::Clock;
use crate::features::logs::models::LogEntry;

/// 单行日志的线上格式
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawLogRow {
    #[serde(deserialize_with = "string_or_number")]
    pub time: String,
    #[serde(deserialize_with = "nullable_string")]
    pub remote_addr: String,
    #[serde(deserialize_with = "nullable_string")]
    pub host: String,
    #[serde(deserialize_with = "nullable_string")]
    pub method: String,
    #[serde(deserialize_with = "nullable_string")]
    pub path: String,
    #[serde(rename = "q", deserialize_with = "nullable_string")]
    pub query: String,
    #[serde(deserialize_with = "nullable_string")]
    pub protocol: String,
    #[serde(deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(deserialize_with = "string_or_number")]
    pub bytes: String,
    #[serde(deserialize_with = "nullable_string")]
    pub city: String,
    #[serde(deserialize_with = "nullable_string")]
    pub country: String,
    #[serde(deserialize_with = "nullable_string")]
    pub user_agent: String,
}

fn nullable_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// 数值字段同时接受 `"200"` 与 `200`
fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl RawLogRow {
    /// 转为领域记录；`id` 留 0，由存储分配
    pub fn into_entry(self, ingested_at: DateTime<Utc>) -> LogEntry {
        let time = self
            .time
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .unwrap_or(0.0);
        LogEntry {
            id: 0,
            time,
            remote_addr: self.remote_addr,
            host: self.host,
            method: self.method,
            path: self.path,
            query: self.query,
            protocol: self.protocol,
            status: self.status.trim().parse().unwrap_or(0),
            bytes: self.bytes.trim().parse().unwrap_or(0),
            city: self.city,
            country: self.country,
            user_agent: self.user_agent,
            created_at: ingested_at,
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// 解析一行；空行、非法 JSON、非法 UTF-8 均返回 None
pub fn parse_line(line: &[u8], ingested_at: DateTime<Utc>) -> Option<LogEntry> {
    if is_blank(line) {
        return None;
    }
    serde_json::from_slice::<RawLogRow>(line.trim_ascii())
        .ok()
        .map(|row| row.into_entry(ingested_at))
}

/// 读取过程中的计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// 已处理的完整行（含空行）
    pub lines: u64,
    pub blank: u64,
    pub malformed: u64,
    /// 命中忽略规则
    pub skipped: u64,
    pub kept: u64,
    /// 末尾是否留有尚未写完的半行
    pub pending_tail: bool,
}

/// 惰性地从字节流中产出保留下来的记录
///
/// 忽略规则在产出时即时应用，调用方只会缓冲真正要入库的记录。
pub struct EntryReader<'a, R> {
    reader: R,
    rules: &'a FilterRules,
    clock: &'a dyn Clock,
    buf: Vec<u8>,
    consumed: u64,
    stats: ReaderStats,
    finished: bool,
}

impl<'a, R> EntryReader<'a, R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, rules: &'a FilterRules, clock: &'a dyn Clock) -> Self {
        Self {
            reader,
            rules,
            clock,
            buf: Vec::with_capacity(1024),
            consumed: 0,
            stats: ReaderStats::default(),
            finished: false,
        }
    }

    /// 读取下一条保留记录；流结束返回 `Ok(None)`
    pub async fn next_entry(&mut self) -> std::io::Result<Option<LogEntry>> {
        while !self.finished {
            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 {
                self.finished = true;
                break;
            }

            let complete = self.buf.last() == Some(&b'\n');
            let parsed = parse_line(&self.buf, self.clock.now());
            if !complete && parsed.is_none() {
                // 没有换行且解析不出来：当作仍在写入的半行，不计入已消费字节
                self.stats.pending_tail = !is_blank(&self.buf);
                self.finished = true;
                break;
            }

            self.consumed += n as u64;
            self.stats.lines += 1;
            match parsed {
                None if is_blank(&self.buf) => self.stats.blank += 1,
                None => {
                    self.stats.malformed += 1;
                    tracing::debug!("跳过无法解析的日志行（{} 字节）", n);
                }
                Some(entry) if self.rules.should_skip(&entry) => self.stats.skipped += 1,
                Some(entry) => {
                    self.stats.kept += 1;
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    /// 已完整处理的字节数（不含末尾未写完的半行）
    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }
}
