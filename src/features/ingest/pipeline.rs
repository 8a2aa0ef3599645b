use tokio::io::AsyncBufRead;

use super::record_parser::EntryReader;
use super::rules::FilterRules;
use crate::clock::Clock;
use crate::error::IngestError;
use crate::features::logs::models::LogEntry;
use crate::features::logs::repository::LogRepository;

/// 每个事务写入的最大条数
pub const BATCH_SIZE: usize = 1000;

/// 一次导入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// 已提交的条目数
    pub ingested: usize,
    /// 已安全处理的输入字节数
    pub consumed_bytes: u64,
}

/// 从字节流导入日志，按批提交
///
/// 每批一个事务。某批提交失败即停止，错误中带上此前已提交的条数
/// 与这些批次覆盖到的字节位置；不做重试。
pub async fn ingest_reader<R, S>(
    reader: R,
    repo: &S,
    rules: &FilterRules,
    clock: &dyn Clock,
) -> Result<IngestReport, IngestError>
where
    R: AsyncBufRead + Unpin,
    S: LogRepository,
{
    let mut entries = EntryReader::new(reader, rules, clock);
    let mut batch: Vec<LogEntry> = Vec::with_capacity(BATCH_SIZE);
    let mut committed = 0usize;
    let mut committed_bytes = 0u64;

    loop {
        let next = entries.next_entry().await.map_err(|e| IngestError::Read {
            committed,
            committed_bytes,
            message: e.to_string(),
        })?;
        let done = next.is_none();
        if let Some(entry) = next {
            batch.push(entry);
        }

        if done || batch.len() >= BATCH_SIZE {
            if !batch.is_empty() {
                repo.insert_batch(&batch)
                    .await
                    .map_err(|e| IngestError::Commit {
                        committed,
                        committed_bytes,
                        message: e.to_string(),
                    })?;
                committed += batch.len();
                tracing::debug!("已提交 {} 条（累计 {}）", batch.len(), committed);
                batch.clear();
            }
            committed_bytes = entries.consumed_bytes();
        }

        if done {
            break;
        }
    }

    let stats = entries.stats();
    tracing::info!(
        "导入完成: lines={} malformed={} skipped={} committed={}",
        stats.lines,
        stats.malformed,
        stats.skipped,
        committed
    );

    Ok(IngestReport {
        ingested: committed,
        consumed_bytes: committed_bytes,
    })
}
