//! 本地日志文件增量尾随
//!
//! 偏移量只属于单个 [`FileTailer`] 实例，不同实例互不影响。
//! 文件缩小（截断）或 inode 变化（轮转）时偏移量归零，从头重新读取。

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::pipeline::ingest_reader;
use super::rules::FilterRules;
use crate::clock::Clock;
use crate::error::IngestError;
use crate::features::logs::repository::LogRepository;
use crate::shutdown::ShutdownHandle;

pub struct FileTailer<S> {
    path: PathBuf,
    offset: u64,
    inode: Option<u64>,
    repo: Arc<S>,
    rules: Arc<FilterRules>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

impl<S> FileTailer<S>
where
    S: LogRepository + 'static,
{
    pub fn new(
        path: impl Into<PathBuf>,
        repo: Arc<S>,
        rules: Arc<FilterRules>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            inode: None,
            repo,
            rules,
            clock,
            poll_interval,
        }
    }

    /// 下一次读取的起始字节位置
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 读取自上次偏移以来新增的内容，返回本次提交的条数
    ///
    /// 失败时偏移量只前进到已提交批次覆盖的位置。
    pub async fn scan(&mut self) -> Result<usize, IngestError> {
        let open_err = |e: std::io::Error| IngestError::Open {
            message: format!("{}: {e}", self.path.display()),
        };

        let mut file = tokio::fs::File::open(&self.path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        let size = meta.len();
        let inode = file_identity(&meta);

        if size < self.offset {
            info!(
                "日志文件 {} 被截断（{} < {}），从头读取",
                self.path.display(),
                size,
                self.offset
            );
            self.offset = 0;
        } else if matches!((self.inode, inode), (Some(prev), Some(cur)) if prev != cur) {
            info!("日志文件 {} 已轮转，从头读取", self.path.display());
            self.offset = 0;
        }
        self.inode = inode;

        if size == self.offset {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(open_err)?;
        let reader = BufReader::new(file);
        match ingest_reader(reader, self.repo.as_ref(), &self.rules, self.clock.as_ref()).await {
            Ok(report) => {
                self.offset += report.consumed_bytes;
                if report.ingested > 0 {
                    info!(
                        "尾随 {} 导入 {} 条，偏移 {}",
                        self.path.display(),
                        report.ingested,
                        self.offset
                    );
                }
                Ok(report.ingested)
            }
            Err(e) => {
                self.offset += e.committed_bytes();
                Err(e)
            }
        }
    }

    async fn scan_logged(&mut self) {
        if let Err(e) = self.scan().await {
            warn!("尾随 {} 失败: {}", self.path.display(), e);
        }
    }

    /// 监听文件所在目录；文件被删除重建后仍能收到事件
    fn watch(&self, tx: mpsc::UnboundedSender<()>) -> notify::Result<RecommendedWatcher> {
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let hit = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if hit && tx.send(()).is_err() {
                        debug!("文件事件接收端已关闭");
                    }
                }
                Err(e) => warn!("文件监听出错: {}", e),
            },
            notify::Config::default(),
        )?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    /// 持续尾随直到收到退出信号
    ///
    /// 先从偏移 0 做一次完整导入，之后在文件事件、兜底定时器、退出信号三者间等待。
    pub async fn run(mut self, mut shutdown: ShutdownHandle) {
        info!(
            "开始尾随 {}（兜底轮询 {:?}）",
            self.path.display(),
            self.poll_interval
        );
        self.scan_logged().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = match self.watch(tx) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("无法创建文件监听（仅使用定时轮询）: {}", e);
                None
            }
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            if shutdown.is_shutting_down() {
                break;
            }
            tokio::select! {
                _ = shutdown.wait() => break,
                Some(()) = rx.recv() => {
                    // 合并同一时刻的多次写入事件
                    while rx.try_recv().is_ok() {}
                    self.scan_logged().await;
                }
                _ = ticker.tick() => self.scan_logged().await,
            }
        }

        drop(watcher);
        info!("停止尾随 {}（偏移 {}）", self.path.display(), self.offset);
    }
}
