//! RAG 子系统启动器：两个外部进程（检索服务端 + 查询处理端）
//!
//! 先启动服务端，按固定间隔轮询其 stdout，出现就绪标记（配置项）即继续；超时则记录警告后照常继续。
//! 随后启动查询端。两个进程的 stdout / stderr 由后台任务逐行写入日志，直到流关闭。
//! 进程句柄由启动器持有：kill_on_drop 保证随启动器释放，shutdown 显式 kill 并回收。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RetrievalSection;
use crate::core::AgentError;

/// 启动器 trait：调度循环只关心「启动」与「关闭」
#[async_trait]
pub trait RetrievalLauncher: Send {
    async fn launch(&mut self) -> Result<LaunchReport, AgentError>;

    /// 终止本启动器创建的所有进程（未启动时为空操作）
    async fn shutdown(&mut self);
}

/// 一次启动的结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    /// 是否在超时前看到就绪标记
    pub server_ready: bool,
    pub server_pid: Option<u32>,
    pub query_pid: Option<u32>,
}

/// 启动参数（来自 [retrieval] 段）
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub server_command: PathBuf,
    pub query_command: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub ready_sentinel: Option<String>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&RetrievalSection> for LaunchSettings {
    fn from(section: &RetrievalSection) -> Self {
        Self {
            server_command: section.server_command.clone(),
            query_command: section.query_command.clone(),
            working_dir: section.working_dir.clone(),
            ready_sentinel: section.ready_sentinel.clone(),
            startup_timeout: Duration::from_secs(section.startup_timeout_secs),
            poll_interval: Duration::from_millis(section.poll_interval_ms.max(1)),
        }
    }
}

/// 正在运行的一组进程与其日志转发任务
struct RetrievalSession {
    server: Child,
    query: Child,
    log_tasks: Vec<JoinHandle<()>>,
}

impl RetrievalSession {
    async fn terminate(mut self) {
        for (name, child) in [("server", &mut self.server), ("query", &mut self.query)] {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!(process = name, status = %status, "retrieval process already exited");
                }
                _ => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(process = name, error = %e, "failed to kill retrieval process");
                    } else {
                        tracing::info!(process = name, "retrieval process terminated");
                    }
                }
            }
        }
        for task in self.log_tasks {
            task.abort();
        }
    }
}

/// 基于子进程的启动器
pub struct ProcessLauncher {
    settings: LaunchSettings,
    session: Option<RetrievalSession>,
}

impl ProcessLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, name: &'static str, program: &Path) -> Result<Child, AgentError> {
        self.command(program).spawn().map_err(|e| {
            AgentError::SubprocessFailure(format!("{} ({}): {}", name, program.display(), e))
        })
    }

    /// 在超时内轮询服务端输出，看到就绪标记返回 true
    async fn wait_until_ready(&self, lines: &mut mpsc::UnboundedReceiver<String>) -> bool {
        let Some(sentinel) = self.settings.ready_sentinel.as_deref() else {
            tracing::warn!(
                timeout_secs = self.settings.startup_timeout.as_secs(),
                "no ready_sentinel configured, waiting for the full startup timeout"
            );
            tokio::time::sleep(self.settings.startup_timeout).await;
            return false;
        };

        let deadline = Instant::now() + self.settings.startup_timeout;
        loop {
            loop {
                match lines.try_recv() {
                    Ok(line) if line.contains(sentinel) => return true,
                    Ok(_) => continue,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        tracing::warn!("retrieval server closed stdout before becoming ready");
                        return false;
                    }
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    sentinel = %sentinel,
                    "retrieval server not ready within timeout, continuing anyway"
                );
                return false;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

/// 逐行转发输出到日志；若提供 tap，同时把行发给就绪探测（接收端关闭后停止发送）
fn stream_to_log<R>(
    reader: R,
    process: &'static str,
    stream: &'static str,
    mut tap: Option<mpsc::UnboundedSender<String>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if stream == "stderr" {
                        tracing::warn!(target: "foreman::retrieval", process, "{}", line);
                    } else {
                        tracing::info!(target: "foreman::retrieval", process, "{}", line);
                    }
                    if tap.as_ref().is_some_and(|tx| tx.send(line).is_err()) {
                        tap = None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(process, stream, error = %e, "failed to read process output");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl RetrievalLauncher for ProcessLauncher {
    async fn launch(&mut self) -> Result<LaunchReport, AgentError> {
        // 同一时间只保留一组进程
        if let Some(previous) = self.session.take() {
            tracing::info!("restarting retrieval subsystem");
            previous.terminate().await;
        }

        let mut server = self.spawn("server", &self.settings.server_command)?;
        let server_pid = server.id();
        tracing::info!(pid = ?server_pid, command = %self.settings.server_command.display(), "retrieval server started");

        let mut log_tasks = Vec::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(out) = server.stdout.take() {
            log_tasks.push(stream_to_log(out, "server", "stdout", Some(tx)));
        }
        if let Some(err) = server.stderr.take() {
            log_tasks.push(stream_to_log(err, "server", "stderr", None));
        }

        let server_ready = self.wait_until_ready(&mut rx).await;
        drop(rx);

        let mut query = match self.spawn("query", &self.settings.query_command) {
            Ok(child) => child,
            Err(e) => {
                // 服务端已启动：失败时一并收回，避免留下孤儿进程
                let _ = server.kill().await;
                for task in log_tasks {
                    task.abort();
                }
                return Err(e);
            }
        };
        let query_pid = query.id();
        tracing::info!(pid = ?query_pid, command = %self.settings.query_command.display(), "retrieval query handler started");
        if let Some(out) = query.stdout.take() {
            log_tasks.push(stream_to_log(out, "query", "stdout", None));
        }
        if let Some(err) = query.stderr.take() {
            log_tasks.push(stream_to_log(err, "query", "stderr", None));
        }

        self.session = Some(RetrievalSession {
            server,
            query,
            log_tasks,
        });

        Ok(LaunchReport {
            server_ready,
            server_pid,
            query_pid,
        })
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.terminate().await;
        }
    }
}
