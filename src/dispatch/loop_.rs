//! 调度主循环
//!
//! 读一行 -> 快捷匹配（退出 / RAG）-> 否则拼分类 Prompt 调 LLM -> 解析 `Action:` 指令 -> 执行对应集成 -> 打印摘要。
//! 全程串行：每个操作完成后才读取下一行。单轮失败只打印提示并回到等待输入，不会结束循环。

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::core::{AgentError, DispatchPhase, RunExit, TurnOutcome};
use crate::dispatch::{parse_directive, ActionDirective, DirectiveError, PromptTemplate, Shortcut, ShortcutMatcher};
use crate::llm::LlmClient;
use crate::tools::{DatabaseConnection, DatabaseConnector, RetrievalLauncher, SearchBackend};

async fn say<W>(out: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// 调度器：持有模型、三个集成与快捷规则
pub struct Dispatcher {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchBackend>,
    database: Arc<dyn DatabaseConnector>,
    retrieval: Box<dyn RetrievalLauncher>,
    shortcuts: ShortcutMatcher,
    prompt: PromptTemplate,
    phase: DispatchPhase,
}

impl Dispatcher {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchBackend>,
        database: Arc<dyn DatabaseConnector>,
        retrieval: Box<dyn RetrievalLauncher>,
    ) -> Self {
        Self {
            llm,
            search,
            database,
            retrieval,
            shortcuts: ShortcutMatcher::default(),
            prompt: PromptTemplate::default(),
            phase: DispatchPhase::default(),
        }
    }

    /// 设置退出关键字与 RAG 触发词
    pub fn with_shortcuts(mut self, shortcuts: ShortcutMatcher) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    /// 设置分类 Prompt 模板
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    fn set_phase(&mut self, next: DispatchPhase) {
        if self.phase != next {
            tracing::debug!(from = %self.phase, to = %next, "dispatch phase");
            self.phase = next;
        }
    }

    /// 主循环：直到退出关键字或输入结束；返回前关闭 RAG 子进程
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        say(
            out,
            &format!(
                "Manager Agent started. Type your command or '{}' to stop.",
                self.shortcuts.exit_keyword()
            ),
        )
        .await?;

        let mut lines = input.lines();
        let result = self.read_eval_loop(&mut lines, out).await;
        self.shutdown().await;
        result
    }

    /// 与 [`run`](Self::run) 相同，但 `interrupt` 先完成时放弃当前轮次，关闭 RAG 子进程后返回 Interrupted
    pub async fn run_until<R, W, F>(&mut self, input: R, out: &mut W, interrupt: F) -> io::Result<RunExit>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let interrupted = tokio::select! {
            res = self.run(input, out) => {
                res?;
                false
            }
            _ = interrupt => true,
        };
        if !interrupted {
            return Ok(RunExit::Finished);
        }
        tracing::info!("dispatch loop interrupted");
        self.shutdown().await;
        Ok(RunExit::Interrupted)
    }

    async fn read_eval_loop<R, W>(&mut self, lines: &mut Lines<R>, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            self.set_phase(DispatchPhase::AwaitingInput);
            out.write_all(b"You: ").await?;
            out.flush().await?;

            let Some(line) = lines.next_line().await? else {
                say(out, "").await?;
                say(out, "Exiting Manager Agent.").await?;
                return Ok(());
            };
            if self.handle_line(&line, lines, out).await? == TurnOutcome::Exit {
                return Ok(());
            }
        }
    }

    /// 终止 RAG 子进程并进入 Terminated
    pub async fn shutdown(&mut self) {
        self.retrieval.shutdown().await;
        self.set_phase(DispatchPhase::Terminated);
    }

    /// 处理一行输入；数据库动作会从同一输入流再读一行 SQL
    pub async fn handle_line<R, W>(
        &mut self,
        line: &str,
        lines: &mut Lines<R>,
        out: &mut W,
    ) -> io::Result<TurnOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let input = line.trim();
        if input.is_empty() {
            return Ok(TurnOutcome::Continue);
        }

        match self.shortcuts.fast_match(input) {
            Some(Shortcut::Exit) => {
                say(out, "Exiting Manager Agent.").await?;
                return Ok(TurnOutcome::Exit);
            }
            Some(Shortcut::Rag) => {
                tracing::info!(input = %input, "rag shortcut matched, skipping classification");
                say(out, "Starting the RAG application for internal document processing...").await?;
                self.set_phase(DispatchPhase::Executing);
                self.start_rag(out).await?;
                return Ok(TurnOutcome::Continue);
            }
            None => {}
        }

        self.set_phase(DispatchPhase::Classifying);
        let Some(directive) = self.classify(input, out).await? else {
            return Ok(TurnOutcome::Continue);
        };

        self.set_phase(DispatchPhase::Executing);
        self.execute(directive, lines, out).await?;
        Ok(TurnOutcome::Continue)
    }

    /// 调用 LLM 分类；失败或回复不合规时打印提示并返回 None
    async fn classify<W>(&mut self, input: &str, out: &mut W) -> io::Result<Option<ActionDirective>>
    where
        W: AsyncWrite + Unpin,
    {
        let prompt = self.prompt.render(input);
        let reply = match self.llm.complete_prompt(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                tracing::warn!("llm returned an empty reply");
                say(out, "Failed to get a response from the LLM.").await?;
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "classification call failed");
                say(out, "Failed to get a response from the LLM.").await?;
                return Ok(None);
            }
        };
        say(out, &format!("LLM Response:\n{}", reply)).await?;

        match parse_directive(&reply) {
            Ok(directive) => {
                tracing::info!(action = %directive.tag(), "action selected");
                Ok(Some(directive))
            }
            Err(e) => {
                let message = match &e {
                    DirectiveError::MissingMarker => "No action detected in LLM response.".to_string(),
                    DirectiveError::Unrecognized(_) => {
                        "No recognizable action found in the response.".to_string()
                    }
                    other => format!("Could not use the LLM response: {}.", other),
                };
                let err = AgentError::from(e);
                tracing::warn!(error = %err, kind = err.kind(), reply = %reply, "unusable llm reply");
                say(out, &message).await?;
                Ok(None)
            }
        }
    }

    async fn execute<R, W>(
        &mut self,
        directive: ActionDirective,
        lines: &mut Lines<R>,
        out: &mut W,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let tag = directive.tag();
        let start = Instant::now();
        let result = match directive {
            ActionDirective::Search { query } => self.web_search(&query, out).await,
            ActionDirective::Database => self.database_turn(lines, out).await,
            ActionDirective::Rag => {
                say(out, "Starting the RAG application...").await?;
                self.start_rag(out).await
            }
        };
        tracing::info!(
            action = %tag,
            duration_ms = start.elapsed().as_millis() as u64,
            "action finished"
        );
        result
    }

    async fn web_search<W>(&self, query: &str, out: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        say(out, &format!("Performing web search for: {}", query)).await?;
        let results = self.search.search(query).await;
        if results.is_empty() {
            return say(out, "No results found.").await;
        }
        say(out, &format!("Data retrieved: {} hits.", results.len())).await?;
        for (idx, r) in results.iter().enumerate() {
            say(out, &format!("{}. {} - {}", idx + 1, r.title, r.link)).await?;
        }
        Ok(())
    }

    /// 连接 -> 读 SQL -> 执行 -> 无论成败都释放连接
    async fn database_turn<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        say(out, "Connecting to the database...").await?;
        let mut conn = match self.database.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "database connect failed");
                return say(out, &format!("Failed to establish a database connection: {}", e)).await;
            }
        };

        let result = query_once(conn.as_mut(), lines, out).await;

        match conn.close().await {
            Ok(()) => say(out, "Database connection closed.").await?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to close database connection");
                say(out, &format!("Failed to close the database connection: {}", e)).await?;
            }
        }
        result
    }

    async fn start_rag<W>(&mut self, out: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self.retrieval.launch().await {
            Ok(report) if report.server_ready => say(out, "RAG application is ready.").await,
            Ok(_) => {
                say(out, "RAG application started (readiness not confirmed, see logs).").await
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "rag launch failed");
                say(out, &format!("Failed to start the RAG application: {}", e)).await
            }
        }
    }
}

async fn query_once<R, W>(
    conn: &mut dyn DatabaseConnection,
    lines: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    say(out, "Please enter the SQL query you would like to run:").await?;
    let sql = match lines.next_line().await? {
        Some(sql) if !sql.trim().is_empty() => sql,
        _ => return say(out, "No query entered.").await,
    };

    tracing::info!(sql = %sql, "running query");
    match conn.run_query(sql.trim()).await {
        Ok(rows) => {
            out.write_all(rows.to_string().as_bytes()).await?;
            out.flush().await
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "query failed");
            say(out, &format!("Error executing query: {}", e)).await
        }
    }
}
