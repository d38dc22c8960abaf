//! 调度循环集成测试：Mock LLM + 记录型集成替身，走完整的 run()

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use foreman::core::{AgentError, DispatchPhase, RunExit};
    use foreman::dispatch::Dispatcher;
    use foreman::llm::MockLlmClient;
    use foreman::tools::{
        DatabaseConnection, DatabaseConnector, LaunchReport, ResultSet, RetrievalLauncher,
        SearchBackend, SearchResult, SqliteConnector,
    };

    #[derive(Default)]
    struct RecordingSearch {
        queries: Mutex<Vec<String>>,
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchBackend for RecordingSearch {
        async fn search(&self, query: &str) -> Vec<SearchResult> {
            self.queries.lock().unwrap().push(query.to_string());
            self.results.clone()
        }
    }

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        queries: AtomicUsize,
        closes: AtomicUsize,
    }

    struct RecordingConnector {
        counters: Arc<Counters>,
        fail_connect: bool,
        fail_queries: bool,
    }

    #[async_trait]
    impl DatabaseConnector for RecordingConnector {
        async fn connect(&self) -> Result<Box<dyn DatabaseConnection>, AgentError> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(AgentError::ConnectionFailure("connection refused".into()));
            }
            Ok(Box::new(RecordingConnection {
                counters: self.counters.clone(),
                fail_queries: self.fail_queries,
            }))
        }
    }

    struct RecordingConnection {
        counters: Arc<Counters>,
        fail_queries: bool,
    }

    #[async_trait]
    impl DatabaseConnection for RecordingConnection {
        async fn run_query(&mut self, _sql: &str) -> Result<ResultSet, AgentError> {
            self.counters.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_queries {
                return Err(AgentError::QueryFailure("syntax error at or near \"broken\"".into()));
            }
            Ok(ResultSet {
                columns: vec!["n".into()],
                rows: vec![vec!["1".into()]],
                rows_affected: None,
            })
        }

        async fn close(self: Box<Self>) -> Result<(), AgentError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct LaunchCounters {
        launches: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    struct FakeLauncher {
        counters: LaunchCounters,
    }

    #[async_trait]
    impl RetrievalLauncher for FakeLauncher {
        async fn launch(&mut self) -> Result<LaunchReport, AgentError> {
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            Ok(LaunchReport {
                server_ready: true,
                server_pid: Some(100),
                query_pid: Some(101),
            })
        }

        async fn shutdown(&mut self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        llm: Arc<MockLlmClient>,
        search: Arc<RecordingSearch>,
        db: Arc<Counters>,
        rag: LaunchCounters,
        dispatcher: Dispatcher,
    }

    fn harness_with(llm: MockLlmClient, search: RecordingSearch, fail_queries: bool) -> Harness {
        let llm = Arc::new(llm);
        let search = Arc::new(search);
        let db = Arc::new(Counters::default());
        let rag = LaunchCounters::default();
        let dispatcher = Dispatcher::new(
            llm.clone(),
            search.clone(),
            Arc::new(RecordingConnector {
                counters: db.clone(),
                fail_connect: false,
                fail_queries,
            }),
            Box::new(FakeLauncher {
                counters: rag.clone(),
            }),
        );
        Harness {
            llm,
            search,
            db,
            rag,
            dispatcher,
        }
    }

    fn harness(llm: MockLlmClient) -> Harness {
        harness_with(llm, RecordingSearch::default(), false)
    }

    async fn drive(dispatcher: &mut Dispatcher, input: &str) -> String {
        let mut out = Vec::new();
        dispatcher.run(input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_exit_makes_no_calls() {
        let mut h = harness(MockLlmClient::new());
        let out = drive(&mut h.dispatcher, "exit\n").await;

        assert!(out.starts_with("Manager Agent started."));
        assert!(out.contains("Exiting Manager Agent."));
        assert_eq!(h.llm.call_count(), 0);
        assert!(h.search.queries.lock().unwrap().is_empty());
        assert_eq!(h.db.connects.load(Ordering::SeqCst), 0);
        assert_eq!(h.rag.launches.load(Ordering::SeqCst), 0);
        assert_eq!(h.dispatcher.phase(), DispatchPhase::Terminated);
    }

    #[tokio::test]
    async fn test_exit_keyword_ignores_case_and_whitespace() {
        let mut h = harness(MockLlmClient::new());
        let out = drive(&mut h.dispatcher, "   EXIT  \nSearch for cats\n").await;

        assert!(out.contains("Exiting Manager Agent."));
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_end_of_input_terminates_and_stops_rag() {
        let mut h = harness(MockLlmClient::new());
        let out = drive(&mut h.dispatcher, "").await;

        assert!(out.contains("Exiting Manager Agent."));
        assert_eq!(h.rag.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.phase(), DispatchPhase::Terminated);
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting_for_input_stops_rag() {
        let llm = MockLlmClient::new();
        let mut h = harness(llm);
        // 写端保持打开：读取一直挂起，模拟终端上等待输入
        let (reader, writer) = tokio::io::duplex(64);
        let mut out = Vec::new();

        let exit = h
            .dispatcher
            .run_until(
                tokio::io::BufReader::new(reader),
                &mut out,
                tokio::time::sleep(std::time::Duration::from_millis(50)),
            )
            .await
            .unwrap();

        assert_eq!(exit, RunExit::Interrupted);
        assert_eq!(h.rag.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.phase(), DispatchPhase::Terminated);
        assert!(String::from_utf8(out).unwrap().ends_with("You: "));
        drop(writer);
    }

    #[tokio::test]
    async fn test_run_until_finishes_on_exit_keyword() {
        let mut h = harness(MockLlmClient::new());
        let mut out = Vec::new();
        let exit = h
            .dispatcher
            .run_until("exit\n".as_bytes(), &mut out, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(exit, RunExit::Finished);
        assert_eq!(h.rag.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rag_shortcut_skips_llm() {
        let mut h = harness(MockLlmClient::new());
        let out = drive(&mut h.dispatcher, "Check the internal docs for onboarding\nexit\n").await;

        assert_eq!(h.llm.call_count(), 0);
        assert_eq!(h.rag.launches.load(Ordering::SeqCst), 1);
        assert!(out.contains("Starting the RAG application for internal document processing..."));
        assert!(out.contains("RAG application is ready."));
        // run() 结束时关闭子系统
        assert_eq!(h.rag.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let search = RecordingSearch {
            results: vec![
                SearchResult {
                    title: "Rust 1.80 released".into(),
                    link: "https://blog.rust-lang.org/1.80".into(),
                },
                SearchResult {
                    title: "What's new in Rust".into(),
                    link: "https://example.org/rust".into(),
                },
            ],
            ..RecordingSearch::default()
        };
        let llm = MockLlmClient::with_replies([r#"Action: search_web("latest rust release notes")"#]);
        let mut h = harness_with(llm, search, false);
        let out = drive(&mut h.dispatcher, "Find the latest rust release notes\nexit\n").await;

        let prompts = h.llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(r#"User request: "Find the latest rust release notes""#));
        assert_eq!(
            *h.search.queries.lock().unwrap(),
            vec!["latest rust release notes".to_string()]
        );
        assert!(out.contains("Performing web search for: latest rust release notes"));
        assert!(out.contains("Data retrieved: 2 hits."));
        assert!(out.contains("1. Rust 1.80 released - https://blog.rust-lang.org/1.80"));
    }

    #[tokio::test]
    async fn test_search_request_is_embedded_after_examples() {
        let llm = MockLlmClient::with_replies([r#"Action: search_web("machine learning updates")"#]);
        let mut h = harness(llm);
        drive(&mut h.dispatcher, "Search for machine learning updates\nexit\n").await;

        let prompt = &h.llm.prompts()[0];
        // 一次来自内置示例，一次是本轮请求
        assert_eq!(
            prompt
                .matches(r#"User request: "Search for machine learning updates""#)
                .count(),
            2
        );
        assert_eq!(
            *h.search.queries.lock().unwrap(),
            vec!["machine learning updates".to_string()]
        );
    }

    #[tokio::test]
    async fn test_search_without_results() {
        let llm = MockLlmClient::with_replies(["Action: search_web(nothing at all)"]);
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "look for nothing at all\nexit\n").await;

        assert!(out.contains("No results found."));
        assert_eq!(h.search.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_without_action_is_reported() {
        let llm = MockLlmClient::with_replies(["I think you should search the web."]);
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "hello there\nexit\n").await;

        assert!(out.contains("LLM Response:\nI think you should search the web."));
        assert!(out.contains("No action detected in LLM response."));
        assert!(h.search.queries.lock().unwrap().is_empty());
        assert_eq!(h.db.connects.load(Ordering::SeqCst), 0);
        assert_eq!(h.rag.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_reported() {
        let llm = MockLlmClient::with_replies(["Action: launch_rockets(now)"]);
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "do something bold\nexit\n").await;

        assert!(out.contains("No recognizable action found in the response."));
        assert!(h.search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_loop_running() {
        let llm = MockLlmClient::new();
        llm.push_failure("connection reset");
        llm.push_reply("Action: search_web(second try)");
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "first request\nsecond request\nexit\n").await;

        assert!(out.contains("Failed to get a response from the LLM."));
        assert_eq!(h.llm.call_count(), 2);
        assert_eq!(
            *h.search.queries.lock().unwrap(),
            vec!["second try".to_string()]
        );
    }

    #[tokio::test]
    async fn test_query_failure_still_releases_connection() {
        let llm = MockLlmClient::with_replies(["Action: connect_to_database()"]);
        let mut h = harness_with(llm, RecordingSearch::default(), true);
        let out = drive(&mut h.dispatcher, "Run a query\nSELECT broken\nexit\n").await;

        assert!(out.contains("Please enter the SQL query you would like to run:"));
        assert!(out.contains("Error executing query:"));
        assert!(out.contains("Database connection closed."));
        assert_eq!(h.db.connects.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.queries.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_sql_closes_without_query() {
        let llm = MockLlmClient::with_replies(["Action: connect_to_database()"]);
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "Run a query\n\nexit\n").await;

        assert!(out.contains("No query entered."));
        assert_eq!(h.db.queries.load(Ordering::SeqCst), 0);
        assert_eq!(h.db.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let llm = Arc::new(MockLlmClient::with_replies(["Action: connect_to_database()"]));
        let counters = Arc::new(Counters::default());
        let mut dispatcher = Dispatcher::new(
            llm.clone(),
            Arc::new(RecordingSearch::default()),
            Arc::new(RecordingConnector {
                counters: counters.clone(),
                fail_connect: true,
                fail_queries: false,
            }),
            Box::new(FakeLauncher {
                counters: LaunchCounters::default(),
            }),
        );
        let out = drive(&mut dispatcher, "Connect to my database\nexit\n").await;

        assert!(out.contains("Failed to establish a database connection:"));
        assert!(!out.contains("Please enter the SQL query"));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_selected_rag_launches() {
        let llm = MockLlmClient::with_replies(["Action: start_rag_app()"]);
        let mut h = harness(llm);
        let out = drive(&mut h.dispatcher, "Process the onboarding handbook\nexit\n").await;

        assert_eq!(h.llm.call_count(), 1);
        assert_eq!(h.rag.launches.load(Ordering::SeqCst), 1);
        assert!(out.contains("RAG application is ready."));
    }

    #[tokio::test]
    async fn test_sqlite_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.db");
        let llm = Arc::new(MockLlmClient::with_replies([
            "Action: connect_to_database()",
            "Action: connect_to_database()",
            "Action: connect_to_database()",
        ]));
        let mut dispatcher = Dispatcher::new(
            llm.clone(),
            Arc::new(RecordingSearch::default()),
            Arc::new(SqliteConnector::new(&path)),
            Box::new(FakeLauncher {
                counters: LaunchCounters::default(),
            }),
        );

        let input = "Set up the table\n\
                     CREATE TABLE docs (id INTEGER, title TEXT)\n\
                     Add a row\n\
                     INSERT INTO docs VALUES (1, 'alpha')\n\
                     Show everything\n\
                     SELECT id, title FROM docs\n\
                     exit\n";
        let out = drive(&mut dispatcher, input).await;

        assert_eq!(llm.call_count(), 3);
        assert!(out.contains("Statement executed, 1 rows affected."));
        assert!(out.contains("id | title"));
        assert!(out.contains("alpha"));
        assert!(out.contains("(1 rows)"));
        assert_eq!(out.matches("Database connection closed.").count(), 3);
    }
}
