//! Foreman - 命令行调度智能体
//!
//! 入口：初始化日志、加载并校验配置、组装调度器，并在 stdin/stdout 上运行交互循环。

use anyhow::Context;
use foreman::{
    agent::create_dispatcher,
    config::{load_config, Credentials},
    core::RunExit,
};
use tokio::io::BufReader;

/// 等待 Ctrl+C；无法注册信号处理时永不完成
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    foreman::observability::init();

    let cfg = load_config(None).context("Failed to load configuration")?;
    // 凭据缺失时直接退出，不使用任何内置默认值
    let creds = Credentials::resolve(&cfg).context("Invalid configuration")?;
    let mut dispatcher = create_dispatcher(&cfg, &creds).context("Failed to create dispatcher")?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    let exit = dispatcher
        .run_until(stdin, &mut stdout, ctrl_c())
        .await
        .context("Dispatch loop failed")?;
    if exit == RunExit::Interrupted {
        tracing::info!("Received Ctrl+C, shutting down");
        // tokio stdin 的阻塞读取无法取消，运行时析构会等到下一次回车
        std::process::exit(0);
    }

    Ok(())
}
