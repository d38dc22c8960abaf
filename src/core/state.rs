//! 调度阶段
//!
//! 调度循环在 AwaitingInput / Classifying / Executing / Terminated 之间转移；
//! 每次转移写 debug 日志，测试可通过 Dispatcher::phase 观察终态。

use std::fmt;

/// 调度循环所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPhase {
    AwaitingInput,
    Classifying,
    Executing,
    Terminated,
}

impl Default for DispatchPhase {
    fn default() -> Self {
        DispatchPhase::AwaitingInput
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchPhase::AwaitingInput => "awaiting_input",
            DispatchPhase::Classifying => "classifying",
            DispatchPhase::Executing => "executing",
            DispatchPhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// 单轮处理结果：继续等待输入或终止
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Exit,
}

/// 主循环的结束方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    /// 退出关键字或输入结束
    Finished,
    /// 外部中断（Ctrl+C）；阻塞中的输入读取可能仍未返回
    Interrupted,
}
