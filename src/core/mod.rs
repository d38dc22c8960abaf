//! 核心层：错误分类与调度阶段

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{DispatchPhase, RunExit, TurnOutcome};
