//! 核心层：错误分类与运行取消范围

pub mod error;
pub mod supervisor;

pub use error::AgentError;
pub use supervisor::{cancellable, RunSupervisor, StopHandle};
