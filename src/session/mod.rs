//! 无状态传输下的会话：注册表与往返协议

pub mod registry;
pub mod transport;

pub use registry::{Session, SessionId, SessionRegistry, SessionSummary};
pub use transport::{AgentResponse, NextRequest, NextResponse};
