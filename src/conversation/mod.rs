//! 与对话代理交互：传输抽象、会话驱动、回复分类、Scripted 模拟实现

pub mod classifier;
pub mod driver;
pub mod mock;
pub mod transport;

pub use classifier::{classify, extract_token, rate_limit_seconds, ReplySignal};
pub use driver::SessionDriver;
pub use mock::{ScriptedAgent, ScriptedAgentFactory};
pub use transport::{AgentMessage, AgentTransport, TransportFactory};
