//! BotFactory - 多账号轮转的聊天机器人批量开通引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 对话传输抽象、会话驱动、回复分类、Scripted 代理
//! - **core**: 错误与恢复、账号轮转、运行互斥、主控循环
//! - **identity**: 账号列表、登录握手、密码提示信箱
//! - **provisioning**: 命名策略、创建状态机、头像、删除 / 重置 Token
//! - **storage**: 冻结表、状态表、Token 账本、命名覆盖表
//! - **observability**: tracing 初始化与运行日志流
//! - **console**: 命令行展示层

pub mod config;
pub mod console;
pub mod conversation;
pub mod core;
pub mod identity;
pub mod observability;
pub mod provisioning;
pub mod storage;

pub use crate::core::{Orchestrator, RunReport, RunRequest};
