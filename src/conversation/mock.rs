//! Scripted 对话代理（用于测试与无真实传输时的演练运行）
//!
//! 在内存中模拟机器人管理账号的命令流程：/newbot → 起名 → 用户名 → Token，
//! 以及 /setuserpic、/deletebot、/revoke。可注入限流、配额、占用、静默、延迟 Token 等场景。

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::conversation::{AgentMessage, AgentTransport, TransportFactory};
use crate::core::TransportError;
use crate::identity::Identity;

/// 默认配额，与真实服务一致；回复文本固定写 20
const DEFAULT_QUOTA: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectAction {
    Photo,
    Delete,
    Revoke,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    Idle,
    AwaitName,
    AwaitHandle,
    AwaitSelect(SelectAction),
    AwaitPhoto,
    AwaitDeleteConfirm(String),
}

#[derive(Debug)]
struct AgentState {
    next_id: i64,
    log: Vec<AgentMessage>,
    flow: Flow,
    bots: Vec<String>,
    taken: HashSet<String>,
    quota: usize,
    token_seq: u64,
    /// 针对某条命令的预置回复（优先于正常流程）
    command_replies: HashMap<String, VecDeque<String>>,
    /// 针对用户名候选的预置回复（按顺序消费）
    handle_replies: VecDeque<String>,
    /// 收到这些用户名时不回复（各一次）
    unanswered_handles: HashSet<String>,
    /// 成功回复不带 Token，Token 在若干次拉取后单独到达
    delayed_token_polls: Option<u32>,
    pending: Vec<(u32, String)>,
    invalid_selections: u32,
    silent: bool,
    fail_requests: bool,
    authorized: bool,
    login_code: String,
    password: Option<String>,
    code_accepted: bool,
    sent: Vec<String>,
    photos: Vec<PathBuf>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            next_id: 1,
            log: Vec::new(),
            flow: Flow::Idle,
            bots: Vec::new(),
            taken: HashSet::new(),
            quota: DEFAULT_QUOTA,
            token_seq: 0,
            command_replies: HashMap::new(),
            handle_replies: VecDeque::new(),
            unanswered_handles: HashSet::new(),
            delayed_token_polls: None,
            pending: Vec::new(),
            invalid_selections: 0,
            silent: false,
            fail_requests: false,
            authorized: true,
            login_code: "12345".to_string(),
            password: None,
            code_accepted: false,
            sent: Vec::new(),
            photos: Vec::new(),
        }
    }
}

impl AgentState {
    fn push(&mut self, text: impl Into<String>, outgoing: bool) {
        let id = self.next_id;
        self.next_id += 1;
        self.log.push(AgentMessage {
            id,
            text: text.into(),
            outgoing,
        });
    }

    fn reply(&mut self, text: impl Into<String>) {
        if !self.silent {
            self.push(text, false);
        }
    }

    fn next_token(&mut self) -> String {
        self.token_seq += 1;
        format!("{}:AAMockToken{:020}", 700_000_000 + self.token_seq, self.token_seq)
    }

    fn handle_text(&mut self, text: &str) {
        if let Some(queue) = self.command_replies.get_mut(text) {
            if let Some(reply) = queue.pop_front() {
                self.reply(reply);
                return;
            }
        }

        match text {
            "/cancel" => {
                self.flow = Flow::Idle;
                self.reply("The command has been cancelled. Anything else I can do for you?");
                return;
            }
            "/start" | "/help" => {
                self.flow = Flow::Idle;
                self.reply("I can help you create and manage bots.");
                return;
            }
            "/newbot" => {
                if self.bots.len() >= self.quota {
                    self.reply("That I cannot do. You can't add more than 20 bots.");
                } else {
                    self.flow = Flow::AwaitName;
                    self.reply(
                        "Alright, a new bot. How are we going to call it? Please choose a name for your bot.",
                    );
                }
                return;
            }
            "/setuserpic" => return self.begin_select(SelectAction::Photo, "change profile photo"),
            "/deletebot" => return self.begin_select(SelectAction::Delete, "delete"),
            "/revoke" => return self.begin_select(SelectAction::Revoke, "generate a new token"),
            _ => {}
        }

        match self.flow.clone() {
            Flow::AwaitName => {
                self.flow = Flow::AwaitHandle;
                self.reply(
                    "Good. Now let's choose a username for your bot. It must end in `bot`. Like this, for example: TetrisBot or tetris_bot.",
                );
            }
            Flow::AwaitHandle => self.try_handle(text),
            Flow::AwaitSelect(action) => self.select(action, text),
            Flow::AwaitDeleteConfirm(handle) => {
                if text == "Yes, I am totally sure." {
                    self.bots.retain(|b| b != &handle);
                    self.flow = Flow::Idle;
                    self.reply("Done! The bot is gone. /help");
                } else {
                    self.reply("Please enter the confirmation text exactly like this:\nYes, I am totally sure.");
                }
            }
            Flow::AwaitPhoto | Flow::Idle => {
                self.reply("Unrecognized command. Say what?");
            }
        }
    }

    fn begin_select(&mut self, action: SelectAction, what: &str) {
        if self.bots.is_empty() {
            self.flow = Flow::Idle;
            self.reply("You have currently no bots.");
        } else {
            self.flow = Flow::AwaitSelect(action);
            self.reply(format!("Choose a bot to {}.", what));
        }
    }

    fn try_handle(&mut self, handle: &str) {
        if self.unanswered_handles.remove(handle) {
            return;
        }
        if let Some(reply) = self.handle_replies.pop_front() {
            self.reply(reply);
            return;
        }
        let valid = handle.len() >= 5
            && handle.to_lowercase().ends_with("bot")
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            self.reply("Sorry, this username is invalid.");
            return;
        }
        if self.taken.contains(&handle.to_lowercase()) {
            self.reply("Sorry, this username is already taken. Please try something different.");
            return;
        }

        self.taken.insert(handle.to_lowercase());
        self.bots.push(handle.to_string());
        self.flow = Flow::Idle;
        let token = self.next_token();
        let head = format!(
            "Done! Congratulations on your new bot. You will find it at t.me/{}. You can now add a description and profile picture for your bot.",
            handle
        );
        match self.delayed_token_polls {
            Some(polls) => {
                self.reply(head);
                self.pending.push((
                    polls,
                    format!("Use this token to access the HTTP API:\n{}", token),
                ));
            }
            None => self.reply(format!(
                "{}\n\nUse this token to access the HTTP API:\n{}\nKeep your token secure.",
                head, token
            )),
        }
    }

    fn select(&mut self, action: SelectAction, text: &str) {
        let handle = text.trim_start_matches('@');
        if self.invalid_selections > 0 || !self.bots.iter().any(|b| b == handle) {
            self.invalid_selections = self.invalid_selections.saturating_sub(1);
            self.reply("Invalid bot selected.");
            return;
        }
        match action {
            SelectAction::Photo => {
                self.flow = Flow::AwaitPhoto;
                self.reply("OK. Send me the new profile photo for the bot.");
            }
            SelectAction::Delete => {
                self.flow = Flow::AwaitDeleteConfirm(handle.to_string());
                self.reply(format!(
                    "OK, you selected @{}. Are you sure?\n\nSend 'Yes, I am totally sure.' to confirm you really want to delete this bot.",
                    handle
                ));
            }
            SelectAction::Revoke => {
                self.flow = Flow::Idle;
                let token = self.next_token();
                self.reply(format!(
                    "Your token was replaced with a new one. You can use this token to access HTTP API:\n{}",
                    token
                ));
            }
        }
    }

    /// 延迟消息在每次拉取时倒计时
    fn release_pending(&mut self) {
        let mut ready = Vec::new();
        self.pending.retain_mut(|(polls, text)| {
            if *polls == 0 {
                ready.push(text.clone());
                false
            } else {
                *polls -= 1;
                true
            }
        });
        for text in ready {
            self.reply(text);
        }
    }
}

/// 内存中的对话代理；Clone 共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    state: Arc<Mutex<AgentState>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 预置某条命令的下一次回复
    pub fn script_command_reply(&self, command: &str, reply: impl Into<String>) {
        self.lock()
            .command_replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply.into());
    }

    /// 预置下一次用户名候选的回复（可多次调用，按顺序消费）
    pub fn script_handle_reply(&self, reply: impl Into<String>) {
        self.lock().handle_replies.push_back(reply.into());
    }

    /// 下一次收到该用户名时不回复，流程停在等用户名
    pub fn ignore_handle(&self, handle: &str) {
        self.lock().unanswered_handles.insert(handle.to_string());
    }

    pub fn mark_taken(&self, handle: &str) {
        self.lock().taken.insert(handle.to_lowercase());
    }

    pub fn set_quota(&self, quota: usize) {
        self.lock().quota = quota;
    }

    pub fn delay_token(&self, polls: u32) {
        self.lock().delayed_token_polls = Some(polls);
    }

    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    pub fn fail_requests(&self, fail: bool) {
        self.lock().fail_requests = fail;
    }

    pub fn reject_next_selection(&self) {
        self.lock().invalid_selections += 1;
    }

    /// 需要登录（验证码 + 可选二次密码）
    pub fn require_login(&self, code: &str, password: Option<&str>) {
        let mut s = self.lock();
        s.authorized = false;
        s.login_code = code.to_string();
        s.password = password.map(str::to_string);
    }

    pub fn add_bot(&self, handle: &str) {
        let mut s = self.lock();
        s.bots.push(handle.to_string());
        s.taken.insert(handle.to_lowercase());
    }

    pub fn bots(&self) -> Vec<String> {
        self.lock().bots.clone()
    }

    /// 本账号发出的全部文本（按顺序）
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn photos(&self) -> Vec<PathBuf> {
        self.lock().photos.clone()
    }

    pub fn authorized(&self) -> bool {
        self.lock().authorized
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.lock().fail_requests {
            return Err(TransportError::Request("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentTransport for ScriptedAgent {
    async fn is_authorized(&self) -> Result<bool, TransportError> {
        self.check()?;
        Ok(self.lock().authorized)
    }

    async fn request_login_code(&self) -> Result<(), TransportError> {
        self.check()
    }

    async fn sign_in(&self, code: &str) -> Result<(), TransportError> {
        self.check()?;
        let mut s = self.lock();
        if code.trim() != s.login_code {
            return Err(TransportError::Auth("invalid login code".to_string()));
        }
        s.code_accepted = true;
        if s.password.is_some() {
            return Err(TransportError::PasswordRequired);
        }
        s.authorized = true;
        Ok(())
    }

    async fn sign_in_password(&self, password: &str) -> Result<(), TransportError> {
        self.check()?;
        let mut s = self.lock();
        if !s.code_accepted || s.password.as_deref() != Some(password) {
            return Err(TransportError::Auth("invalid password".to_string()));
        }
        s.authorized = true;
        Ok(())
    }

    async fn send_text(&self, _peer: &str, text: &str) -> Result<(), TransportError> {
        self.check()?;
        let mut s = self.lock();
        if !s.authorized {
            return Err(TransportError::Auth("not authorized".to_string()));
        }
        s.sent.push(text.to_string());
        s.push(text, true);
        s.handle_text(text);
        Ok(())
    }

    async fn send_photo(&self, _peer: &str, image: &Path) -> Result<(), TransportError> {
        self.check()?;
        let mut s = self.lock();
        s.photos.push(image.to_path_buf());
        s.push("[photo]", true);
        if s.flow == Flow::AwaitPhoto {
            s.flow = Flow::Idle;
            s.reply("Success! Profile photo updated. /help");
        } else {
            s.reply("Unrecognized command. Say what?");
        }
        Ok(())
    }

    async fn recent_messages(
        &self,
        _peer: &str,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, TransportError> {
        self.check()?;
        let mut s = self.lock();
        s.release_pending();
        Ok(s.log.iter().rev().take(limit).cloned().collect())
    }
}

/// 每个账号对应一个 ScriptedAgent；记录连接顺序
#[derive(Debug, Default)]
pub struct ScriptedAgentFactory {
    agents: Mutex<HashMap<String, ScriptedAgent>>,
    connections: Mutex<Vec<String>>,
    refuse: Mutex<HashSet<String>>,
}

impl ScriptedAgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 账号对应的代理（不存在则创建）
    pub fn agent(&self, identity: &str) -> ScriptedAgent {
        self.agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// 该账号的连接请求一律失败
    pub fn refuse(&self, identity: &str) {
        self.refuse
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity.to_string());
    }

    /// 按顺序列出被连接过的账号
    pub fn connections(&self) -> Vec<String> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TransportFactory for ScriptedAgentFactory {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn AgentTransport>, TransportError> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(identity.id.clone());
        if self
            .refuse
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&identity.id)
        {
            return Err(TransportError::Connection(format!(
                "connection refused for {}",
                identity.id
            )));
        }
        Ok(Box::new(self.agent(&identity.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newbot_flow_issues_token() {
        let agent = ScriptedAgent::new();
        agent.send_text("BotFather", "/newbot").await.unwrap();
        agent.send_text("BotFather", "Cat").await.unwrap();
        agent.send_text("BotFather", "cat_bot").await.unwrap();
        let last = agent.recent_messages("BotFather", 1).await.unwrap();
        assert!(last[0].text.starts_with("Done!"));
        assert!(crate::conversation::extract_token(&last[0].text).is_some());
        assert_eq!(agent.bots(), vec!["cat_bot".to_string()]);
    }

    #[tokio::test]
    async fn test_taken_handle_rejected() {
        let agent = ScriptedAgent::new();
        agent.mark_taken("catbot");
        agent.send_text("BotFather", "/newbot").await.unwrap();
        agent.send_text("BotFather", "Cat").await.unwrap();
        agent.send_text("BotFather", "catbot").await.unwrap();
        let last = agent.recent_messages("BotFather", 1).await.unwrap();
        assert!(last[0].text.contains("already taken"));
    }

    #[tokio::test]
    async fn test_delayed_token_arrives_after_polls() {
        let agent = ScriptedAgent::new();
        agent.delay_token(2);
        agent.send_text("BotFather", "/newbot").await.unwrap();
        agent.send_text("BotFather", "Cat").await.unwrap();
        agent.send_text("BotFather", "cat_bot").await.unwrap();
        let first = agent.recent_messages("BotFather", 1).await.unwrap();
        assert!(crate::conversation::extract_token(&first[0].text).is_none());
        agent.recent_messages("BotFather", 1).await.unwrap();
        let third = agent.recent_messages("BotFather", 1).await.unwrap();
        assert!(crate::conversation::extract_token(&third[0].text).is_some());
    }

    #[tokio::test]
    async fn test_factory_records_connections() {
        let factory = ScriptedAgentFactory::new();
        factory.refuse("+2");
        let a = Identity::new("+1", 1, "h");
        let b = Identity::new("+2", 2, "h");
        assert!(factory.connect(&a).await.is_ok());
        assert!(factory.connect(&b).await.is_err());
        assert_eq!(factory.connections(), vec!["+1".to_string(), "+2".to_string()]);
    }
}
