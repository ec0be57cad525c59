//! 会话日志：唯一事实来源
//!
//! 追加式消息序列。`append` 在同一把锁内分配序号并持久化，保证序号连续、无重复；
//! 持久化失败时内存日志不前进。`reset` 供 Restart 使用，清空并将序号重置为 1。
//! 落盘在 `spawn_blocking` 中执行，不占用运行时线程。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::ZooError;
use crate::memory::format::{estimate_tokens, ParsedMessage};
use crate::memory::ChannelStore;
use crate::roster::AgentId;

/// 保留给人类参与者的作者名
pub const USER_AUTHOR: &str = "User";

/// 消息作者：人类用户或某个 Agent（记录追加时刻的 id 与显示名）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Agent { id: AgentId, name: String },
}

impl Author {
    pub fn agent(id: AgentId, name: impl Into<String>) -> Self {
        Author::Agent {
            id,
            name: name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Author::User => USER_AUTHOR,
            Author::Agent { name, .. } => name,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Author::User)
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Author::User => None,
            Author::Agent { id, .. } => Some(id),
        }
    }
}

/// 单条消息，追加后不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub seq: u64,
    pub author: Author,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

type SharedStore = Arc<std::sync::Mutex<Box<dyn ChannelStore>>>;

struct LogInner {
    messages: Vec<Message>,
    /// 全部消息正文的估算 token 数，随追加累加
    total_tokens: usize,
    store: SharedStore,
}

/// 在阻塞线程池中对存储执行同步操作
async fn with_store<F>(store: &SharedStore, op: F) -> Result<(), ZooError>
where
    F: FnOnce(&mut Box<dyn ChannelStore>) -> std::io::Result<()> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut guard = store
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "channel store poisoned"))?;
        op(&mut guard)
    })
    .await
    .map_err(|e| ZooError::WriteFailure(e.to_string()))?
    .map_err(|e| ZooError::WriteFailure(e.to_string()))
}

/// 会话日志：内部互斥，快照读取与追加互不交错
pub struct ConversationLog {
    inner: Mutex<LogInner>,
}

impl ConversationLog {
    /// 以空日志启动，并清空存储（与每次新会话从空频道开始一致）
    pub fn open(mut store: Box<dyn ChannelStore>) -> Result<Self, ZooError> {
        store
            .truncate()
            .map_err(|e| ZooError::WriteFailure(e.to_string()))?;
        Ok(Self::with_messages(store, Vec::new()))
    }

    /// 从已解析的频道内容恢复（`--resume`）；作者 id 无法还原，按显示名重建
    pub fn resume(store: Box<dyn ChannelStore>, parsed: Vec<ParsedMessage>) -> Self {
        let now = Utc::now();
        let messages = parsed
            .into_iter()
            .enumerate()
            .map(|(i, p)| Message {
                seq: i as u64 + 1,
                author: if p.author == USER_AUTHOR {
                    Author::User
                } else {
                    Author::agent(AgentId::from(format!("restored:{}", p.author)), p.author)
                },
                body: p.body,
                timestamp: now,
            })
            .collect();
        Self::with_messages(store, messages)
    }

    fn with_messages(store: Box<dyn ChannelStore>, messages: Vec<Message>) -> Self {
        let total_tokens = messages.iter().map(|m| estimate_tokens(&m.body)).sum();
        Self {
            inner: Mutex::new(LogInner {
                messages,
                total_tokens,
                store: Arc::new(std::sync::Mutex::new(store)),
            }),
        }
    }

    /// 追加消息：分配下一个序号并持久化后才返回
    pub async fn append(&self, author: Author, body: impl Into<String>) -> Result<Message, ZooError> {
        let mut inner = self.inner.lock().await;
        let msg = Message {
            seq: inner.messages.len() as u64 + 1,
            author,
            body: body.into(),
            timestamp: Utc::now(),
        };
        let block = msg.clone();
        with_store(&inner.store, move |store| store.append(&block)).await?;
        inner.total_tokens += estimate_tokens(&msg.body);
        inner.messages.push(msg.clone());
        Ok(msg)
    }

    /// 清空日志与存储，下一次追加序号为 1
    pub async fn reset(&self) -> Result<(), ZooError> {
        let mut inner = self.inner.lock().await;
        with_store(&inner.store, |store| store.truncate()).await?;
        inner.messages.clear();
        inner.total_tokens = 0;
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().await.messages.clone()
    }

    /// 最近 n 条消息（状态展示用）
    pub async fn recent(&self, n: usize) -> Vec<Message> {
        let inner = self.inner.lock().await;
        let start = inner.messages.len().saturating_sub(n);
        inner.messages[start..].to_vec()
    }

    pub async fn total_tokens(&self) -> usize {
        self.inner.lock().await.total_tokens
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
