//! 频道持久化
//!
//! `ChannelStore` 是会话日志的持久层：追加一个完整块、或整体截断为空。
//! 文件实现以追加模式写入并 fsync，写入失败时回滚到写入前的长度，不留半块。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::memory::format::render_message;
use crate::memory::Message;

/// 持久层接口（在日志锁内、阻塞线程池中被调用）
pub trait ChannelStore: Send + Sync {
    /// 追加单条消息；返回前必须完成落盘
    fn append(&mut self, msg: &Message) -> std::io::Result<()>;

    /// 清空全部内容（Restart）
    fn truncate(&mut self) -> std::io::Result<()>;
}

/// 频道文本文件（默认 channel.txt）
#[derive(Debug)]
pub struct FileChannelStore {
    path: PathBuf,
}

impl FileChannelStore {
    /// 父目录不存在时自动创建
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// 读取整个频道文本；文件不存在时返回空字符串
    pub fn read_all(&self) -> std::io::Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn open_append(&self) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl ChannelStore for FileChannelStore {
    fn append(&mut self, msg: &Message) -> std::io::Result<()> {
        let block = render_message(msg);
        let mut file = self.open_append()?;
        let before = file.metadata()?.len();

        let written = file.write_all(block.as_bytes()).and_then(|_| file.sync_data());
        if let Err(e) = written {
            // 回滚半块
            if let Err(rollback) = file.set_len(before) {
                tracing::error!("Channel rollback failed for {}: {}", self.path.display(), rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()
    }
}

/// 纯内存存储（测试与无落盘演示用）
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    pub content: String,
}

impl ChannelStore for MemoryChannelStore {
    fn append(&mut self, msg: &Message) -> std::io::Result<()> {
        self.content.push_str(&render_message(msg));
        Ok(())
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        self.content.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::format::parse_channel;
    use crate::memory::{Author, ConversationLog};
    use crate::roster::AgentId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_appends_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channel.txt");
        let store = FileChannelStore::new(&path).unwrap();
        let log = ConversationLog::open(Box::new(store)).unwrap();

        log.append(Author::User, "Hello").await.unwrap();
        log.append(Author::agent(AgentId::from("bot"), "Bot"), "Hi there!")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[1] User"));
        assert!(content.contains("[2] Bot"));
        let parsed = parse_channel(&content);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].body, "Hi there!");
    }

    #[tokio::test]
    async fn test_open_and_reset_truncate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("channel.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale content").unwrap();

        let log = ConversationLog::open(Box::new(FileChannelStore::new(&path).unwrap())).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        log.append(Author::User, "one").await.unwrap();
        log.reset().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        log.append(Author::User, "two").await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[1] User"));
    }

    #[test]
    fn test_read_all_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = FileChannelStore::new(dir.path().join("missing.txt")).unwrap();
        assert_eq!(store.read_all().unwrap(), "");
    }
}
