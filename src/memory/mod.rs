//! 会话层：追加式日志、频道文件格式、持久化

pub mod conversation;
pub mod format;
pub mod persistence;

pub use conversation::{Author, ConversationLog, Message, USER_AUTHOR};
pub use format::{estimate_tokens, parse_channel, render_channel, ParsedMessage};
pub use persistence::{ChannelStore, FileChannelStore, MemoryChannelStore};
