//! 存储核心错误类型 / Storage core error types

/// Core result alias / 核心 Result 别名
pub type Result<T> = std::result::Result<T, DriverError>;

/// Driver-level error taxonomy / 驱动层错误分类
///
/// 调用方可以按错误类型分支处理：`NotImplemented` 走回退逻辑，
/// `SessionNotFound`/`SessionExpired` 拒绝回调，其余直接上抛。
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Missing required context value, never retried / 缺少必要的上下文参数
    #[error("参数缺失: {0}")]
    Validation(String),

    /// Any failure from the remote vendor call / 存储端调用失败
    #[error("存储端错误: {0}")]
    Backend(anyhow::Error),

    /// Capability the backend genuinely lacks / 后端不支持的能力
    #[error("未实现")]
    NotImplemented,

    /// Callback for an unknown or already finalized correlation key
    /// 未知或已完成的上传会话
    #[error("上传会话不存在: {0}")]
    SessionNotFound(String),

    /// Callback arrived after the session's ttl elapsed / 上传会话已过期
    #[error("上传会话已过期: {0}")]
    SessionExpired(String),
}

impl From<anyhow::Error> for DriverError {
    fn from(err: anyhow::Error) -> Self {
        DriverError::Backend(err)
    }
}

impl DriverError {
    /// 便捷构造：存储端错误 / Convenience constructor for backend errors
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DriverError::Backend(anyhow::Error::new(err))
    }
}
