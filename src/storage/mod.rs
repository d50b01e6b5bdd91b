use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{DriverError, Result};
use crate::policy::Policy;
use crate::response::HttpStream;

pub mod batch;
pub mod manager;
pub mod paginator;

pub use manager::{DriverBox, DriverFactory, StorageManager};

/// 预览链接默认有效期（秒）/ Default ttl for preview source URLs
pub const PREVIEW_TIMEOUT: i64 = 60;

/// 默认内容类型（不按扩展名探测，统一二进制流）
/// Default content type, deliberately no per-extension detection
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Remote object entry / 远端对象条目
///
/// 每次列表调用现构现返，值类型，返回后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    /// 相对于列表基准路径，统一正斜杠 / Relative to the listing base, forward slashes
    pub relative_path: String,
    pub size: u64,
    pub is_dir: bool,
    /// 原始对象键（目录条目为空）/ Raw object key, empty for directories
    #[serde(default)]
    pub source: String,
    pub last_modified: DateTime<Utc>,
}

/// 缩略图等直接返回内容的响应 / Inline content response (thumbnails etc.)
#[derive(Debug, Clone)]
pub struct ContentResponse {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// 上传凭证，交给客户端直传存储端 / Credential handed to the direct-upload client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCredential {
    /// 签名后的上传策略文档 / Signed policy document, opaque
    pub policy: String,
    /// 目标存储路径 / Destination path
    pub path: String,
    /// Access Key
    pub access_key: String,
    /// 签名令牌 / Signed token, opaque
    pub token: String,
}

/// 上传调用上下文 / Calling context for upload operations
///
/// Token 签发前必须先在上下文中准备好存储路径与文件大小，
/// 缺一即 `Validation` 错误。
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    pub save_path: Option<String>,
    pub file_size: Option<u64>,
    pub content_type: Option<String>,
}

impl UploadContext {
    pub fn new(save_path: impl Into<String>, file_size: u64) -> Self {
        Self {
            save_path: Some(save_path.into()),
            file_size: Some(file_size),
            content_type: None,
        }
    }

    /// 读取存储路径，缺失即参数错误 / Save path or `Validation` error
    pub fn require_save_path(&self) -> Result<&str> {
        self.save_path
            .as_deref()
            .ok_or_else(|| DriverError::Validation("无法获取存储路径".to_string()))
    }

    /// 读取文件大小，缺失即参数错误 / Declared size or `Validation` error
    pub fn require_file_size(&self) -> Result<u64> {
        self.file_size
            .ok_or_else(|| DriverError::Validation("无法获取文件大小".to_string()))
    }

    /// 内容类型，未指定时统一回落为二进制流 / Content type with binary fallback
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// 统一存储驱动契约 / Uniform storage driver contract
///
/// 每个厂商适配器实现这七个操作。所有操作都是普通 Future，
/// 调用方取消即 drop，未完成的网络请求随之中止；
/// 超时策略在共享 HTTP 客户端上配置。
#[async_trait]
pub trait Driver: Send + Sync {
    /// 驱动引用的策略 / The policy this driver was built from
    fn policy(&self) -> &Policy;

    /// List entries under a base path / 列出基准路径下的条目
    ///
    /// 透明翻页到底；目录前缀与文件条目去重；任一页失败则整体失败，
    /// 不返回部分结果。
    async fn list(&self, base: &str, recursive: bool) -> Result<Vec<Object>>;

    /// Open a readable stream for one object / 打开对象读取流
    ///
    /// 先经 `source` 解析出限时签名或公开 URL，再对其发起 GET。
    /// 调用方上下文已知实体大小时，返回的流按该大小上报长度。
    async fn get(&self, path: &str, declared_size: Option<u64>) -> Result<HttpStream>;

    /// Stream content to a destination path / 流式上传到目标路径
    async fn put(
        &self,
        file: Box<dyn AsyncRead + Send + Unpin + 'static>,
        dst: &str,
        size: u64,
    ) -> Result<()>;

    /// Batch delete by key / 按对象键批量删除
    ///
    /// 返回 (失败键列表, 最后一个错误)。失败键各出现一次，顺序不保证；
    /// 只保留最后一个错误，需要完整诊断的调用方对比失败数与输入数。
    async fn delete(&self, paths: Vec<String>) -> (Vec<String>, Option<DriverError>);

    /// 获取缩略图 / Thumbnail
    ///
    /// 不支持的后端必须显式返回 `NotImplemented`，不得静默成功。
    async fn thumb(&self, _path: &str) -> Result<ContentResponse> {
        Err(DriverError::NotImplemented)
    }

    /// Resolve a download/preview URL / 解析下载（预览）URL
    ///
    /// 公开空间返回无签名的稳定 URL；私有空间返回 `ttl` 秒后过期的签名 URL。
    async fn source(
        &self,
        path: &str,
        ttl: i64,
        is_download: bool,
        speed_limit: u64,
    ) -> Result<String>;

    /// Issue a direct-upload credential / 签发直传上传凭证
    ///
    /// 凭证与回调 URL 绑定关联键，同时登记待完成的上传会话。
    async fn token(&self, ttl: i64, key: &str, ctx: &UploadContext) -> Result<UploadCredential>;
}

impl std::fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("policy_id", &self.policy().id)
            .finish()
    }
}
