//! 存储策略 / Storage policy
//!
//! 一条策略描述一个存储位置：厂商类型、凭证、存储桶、访问域名。
//! 加载后不可变，同一策略被它创建出的驱动实例以 `Arc` 共享引用。

use serde::{Deserialize, Serialize};

/// Per-storage-location configuration / 单个存储位置的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// 策略 ID（驱动实例缓存键）
    pub id: String,
    /// Vendor discriminator used by the registry / 厂商类型（注册表分发键）
    pub kind: String,
    /// Access Key
    pub access_key: String,
    /// Secret Key
    pub secret_key: String,
    /// 存储桶名称
    pub bucket_name: String,
    /// 访问域名（含协议，如 https://bucket.cn-bj.ufileos.com）
    pub base_url: String,
    /// 私有空间（需要签名 URL）/ Private bucket requiring signed URLs
    #[serde(default)]
    pub is_private: bool,
    /// 单文件大小限制（字节，0 为不限制）/ Per-file size limit, 0 = unlimited
    #[serde(default)]
    pub max_size: u64,
}

impl Policy {
    /// 访问域名去掉尾部斜杠 / Base URL without trailing slash
    pub fn file_host(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
