//! 上传会话管理 / Upload session management
//!
//! 客户端直传的两阶段完成协议：签发 Token 时登记待完成会话，
//! 存储端异步回调带着关联键回来，这里定位并一次性关闭会话。
//! 会话状态机 Pending → Finalized，过期的 Pending 会话拒绝回调。

use anyhow::anyhow;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

use crate::error::{DriverError, Result};

/// 上传策略文档 / Upload policy document
///
/// 过期时间 RFC3339，conditions 由具体后端按需追加。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub expiration: String,
    #[serde(default)]
    pub conditions: Vec<serde_json::Value>,
}

impl UploadPolicy {
    /// 从现在起 `ttl` 秒后过期 / Expires `ttl` seconds from now
    pub fn with_ttl(ttl: i64) -> Self {
        let expiration = (Utc::now() + Duration::seconds(ttl))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            expiration,
            conditions: Vec::new(),
        }
    }

    /// 序列化为待签名的策略文档 / Serialize into the signable policy document
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| DriverError::Backend(anyhow::Error::new(e)))?;
        Ok(STANDARD.encode(json))
    }
}

/// 回调策略 / Callback policy
///
/// 对后端不透明：JSON 后整体 base64-url 编码随凭证下发，
/// body 里的占位符由后端在回调时填充，不是签发时。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPolicy {
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
    #[serde(rename = "callbackBody")]
    pub callback_body: String,
}

impl CallbackPolicy {
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| DriverError::Backend(anyhow::Error::new(e)))?;
        Ok(URL_SAFE.encode(json))
    }
}

/// 回调 body 模板 / Callback body template
///
/// `$(fname)`/`$(fsize)`/`$(imgInfo)` 由存储端回调时填充。
pub fn callback_body(save_path: &str, key: &str) -> String {
    format!(
        "name=$(fname)&source_name={}&size=$(fsize)&pic_info=$(imgInfo)&key={}",
        save_path, key
    )
}

/// 会话状态 / Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Finalized,
}

/// 待完成的上传会话 / One pending direct upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub save_path: String,
    pub size: u64,
    pub callback_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
}

impl UploadSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 上传会话管理器 / Upload session manager
///
/// 会话表是共享可变状态，登记、查找、完成都在互斥锁下进行，
/// 两个并发回调不可能同时完成同一个关联键。
pub struct SessionManager {
    site_url: Url,
    sessions: Mutex<HashMap<String, UploadSession>>,
}

impl SessionManager {
    pub fn new(site_url: Url) -> Self {
        Self {
            site_url,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 生成新的关联键 / Fresh correlation key
    pub fn new_correlation_key() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// 生成回调地址 / Callback URL bound to a correlation key
    pub fn callback_url(&self, kind: &str, key: &str) -> Result<String> {
        let url = self
            .site_url
            .join(&format!("/api/callback/{}/{}", kind, key))
            .map_err(|e| DriverError::Backend(anyhow!("回调地址无效: {}", e)))?;
        Ok(url.to_string())
    }

    /// 登记待完成会话 / Register a pending session
    ///
    /// 同一关联键同时最多一个未完成会话；已过期或已完成的旧会话被覆盖。
    pub fn open(
        &self,
        key: &str,
        save_path: &str,
        size: u64,
        callback_url: String,
        ttl: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();

        if let Some(existing) = sessions.get(key) {
            if existing.state == SessionState::Pending && !existing.is_expired(now) {
                return Err(DriverError::Validation(format!(
                    "上传会话已存在: {}",
                    key
                )));
            }
        }

        sessions.insert(
            key.to_string(),
            UploadSession {
                save_path: save_path.to_string(),
                size,
                callback_url,
                created_at: now,
                expires_at: now + Duration::seconds(ttl),
                state: SessionState::Pending,
            },
        );

        tracing::debug!("上传会话登记: key={}, path={}", key, save_path);
        Ok(())
    }

    /// 回调完成会话 / Finalize against an incoming callback
    ///
    /// 未知键或已完成 → `SessionNotFound`；已过期 → `SessionExpired`；
    /// 存活的 Pending 会话恰好完成一次，返回其载荷交给元数据落库。
    pub fn finalize(&self, key: &str) -> Result<UploadSession> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();

        let session = sessions
            .get_mut(key)
            .ok_or_else(|| {
                tracing::warn!("回调未命中上传会话: key={}", key);
                DriverError::SessionNotFound(key.to_string())
            })?;

        if session.state == SessionState::Finalized {
            tracing::warn!("重复回调被拒绝: key={}", key);
            return Err(DriverError::SessionNotFound(key.to_string()));
        }

        if session.is_expired(now) {
            tracing::warn!("过期回调被拒绝: key={}", key);
            return Err(DriverError::SessionExpired(key.to_string()));
        }

        session.state = SessionState::Finalized;
        tracing::debug!("上传会话完成: key={}, path={}", key, session.save_path);
        Ok(session.clone())
    }

    /// 清理过期与已完成的会话 / Drop expired pending and finalized sessions
    ///
    /// 调用方周期性执行；返回清掉的数量。
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.state == SessionState::Pending && !s.is_expired(now));
        before - sessions.len()
    }

    /// 未完成会话数 / Pending session count
    pub fn pending_count(&self) -> usize {
        let sessions = self.sessions.lock();
        sessions
            .values()
            .filter(|s| s.state == SessionState::Pending)
            .count()
    }
}
