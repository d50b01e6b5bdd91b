//! UFile 对象存储客户端 / UFile object storage client
//!
//! 驱动只依赖 `ObjectClient` 这层窄接口，HTTP 与签名细节都在这里，
//! 测试用桩实现替换。签名为 HMAC-SHA1：下载走 URL 查询参数，
//! 管理接口走 Authorization 头，直传凭证签整个上传策略。

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::policy::Policy;
use crate::response::HTTP_CLIENT;
use crate::storage::paginator::{ObjectPage, RawObject};

type HmacSha1 = Hmac<Sha1>;

/// 厂商能力面 / The vendor capability surface drivers depend on
#[async_trait]
pub trait ObjectClient: Send + Sync + 'static {
    /// 拉取一页对象列表 / Fetch one listing page
    async fn list_page(
        &self,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        limit: usize,
    ) -> Result<ObjectPage>;

    /// 删除单个对象 / Delete one object
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// 流式上传对象 / Stream an object to the backend
    async fn put_object(
        &self,
        key: &str,
        body: Box<dyn AsyncRead + Send + Unpin + 'static>,
        size: u64,
        content_type: &str,
    ) -> Result<()>;

    /// 公开访问 URL（无签名）/ Public URL, unsigned
    fn public_url(&self, key: &str) -> String;

    /// 限时签名 URL / Signed URL valid until `expires_at` (unix seconds)
    fn private_url(&self, key: &str, expires_at: i64) -> String;

    /// 签名直传上传策略 / Sign a direct-upload policy
    fn sign_upload_policy(
        &self,
        method: &str,
        key: &str,
        policy: &str,
        callback: &str,
        content_type: &str,
    ) -> String;
}

/// UFile HTTP 客户端 / Real HTTP implementation
pub struct UfileClient {
    policy: Arc<Policy>,
    http: reqwest::Client,
}

impl UfileClient {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            http: HTTP_CLIENT.clone(),
        }
    }

    fn hmac_sha1(&self, data: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.policy.secret_key.as_bytes())
            .expect("HMAC-SHA1 接受任意长度密钥");
        mac.update(data.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// 管理接口的 Authorization 头 / Authorization header for management calls
    fn authorization(&self, method: &str, key: &str) -> String {
        let string_to_sign = format!("{}&{}&{}", method, self.policy.bucket_name, key);
        format!(
            "UCloud {}:{}",
            self.policy.access_key,
            self.hmac_sha1(&string_to_sign)
        )
    }

    /// 对象键按段转义，保留路径分隔 / Escape key segments, keep slashes
    fn escape_key(key: &str) -> String {
        key.split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl ObjectClient for UfileClient {
    async fn list_page(
        &self,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        limit: usize,
    ) -> Result<ObjectPage> {
        let url = format!("{}/?list", self.policy.file_host());
        let limit = limit.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("prefix", prefix),
                ("marker", marker),
                ("delimiter", delimiter),
                ("max-keys", limit.as_str()),
            ])
            .header("Authorization", self.authorization("GET", ""))
            .send()
            .await
            .context("列表请求失败")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("列表请求失败: {}", status));
        }

        let list: ListResponse = resp.json().await.context("列表响应解析失败")?;
        Ok(list.into())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let url = format!("{}/{}", self.policy.file_host(), Self::escape_key(key));
        let resp = self
            .http
            .delete(&url)
            .header("Authorization", self.authorization("DELETE", key))
            .send()
            .await
            .context("删除请求失败")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("删除对象失败: {} ({})", key, status));
        }
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Box<dyn AsyncRead + Send + Unpin + 'static>,
        size: u64,
        content_type: &str,
    ) -> Result<()> {
        let url = format!("{}/{}", self.policy.file_host(), Self::escape_key(key));
        let resp = self
            .http
            .put(&url)
            .header("Authorization", self.authorization("PUT", key))
            .header("Content-Type", content_type)
            .header("Content-Length", size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body)))
            .send()
            .await
            .context("上传请求失败")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("上传对象失败: {} ({})", key, status));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.policy.file_host(), Self::escape_key(key))
    }

    fn private_url(&self, key: &str, expires_at: i64) -> String {
        let string_to_sign = format!(
            "GET\n\n\n{}\n/{}/{}",
            expires_at, self.policy.bucket_name, key
        );
        let signature = self.hmac_sha1(&string_to_sign);
        format!(
            "{}?UCloudPublicKey={}&Expires={}&Signature={}",
            self.public_url(key),
            urlencoding::encode(&self.policy.access_key),
            expires_at,
            urlencoding::encode(&signature)
        )
    }

    fn sign_upload_policy(
        &self,
        method: &str,
        key: &str,
        policy: &str,
        callback: &str,
        content_type: &str,
    ) -> String {
        let string_to_sign = format!(
            "{}&{}&{}&{}&{}&{}",
            method, self.policy.bucket_name, key, content_type, policy, callback
        );
        format!(
            "UCloud {}:{}",
            self.policy.access_key,
            self.hmac_sha1(&string_to_sign)
        )
    }
}

/// 列表接口响应 / Listing API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListResponse {
    #[serde(default)]
    contents: Vec<ListObject>,
    #[serde(default)]
    common_prefixes: Vec<ListPrefix>,
    #[serde(default)]
    next_marker: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObject {
    key: String,
    #[serde(default)]
    size: u64,
    /// unix 秒 / Unix seconds
    #[serde(default)]
    last_modified: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListPrefix {
    prefix: String,
}

impl From<ListResponse> for ObjectPage {
    fn from(resp: ListResponse) -> Self {
        ObjectPage {
            contents: resp
                .contents
                .into_iter()
                .map(|o| RawObject {
                    key: o.key,
                    size: o.size,
                    last_modified: o
                        .last_modified
                        .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                })
                .collect(),
            common_prefixes: resp.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            next_marker: resp.next_marker,
        }
    }
}
