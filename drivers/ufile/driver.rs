//! UFile 驱动实现 / UFile driver implementation
//!
//! 统一契约到厂商客户端的适配层：列表走 marker 翻页器，
//! 删除走 4 worker 批量协调器，下载先签 URL 再流式 GET，
//! 直传凭证与上传会话绑定同一个关联键。

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::error::{DriverError, Result};
use crate::policy::Policy;
use crate::response::HttpStream;
use crate::storage::batch::delete_batch;
use crate::storage::paginator::{Paginator, PAGE_SIZE};
use crate::storage::{Driver, Object, UploadContext, UploadCredential, PREVIEW_TIMEOUT};
use crate::upload::{callback_body, CallbackPolicy, SessionManager, UploadPolicy};

use super::client::{ObjectClient, UfileClient};

/// UFile 驱动 / UFile driver
///
/// 对客户端泛型，测试注入桩实现。
pub struct UfileDriver<C: ObjectClient = UfileClient> {
    policy: Arc<Policy>,
    client: Arc<C>,
    sessions: Arc<SessionManager>,
}

impl UfileDriver<UfileClient> {
    pub fn new(policy: Arc<Policy>, sessions: Arc<SessionManager>) -> Self {
        let client = Arc::new(UfileClient::new(policy.clone()));
        Self {
            policy,
            client,
            sessions,
        }
    }
}

impl<C: ObjectClient> UfileDriver<C> {
    pub fn with_client(policy: Arc<Policy>, client: C, sessions: Arc<SessionManager>) -> Self {
        Self {
            policy,
            client: Arc::new(client),
            sessions,
        }
    }

    fn object_key(path: &str) -> &str {
        path.trim_start_matches('/')
    }
}

#[async_trait]
impl<C: ObjectClient> Driver for UfileDriver<C> {
    fn policy(&self) -> &Policy {
        &self.policy
    }

    async fn list(&self, base: &str, recursive: bool) -> Result<Vec<Object>> {
        let prefix = Self::object_key(base).to_string();
        let delimiter = if recursive { "" } else { "/" };

        let mut pager = Paginator::new();
        while let Some(marker) = pager.next_marker() {
            // 任一页失败整体失败，已累积的部分结果丢弃
            let page = self
                .client
                .list_page(&prefix, &marker, delimiter, PAGE_SIZE)
                .await?;
            pager.feed(page);
        }

        Ok(pager.into_objects(&prefix))
    }

    async fn get(&self, path: &str, declared_size: Option<u64>) -> Result<HttpStream> {
        let url = self.source(path, PREVIEW_TIMEOUT, false, 0).await?;
        tracing::debug!("对象下载: {}", path);

        let mut stream = HttpStream::open(&url, true).await?;
        if let Some(size) = declared_size {
            stream.set_content_length(size);
        }
        Ok(stream)
    }

    async fn put(
        &self,
        file: Box<dyn AsyncRead + Send + Unpin + 'static>,
        dst: &str,
        size: u64,
    ) -> Result<()> {
        if self.policy.max_size > 0 && size > self.policy.max_size {
            return Err(DriverError::Validation(format!(
                "文件大小超出策略限制: {} > {}",
                size, self.policy.max_size
            )));
        }

        let key = Self::object_key(dst);
        self.client
            .put_object(key, file, size, crate::storage::DEFAULT_CONTENT_TYPE)
            .await?;
        Ok(())
    }

    async fn delete(&self, paths: Vec<String>) -> (Vec<String>, Option<DriverError>) {
        // UFile 没有批量删除接口，4 worker 并行逐个删
        let client = self.client.clone();
        delete_batch(paths, move |key: String| {
            let client = client.clone();
            async move {
                client
                    .delete_object(UfileDriver::<C>::object_key(&key))
                    .await
                    .map_err(DriverError::from)
            }
            .boxed()
        })
        .await
    }

    async fn source(
        &self,
        path: &str,
        ttl: i64,
        _is_download: bool,
        _speed_limit: u64,
    ) -> Result<String> {
        let key = Self::object_key(path);
        if !self.policy.is_private {
            return Ok(self.client.public_url(key));
        }

        // 秒级过期时间，同一秒内重复签名不抖动
        let expires_at = Utc::now().timestamp() + ttl;
        Ok(self.client.private_url(key, expires_at))
    }

    async fn token(&self, ttl: i64, key: &str, ctx: &UploadContext) -> Result<UploadCredential> {
        let save_path = ctx.require_save_path()?.to_string();
        let size = ctx.require_file_size()?;

        if self.policy.max_size > 0 && size > self.policy.max_size {
            return Err(DriverError::Validation(format!(
                "文件大小超出策略限制: {} > {}",
                size, self.policy.max_size
            )));
        }

        let callback_url = self.sessions.callback_url(&self.policy.kind, key)?;
        let callback = CallbackPolicy {
            callback_url: callback_url.clone(),
            callback_body: callback_body(&save_path, key),
        };
        let callback_encoded = callback.encode()?;

        let policy_doc = UploadPolicy::with_ttl(ttl).encode()?;
        let token = self.client.sign_upload_policy(
            "POST",
            &save_path,
            &policy_doc,
            &callback_encoded,
            ctx.content_type(),
        );

        // 先登记会话再返回凭证，回调到达时必能命中
        self.sessions.open(key, &save_path, size, callback_url, ttl)?;

        Ok(UploadCredential {
            policy: policy_doc,
            path: save_path,
            access_key: self.policy.access_key.clone(),
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::paginator::{ObjectPage, RawObject};
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use url::Url;

    /// 桩客户端 / Stub vendor client
    #[derive(Default)]
    struct StubClient {
        pages: Mutex<Vec<ObjectPage>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectClient for StubClient {
        async fn list_page(
            &self,
            _prefix: &str,
            _marker: &str,
            _delimiter: &str,
            _limit: usize,
        ) -> anyhow::Result<ObjectPage> {
            let mut pages = self.pages.lock();
            if pages.is_empty() {
                return Err(anyhow!("没有更多页"));
            }
            Ok(pages.remove(0))
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.deleted.lock().push(key.to_string());
            if key.ends_with('x') {
                Err(anyhow!("删除失败: {}", key))
            } else {
                Ok(())
            }
        }

        async fn put_object(
            &self,
            _key: &str,
            _body: Box<dyn AsyncRead + Send + Unpin + 'static>,
            _size: u64,
            _content_type: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://bucket.stub.example.com/{}", key)
        }

        fn private_url(&self, key: &str, expires_at: i64) -> String {
            format!(
                "https://bucket.stub.example.com/{}?Expires={}&Signature=sig{}",
                key, expires_at, expires_at
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
            format!("stub:{}:{}:{}:{}:{}", method, key, policy, callback, content_type)
        }
    }

    fn policy(is_private: bool) -> Arc<Policy> {
        Arc::new(Policy {
            id: "p1".to_string(),
            kind: "ufile".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            bucket_name: "bucket".to_string(),
            base_url: "https://bucket.stub.example.com".to_string(),
            is_private,
            max_size: 0,
        })
    }

    fn sessions() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Url::parse("https://pan.example.com").unwrap(),
        ))
    }

    fn driver(is_private: bool, stub: StubClient) -> UfileDriver<StubClient> {
        UfileDriver::with_client(policy(is_private), stub, sessions())
    }

    fn page(n: usize, marker: &str) -> ObjectPage {
        ObjectPage {
            contents: (0..2)
                .map(|i| RawObject {
                    key: format!("base/file{}_{}.bin", n, i),
                    size: 1,
                    last_modified: None,
                })
                .collect(),
            common_prefixes: (0..2).map(|i| format!("base/dir{}_{}/", n, i)).collect(),
            next_marker: marker.to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_pages_to_exhaustion() {
        let stub = StubClient::default();
        *stub.pages.lock() = vec![page(1, "m1"), page(2, "m2"), page(3, "")];
        let driver = driver(false, stub);

        let objects = driver.list("/base", false).await.unwrap();
        assert_eq!(objects.iter().filter(|o| o.is_dir).count(), 6);
        assert_eq!(objects.iter().filter(|o| !o.is_dir).count(), 6);
    }

    #[tokio::test]
    async fn test_list_aborts_on_page_error() {
        let stub = StubClient::default();
        // 第二页耗尽后桩返回错误
        *stub.pages.lock() = vec![page(1, "m1")];
        let driver = driver(false, stub);

        let err = driver.list("/base", false).await.unwrap_err();
        assert!(matches!(err, DriverError::Backend(_)));
    }

    #[tokio::test]
    async fn test_delete_reports_failed_keys() {
        let stub = StubClient::default();
        let driver = driver(false, stub);

        let keys: Vec<String> = vec!["a", "bx", "c", "dx"]
            .into_iter()
            .map(String::from)
            .collect();
        let (failed, last_err) = driver.delete(keys).await;

        let mut failed = failed;
        failed.sort();
        assert_eq!(failed, vec!["bx".to_string(), "dx".to_string()]);
        assert!(matches!(last_err, Some(DriverError::Backend(_))));
        assert_eq!(driver.client.deleted.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_source_public_is_stable_and_unsigned() {
        let driver = driver(false, StubClient::default());

        let a = driver.source("/dir/a.bin", 60, false, 0).await.unwrap();
        let b = driver.source("/dir/a.bin", 3600, false, 0).await.unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("Signature"));
        assert!(!a.contains("Expires"));
    }

    #[tokio::test]
    async fn test_source_private_signature_varies_with_ttl() {
        let driver = driver(true, StubClient::default());

        let short = driver.source("/dir/a.bin", 60, false, 0).await.unwrap();
        let long = driver.source("/dir/a.bin", 3600, false, 0).await.unwrap();
        assert_ne!(short, long);
        assert!(short.contains("Signature"));

        // 同一秒内相同参数出同一个 URL
        let before = Utc::now().timestamp();
        let a = driver.source("/dir/a.bin", 60, false, 0).await.unwrap();
        let b = driver.source("/dir/a.bin", 60, false, 0).await.unwrap();
        let after = Utc::now().timestamp();
        if before == after {
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn test_token_requires_save_path_and_size() {
        let driver = driver(true, StubClient::default());

        let err = driver
            .token(600, "k1", &UploadContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Validation(_)));

        let no_size = UploadContext {
            save_path: Some("upload/a.bin".to_string()),
            ..Default::default()
        };
        let err = driver.token(600, "k1", &no_size).await.unwrap_err();
        assert!(matches!(err, DriverError::Validation(_)));
    }

    #[tokio::test]
    async fn test_token_issues_credential_and_session() {
        let driver = driver(true, StubClient::default());
        let ctx = UploadContext::new("upload/a.bin", 42);

        let cred = driver.token(600, "k1", &ctx).await.unwrap();
        assert_eq!(cred.path, "upload/a.bin");
        assert_eq!(cred.access_key, "AK");
        assert!(cred.token.starts_with("stub:POST:upload/a.bin:"));
        // 内容类型未指定时回落为二进制流
        assert!(cred.token.ends_with(":application/octet-stream"));

        // 回调恰好完成一次
        let session = driver.sessions.finalize("k1").unwrap();
        assert_eq!(session.save_path, "upload/a.bin");
        assert_eq!(session.size, 42);
        assert!(matches!(
            driver.sessions.finalize("k1"),
            Err(DriverError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_token_respects_policy_size_limit() {
        let mut p = (*policy(true)).clone();
        p.max_size = 10;
        let driver =
            UfileDriver::with_client(Arc::new(p), StubClient::default(), sessions());

        let err = driver
            .token(600, "k1", &UploadContext::new("upload/a.bin", 11))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Validation(_)));
    }

    #[tokio::test]
    async fn test_thumb_not_implemented() {
        let driver = driver(false, StubClient::default());
        assert!(matches!(
            driver.thumb("/a.png").await,
            Err(DriverError::NotImplemented)
        ));
    }
}
