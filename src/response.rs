//! 远端对象的 HTTP 读取流 / HTTP streaming of remote objects
//!
//! 驱动把 `source` 解析出的 URL 交给这里发起 GET，
//! 响应体包装成 `AsyncRead` 返回给文件系统层。

use anyhow::anyhow;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;

use crate::error::{DriverError, Result};

/// 全部驱动共享的 HTTP 客户端，无每次调用的可变状态，可并发使用
/// Shared stateless HTTP client, safe for concurrent use by all drivers
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// 远端对象读取流 / Readable stream of one remote object
///
/// 上报的长度以调用方声明的实体大小为准，后端响应缺失或为零时也一样。
pub struct HttpStream {
    reader: StreamReader<BoxStream<'static, std::io::Result<Bytes>>, Bytes>,
    content_length: Option<u64>,
}

impl HttpStream {
    /// 对已解析的 URL 发起 GET / Open a GET against a resolved source URL
    ///
    /// `skip_placeholder` 置位时丢弃后端发来的零长度首块。
    pub async fn open(url: &str, skip_placeholder: bool) -> Result<Self> {
        let resp = HTTP_CLIENT
            .get(url)
            .send()
            .await
            .map_err(|e| DriverError::Backend(anyhow::Error::new(e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DriverError::Backend(anyhow!("下载请求失败: {}", status)));
        }

        let content_length = resp.content_length();
        let body = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        let body: BoxStream<'static, std::io::Result<Bytes>> = if skip_placeholder {
            skip_placeholder_chunk(body).boxed()
        } else {
            body.boxed()
        };

        Ok(Self {
            reader: StreamReader::new(body),
            content_length,
        })
    }

    /// 测试与本地组合用 / Build from any chunk stream (tests, composition)
    pub fn from_stream<S>(stream: S, content_length: Option<u64>) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            reader: StreamReader::new(stream.boxed()),
            content_length,
        }
    }

    /// 覆盖上报长度 / Override the reported length
    pub fn set_content_length(&mut self, len: u64) {
        self.content_length = Some(len);
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl AsyncRead for HttpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

/// 丢弃零长度的占位首块 / Drop a zero-length placeholder first chunk
fn skip_placeholder_chunk<S>(stream: S) -> impl Stream<Item = std::io::Result<Bytes>>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    let mut first = true;
    stream.filter(move |chunk| {
        let skip = first && matches!(chunk, Ok(bytes) if bytes.is_empty());
        first = false;
        futures::future::ready(!skip)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = std::io::Result<Bytes>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn test_placeholder_first_chunk_skipped() {
        let body = skip_placeholder_chunk(chunks(vec![
            b"".as_slice(),
            b"hello".as_slice(),
            b"".as_slice(),
            b"world".as_slice(),
        ]));
        let mut stream = HttpStream::from_stream(body, None);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        // 首个空块被跳过，后续空块原样保留（StreamReader 对其无感）
        assert_eq!(out, b"helloworld");
    }

    #[tokio::test]
    async fn test_non_empty_first_chunk_kept() {
        let body = skip_placeholder_chunk(chunks(vec![b"data".as_slice(), b"!".as_slice()]));
        let mut stream = HttpStream::from_stream(body, None);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"data!");
    }

    #[tokio::test]
    async fn test_declared_length_overrides_backend() {
        let mut stream = HttpStream::from_stream(chunks(vec![b"abc".as_slice()]), None);
        assert_eq!(stream.content_length(), None);

        stream.set_content_length(1024);
        assert_eq!(stream.content_length(), Some(1024));

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }
}
