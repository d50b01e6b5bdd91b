//! 列表翻页器 / Listing paginator
//!
//! 驱动 marker 翻页：从空 marker 开始逐页拉取，marker 为空即到底。
//! 所有页先累积在内存里，再统一整理成 `Object` 列表；
//! 实际目录规模有限，这里不做惰性序列。

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::Object;

/// 单页最大条目数 / Page size
pub const PAGE_SIZE: usize = 1000;

/// 列表接口返回的原始对象 / Raw object from a listing call
#[derive(Debug, Clone)]
pub struct RawObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// 一页列表结果 / One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub contents: Vec<RawObject>,
    /// 公共前缀（合成目录）/ Common prefixes, synthetic directories
    pub common_prefixes: Vec<String>,
    /// 下一页 marker，空即最后一页 / Next-page marker, empty means last page
    pub next_marker: String,
}

/// 翻页状态 / Pagination state
#[derive(Debug, Clone, PartialEq)]
enum PageState {
    /// 正在请求 marker 指向的一页 / Fetching the page at this marker
    Fetching { marker: String },
    /// 上一页带回了非空 marker / Previous page returned a non-empty marker
    HasMore { marker: String },
    /// 终态 / Terminal
    Exhausted,
}

/// Marker 翻页累积器 / Marker-driven page accumulator
///
/// 调用方循环 `next_marker` → 拉取一页 → `feed`，
/// 到底后 `into_objects` 产出扁平列表。任一页失败由调用方直接上抛，
/// 已累积的部分结果随之丢弃。
pub struct Paginator {
    state: PageState,
    contents: Vec<RawObject>,
    commons: Vec<String>,
}

impl Paginator {
    pub fn new() -> Self {
        Self {
            state: PageState::Fetching {
                marker: String::new(),
            },
            contents: Vec::new(),
            commons: Vec::new(),
        }
    }

    /// 下一次请求用的 marker，`None` 表示已到底 / Next marker, `None` when exhausted
    pub fn next_marker(&mut self) -> Option<String> {
        match &self.state {
            PageState::Fetching { marker } => Some(marker.clone()),
            PageState::HasMore { marker } => {
                let marker = marker.clone();
                self.state = PageState::Fetching {
                    marker: marker.clone(),
                };
                Some(marker)
            }
            PageState::Exhausted => None,
        }
    }

    /// 累积一页结果并推进状态 / Accumulate one page and advance
    pub fn feed(&mut self, page: ObjectPage) {
        self.contents.extend(page.contents);
        self.commons.extend(page.common_prefixes);

        self.state = if page.next_marker.is_empty() {
            PageState::Exhausted
        } else {
            PageState::HasMore {
                marker: page.next_marker,
            }
        };
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == PageState::Exhausted
    }

    /// 整理为对象列表 / Post-process into the flattened listing
    ///
    /// 公共前缀转为目录条目，原始对象转为文件条目；
    /// 无法相对化的键跳过；目录与文件条目按相对路径去重。
    pub fn into_objects(self, prefix: &str) -> Vec<Object> {
        let mut res = Vec::with_capacity(self.contents.len() + self.commons.len());
        let mut seen: HashSet<String> = HashSet::new();

        for common in &self.commons {
            let Some(rel) = relative_to(prefix, common) else {
                continue;
            };
            if !seen.insert(rel.clone()) {
                continue;
            }
            res.push(Object {
                name: base_name(&rel),
                relative_path: rel,
                size: 0,
                is_dir: true,
                source: String::new(),
                last_modified: Utc::now(),
            });
        }

        for object in self.contents {
            // 以 '/' 结尾的是目录占位对象
            if object.key.ends_with('/') {
                continue;
            }
            let Some(rel) = relative_to(prefix, &object.key) else {
                continue;
            };
            if !seen.insert(rel.clone()) {
                continue;
            }
            res.push(Object {
                name: base_name(&rel),
                relative_path: rel,
                size: object.size,
                is_dir: false,
                source: object.key,
                last_modified: object.last_modified.unwrap_or_else(Utc::now),
            });
        }

        res
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new()
    }
}

/// 相对路径计算，统一正斜杠 / Relative path against the base prefix, forward slashes
///
/// 键不在前缀之下时返回 `None`（调用方跳过该条目）。
fn relative_to(prefix: &str, key: &str) -> Option<String> {
    let key = key.replace('\\', "/");
    let prefix = prefix.trim_start_matches('/');

    let rest = if prefix.is_empty() {
        key.as_str()
    } else {
        let rest = key.strip_prefix(prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') && !prefix.ends_with('/') {
            // "cloudy/a" 不属于前缀 "cloud"
            return None;
        }
        rest
    };

    let rel = rest.trim_matches('/');
    if rel.is_empty() {
        return None;
    }
    Some(rel.to_string())
}

fn base_name(rel: &str) -> String {
    rel.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(rel)
        .to_string()
}
