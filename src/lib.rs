//! 多后端虚拟文件系统存储核心 / Multi-backend virtual filesystem storage core
//!
//! 统一的存储驱动契约、按策略分发的注册表、
//! 直传上传凭证签发与异步回调完成，以及各驱动共用的
//! 翻页列表与批量删除机制。

pub mod error;
pub mod policy;
pub mod response;
pub mod storage;
pub mod upload;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use error::{DriverError, Result};
pub use policy::Policy;
pub use storage::{Driver, Object, StorageManager, UploadContext, UploadCredential};
pub use upload::SessionManager;

// Register all storage drivers (call unified registration function from drivers module) / 注册所有存储驱动
pub async fn register_storage_drivers(manager: &storage::StorageManager) -> Result<()> {
    drivers::register_all(manager).await
}
