// Driver package / 驱动包
pub mod ufile;

use crate::storage::StorageManager;

/// Register all drivers to StorageManager / 注册所有存储驱动
pub async fn register_all(manager: &StorageManager) -> crate::error::Result<()> {
    // Register UFile driver / 注册 UFile 对象存储驱动
    manager
        .register_factory(Box::new(ufile::UfileDriverFactory))
        .await?;
    Ok(())
}
