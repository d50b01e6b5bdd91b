use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{DriverError, Result};
use crate::policy::Policy;
use crate::upload::SessionManager;

use super::Driver;

pub type DriverBox = Arc<Box<dyn Driver>>;

/// Driver factory trait / 驱动工厂 trait
///
/// 每个厂商实现一个工厂，按策略构造驱动实例；
/// 新增厂商只需注册新工厂，核心代码不动。
pub trait DriverFactory: Send + Sync {
    /// Vendor kind this factory handles / 本工厂处理的厂商类型
    fn kind(&self) -> &'static str;

    /// 按策略创建驱动实例 / Build a driver instance from a policy
    fn create_driver(
        &self,
        policy: Arc<Policy>,
        sessions: Arc<SessionManager>,
    ) -> Result<Box<dyn Driver>>;
}

/// Storage manager / 存储管理器
///
/// 持有工厂注册表与按策略 ID 缓存的驱动实例，
/// 把文件系统层的操作按策略分发到对应驱动。
#[derive(Clone)]
pub struct StorageManager {
    drivers: Arc<RwLock<HashMap<String, DriverBox>>>,
    factories: Arc<RwLock<HashMap<String, Arc<Box<dyn DriverFactory>>>>>,
    sessions: Arc<SessionManager>,
}

impl StorageManager {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            drivers: Arc::new(RwLock::new(HashMap::new())),
            factories: Arc::new(RwLock::new(HashMap::new())),
            sessions,
        }
    }

    /// 共享的上传会话管理器 / Shared upload session manager
    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// Register driver factory / 注册驱动工厂
    pub async fn register_factory(&self, factory: Box<dyn DriverFactory>) -> Result<()> {
        let kind = factory.kind().to_string();
        let mut factories = self.factories.write().await;
        factories.insert(kind.clone(), Arc::new(factory));

        tracing::info!("Driver factory registered: {}", kind);
        Ok(())
    }

    /// Resolve a policy to its driver instance / 按策略解析驱动实例
    ///
    /// 命中缓存直接返回；否则找到 `policy.kind` 对应的工厂现场构造。
    /// 并发对同一策略的首次解析可能各自构造一次，缓存最终只留一份。
    pub async fn get_driver(&self, policy: Arc<Policy>) -> Result<DriverBox> {
        {
            let drivers = self.drivers.read().await;
            if let Some(driver) = drivers.get(&policy.id) {
                return Ok(driver.clone());
            }
        }

        let factory = {
            let factories = self.factories.read().await;
            factories.get(&policy.kind).cloned().ok_or_else(|| {
                DriverError::Validation(format!("未知的存储类型: {}", policy.kind))
            })?
        };

        let driver = factory.create_driver(policy.clone(), self.sessions.clone())?;
        let driver_box: DriverBox = Arc::new(driver);

        let mut drivers = self.drivers.write().await;
        let entry = drivers
            .entry(policy.id.clone())
            .or_insert_with(|| driver_box.clone())
            .clone();

        tracing::info!("Driver resolved: {} ({})", policy.id, policy.kind);
        Ok(entry)
    }

    /// Evict a cached driver instance / 移除缓存的驱动实例
    ///
    /// 策略变更后调用，下一次解析会重新构造。
    pub async fn remove_driver(&self, policy_id: &str) -> Result<()> {
        let mut drivers = self.drivers.write().await;
        drivers
            .remove(policy_id)
            .ok_or_else(|| DriverError::Validation(format!("驱动不存在: {}", policy_id)))?;

        tracing::info!("Driver removed: {}", policy_id);
        Ok(())
    }

    /// List cached driver ids / 列出已缓存的驱动
    pub async fn list_drivers(&self) -> Vec<String> {
        let drivers = self.drivers.read().await;
        drivers.keys().cloned().collect()
    }

    /// List registered vendor kinds / 列出已注册的厂商类型
    pub async fn list_kinds(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        factories.keys().cloned().collect()
    }
}
