//! UFile（UCloud 对象存储）驱动 / UFile (UCloud object storage) driver

pub mod client;
pub mod driver;

pub use client::{ObjectClient, UfileClient};
pub use driver::UfileDriver;

use std::sync::Arc;

use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{Driver, DriverFactory};
use crate::upload::SessionManager;

/// UFile 驱动工厂 / UFile driver factory
pub struct UfileDriverFactory;

impl DriverFactory for UfileDriverFactory {
    fn kind(&self) -> &'static str {
        "ufile"
    }

    fn create_driver(
        &self,
        policy: Arc<Policy>,
        sessions: Arc<SessionManager>,
    ) -> Result<Box<dyn Driver>> {
        Ok(Box::new(UfileDriver::new(policy, sessions)))
    }
}
