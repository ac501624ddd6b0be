//! 系统设置服务

use chrono::{DateTime, Utc};
use mediscan_core::{MediscanError, Result, Settings, SettingsUpdate};
use mediscan_database::RecordStore;
use mediscan_integration::TrainingClient;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// 设置服务，对外返回的设置均不含管理员口令
pub struct SettingsService {
    store: Arc<dyn RecordStore>,
    training: TrainingClient,
}

impl SettingsService {
    pub fn new(store: Arc<dyn RecordStore>, training: TrainingClient) -> Self {
        Self { store, training }
    }

    pub async fn get(&self) -> Result<Settings> {
        Ok(self.store.load_settings().await?.redacted())
    }

    /// 只修改提供的字段，校验失败时不写入
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut settings = self.store.load_settings().await?;
        let password_changed = update.admin_password.is_some();
        update.apply(&mut settings)?;
        self.store.save_settings(&settings).await?;

        if password_changed {
            info!("Admin password changed");
        }
        info!("Settings updated");
        Ok(settings.redacted())
    }

    pub async fn verify_admin(&self, password: &str) -> Result<bool> {
        let verified = self.store.load_settings().await?.verify_admin_password(password);
        if !verified {
            warn!("Admin password verification failed");
        }
        Ok(verified)
    }

    /// 校验口令后触发外部模型训练，成功时只写入训练时间
    pub async fn train(&self, password: &str, now: DateTime<Utc>) -> Result<Value> {
        if !self.verify_admin(password).await? {
            return Err(MediscanError::Permission("Invalid admin password".to_string()));
        }

        // 训练请求可能持续到超时，期间的设置修改不能被旧快照覆盖
        let result = self.training.trigger(password).await?;
        self.store.record_training_date(now).await?;
        info!("Recorded model training at {}", now);
        Ok(result)
    }
}
