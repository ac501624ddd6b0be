//! 服务配置
//!
//! 配置来源按优先级从低到高：内置默认值 → TOML 配置文件 →
//! `MEDISCAN__SECTION__KEY` 环境变量 → `DATABASE_URL` / `PREDICTION_SERVICE_URL` / `PORT`
//! → 命令行参数。

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use tracing::debug;

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 上传失败时是否在响应中附带错误详情
    pub expose_error_details: bool,
}

/// 数据库配置，未配置 url 时使用内存存储
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
}

/// 文件存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub report_dir: String,
    pub max_upload_mb: u64,
}

/// 分类服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// 完整配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub prediction: PredictionConfig,
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl AppConfig {
    /// 加载配置；`env` 为 `None` 时读取进程环境变量
    pub fn load(
        config_path: &str,
        cli: &CliOverrides,
        env: Option<Map<String, String>>,
    ) -> Result<Self> {
        let legacy = |name: &str| match &env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|v| !v.trim().is_empty());

        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5002_i64)?
            .set_default("server.expose_error_details", false)?
            .set_default("database.max_connections", 10_i64)?
            .set_default("storage.upload_dir", "uploads")?
            .set_default("storage.report_dir", "reports")?
            .set_default("storage.max_upload_mb", 10_i64)?
            .set_default("prediction.base_url", "http://localhost:5001")?
            .set_default("prediction.timeout_secs", 60_i64)?
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("MEDISCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env.clone()),
            )
            .set_override_option("database.url", legacy("DATABASE_URL"))?
            .set_override_option("prediction.base_url", legacy("PREDICTION_SERVICE_URL"))?
            .set_override_option("server.port", legacy("PORT"))?
            .set_override_option("server.host", cli.host.clone())?
            .set_override_option("server.port", cli.port.map(i64::from))?
            .build()
            .context("Failed to build configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.normalize();
        config.validate()?;

        debug!("Configuration loaded from defaults, {} and environment", config_path);
        Ok(config)
    }

    fn normalize(&mut self) {
        self.prediction.base_url = self.prediction.base_url.trim().trim_end_matches('/').to_string();
        self.database.url = self
            .database
            .url
            .take()
            .filter(|url| !url.trim().is_empty());
    }

    fn validate(&self) -> Result<()> {
        if self.prediction.base_url.is_empty() {
            bail!("prediction.base_url must not be empty");
        }
        if self.prediction.timeout_secs == 0 {
            bail!("prediction.timeout_secs must be greater than 0");
        }
        if self.storage.max_upload_mb == 0 {
            bail!("storage.max_upload_mb must be greater than 0");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be greater than 0");
        }
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.storage.max_upload_mb * 1024 * 1024
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config =
            AppConfig::load("does-not-exist.toml", &CliOverrides::default(), Some(vars(&[])))
                .unwrap();
        assert_eq!(config.server.port, 5002);
        assert!(!config.server.expose_error_details);
        assert!(config.database.url.is_none());
        assert_eq!(config.prediction.base_url, "http://localhost:5001");
        assert_eq!(config.prediction.timeout_secs, 60);
        assert_eq!(config.max_upload_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.storage.upload_dir, "uploads");
    }

    #[test]
    fn test_layering_order() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 7000\n\n[prediction]\nbase_url = \"http://file-model:5001/\"\n\n[storage]\nmax_upload_mb = 4"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = AppConfig::load(&path, &CliOverrides::default(), Some(vars(&[]))).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.prediction.base_url, "http://file-model:5001");
        assert_eq!(config.storage.max_upload_mb, 4);

        let env = vars(&[
            ("MEDISCAN__SERVER__PORT", "7100"),
            ("MEDISCAN__DATABASE__MAX_CONNECTIONS", "3"),
            ("PREDICTION_SERVICE_URL", "http://legacy-model:9000"),
            ("DATABASE_URL", "postgres://localhost/mediscan"),
        ]);
        let config = AppConfig::load(&path, &CliOverrides::default(), Some(env.clone())).unwrap();
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.prediction.base_url, "http://legacy-model:9000");
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/mediscan"));

        let mut with_port = env.clone();
        with_port.insert("PORT".to_string(), "7200".to_string());
        let config = AppConfig::load(&path, &CliOverrides::default(), Some(with_port.clone())).unwrap();
        assert_eq!(config.server.port, 7200);

        let cli = CliOverrides {
            host: Some("127.0.0.1".to_string()),
            port: Some(7300),
        };
        let config = AppConfig::load(&path, &cli, Some(with_port)).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:7300");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let env = vars(&[("MEDISCAN__PREDICTION__TIMEOUT_SECS", "0")]);
        assert!(AppConfig::load("does-not-exist.toml", &CliOverrides::default(), Some(env)).is_err());
    }
}
