//! Configuration module
//!
//! Environment-based configuration for the API server and the deletion
//! worker. Storage credentials are validated once at startup (`validate`);
//! a misconfigured backend fails fast instead of per-request.

use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_PATCH_BODY_MB: usize = 64;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const WORKER_MAX_DELETE_ATTEMPTS: i32 = 8;
const EXPIRED_RETENTION_HOURS: i64 = 24;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Resumable protocol
    pub max_patch_body_bytes: usize,
    // Deletion worker
    pub worker_poll_interval_ms: u64,
    pub worker_max_delete_attempts: i32,
    /// Hours past `expiration` before an expired upload is swept into the
    /// deletion outbox. 0 disables the sweep.
    pub expired_retention_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = env::var("STORAGE_BACKEND")
            .map_err(|_| anyhow::anyhow!("STORAGE_BACKEND must be set (local or s3)"))?
            .parse::<StorageBackend>()?;

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or(env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            max_patch_body_bytes: env::var("MAX_PATCH_BODY_MB")
                .unwrap_or_else(|_| MAX_PATCH_BODY_MB.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_PATCH_BODY_MB)
                * 1024
                * 1024,
            worker_poll_interval_ms: env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| WORKER_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(WORKER_POLL_INTERVAL_MS),
            worker_max_delete_attempts: env::var("WORKER_MAX_DELETE_ATTEMPTS")
                .unwrap_or_else(|_| WORKER_MAX_DELETE_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_DELETE_ATTEMPTS),
            expired_retention_hours: env::var("EXPIRED_RETENTION_HOURS")
                .unwrap_or_else(|_| EXPIRED_RETENTION_HOURS.to_string())
                .parse()
                .unwrap_or(EXPIRED_RETENTION_HOURS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Fail fast on missing storage credentials; called from `from_env` and
    /// again by the storage factory before building a client.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET not configured"));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!("S3_REGION or AWS_REGION not configured"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!("LOCAL_STORAGE_PATH not configured"));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!("LOCAL_STORAGE_BASE_URL not configured"));
                }
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.local_storage_base_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(backend: StorageBackend) -> Config {
        Config {
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            environment: "test".to_string(),
            database_url: "postgres://localhost/dropkit".to_string(),
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            jwt_secret: "test-secret".to_string(),
            storage_backend: backend,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: None,
            local_storage_base_url: None,
            max_patch_body_bytes: MAX_PATCH_BODY_MB * 1024 * 1024,
            worker_poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            worker_max_delete_attempts: WORKER_MAX_DELETE_ATTEMPTS,
            expired_retention_hours: EXPIRED_RETENTION_HOURS,
        }
    }

    #[test]
    fn s3_backend_requires_bucket_and_region() {
        let mut config = base_config(StorageBackend::S3);
        assert!(config.validate().is_err());

        config.s3_bucket = Some("uploads".to_string());
        assert!(config.validate().is_err());

        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn local_backend_requires_path_and_base_url() {
        let mut config = base_config(StorageBackend::Local);
        assert!(config.validate().is_err());

        config.local_storage_path = Some("/var/lib/dropkit".to_string());
        config.local_storage_base_url = Some("http://localhost:4000/files".to_string());
        assert!(config.validate().is_ok());
    }
}
