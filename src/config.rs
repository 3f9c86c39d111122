use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Runtime configuration, loaded once at startup from `.env` / process env.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub planner_model: String,
    pub vision_model: String,
    pub embedding_model: String,
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub scene_ready_timeout: Duration,
    pub settle_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::Config("OPENAI_API_KEY not set in .env".to_string()))?;

        Ok(Self {
            api_key,
            api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            planner_model: env::var("PLANNER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            vision_model: env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            bind_addr: env::var("SCENE_PILOT_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            storage_dir: env::var("SCENE_PILOT_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::default_storage_dir()),
            scene_ready_timeout: Duration::from_secs(
                env::var("SCENE_READY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            settle_delay: Duration::from_millis(
                env::var("SETTLE_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),
        })
    }

    pub fn default_storage_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scene-pilot")
    }
}
