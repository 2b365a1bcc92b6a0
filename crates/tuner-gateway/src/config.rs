use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Vision reasoning service; absent means rule-based only
    pub vision_endpoint: Option<String>,
    pub vision_api_key: Option<String>,
    pub vision_model: String,
    pub vision_timeout_secs: u64,

    /// VMS backend; absent means direct ONVIF only
    pub vms_url: Option<String>,
    pub vms_username: String,
    pub vms_password: String,

    /// Per-operation timeout for camera backends
    pub adapter_timeout_secs: u64,

    /// Per-step budget inside apply jobs
    pub step_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("TUNER_GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());

        let vision_endpoint = env::var("VISION_ENDPOINT").ok();
        let vision_api_key = env::var("VISION_API_KEY").ok();
        if vision_endpoint.is_some() && vision_api_key.is_none() {
            anyhow::bail!("VISION_ENDPOINT set but VISION_API_KEY missing");
        }
        let vision_model =
            env::var("VISION_MODEL").unwrap_or_else(|_| "scene-tuner-v2".to_string());
        let vision_timeout_secs = parse_env("VISION_TIMEOUT_SECS", 30)?;

        let vms_url = env::var("VMS_URL").ok();
        let vms_username = env::var("VMS_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let vms_password = env::var("VMS_PASSWORD").unwrap_or_default();
        if vms_url.is_some() && vms_password.is_empty() {
            anyhow::bail!("VMS_URL set but VMS_PASSWORD missing");
        }

        let adapter_timeout_secs = parse_env("ADAPTER_TIMEOUT_SECS", 10)?;
        let step_timeout_secs = parse_env("STEP_TIMEOUT_SECS", 15)?;

        Ok(Self {
            bind_addr,
            vision_endpoint,
            vision_api_key,
            vision_model,
            vision_timeout_secs,
            vms_url,
            vms_username,
            vms_password,
            adapter_timeout_secs,
            step_timeout_secs,
        })
    }
}

fn parse_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("invalid {name}")),
        Err(_) => Ok(default),
    }
}
