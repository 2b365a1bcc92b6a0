use crate::adapter::{
    AdapterApplyOutcome, AdapterKind, CameraBackend, CameraHandle, DiscoveredCamera, ScanParams,
    SubGroupOutcome, VerifyTolerances,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use common::{AdapterError, CameraCapabilities, CameraSettings, GainRange, VideoCodec};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use telemetry::metrics::{ADAPTER_OPERATIONS, DISCOVERED_CAMERAS};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Camera record as the VMS inventory API reports it.
#[derive(Debug, Clone, Deserialize)]
struct VmsCameraRecord {
    id: String,
    name: Option<String>,
    ip_address: String,
    vendor: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmsCameraPage {
    items: Vec<VmsCameraRecord>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct VmsCapabilitiesDoc {
    #[serde(default)]
    resolutions: Option<Vec<String>>,
    #[serde(default)]
    codecs: Option<Vec<String>>,
    #[serde(default)]
    min_fps: Option<u32>,
    #[serde(default)]
    max_fps: Option<u32>,
    #[serde(default)]
    max_bitrate_kbps: Option<u32>,
    #[serde(default)]
    wdr_levels: Option<Vec<u8>>,
    #[serde(default)]
    gain_min_db: Option<f64>,
    #[serde(default)]
    gain_max_db: Option<f64>,
    #[serde(default)]
    features: HashMap<String, bool>,
}

/// VMS-mediated backend.
///
/// The VMS owns camera registration and relays configuration to the
/// device itself, so a 2xx on apply means "accepted by the VMS" -- only
/// the post-apply verification read confirms the device took it.
pub struct VmsBackend {
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl VmsBackend {
    /// `base_url` like "https://vms.example:7001". VMS appliances
    /// routinely run with self-signed certificates, so those are
    /// accepted.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(timeout_secs),
            http,
        })
    }

    fn camera_id<'a>(&self, handle: &'a CameraHandle) -> Result<&'a str, AdapterError> {
        handle
            .vms_id
            .as_deref()
            .ok_or_else(|| AdapterError::Protocol("camera handle has no VMS id".to_string()))
    }

    /// One digest-authenticated exchange: bare request first, then a
    /// single retry answering the 401 challenge.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<reqwest::Response, AdapterError> {
        let url = format!("{}{}", self.base_url, path);

        let build = |authorization: Option<String>| {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(auth) = authorization {
                req = req.header("Authorization", auth);
            }
            if let Some(json) = body {
                req = req.json(json);
            }
            req
        };

        let map_send_err = |e: reqwest::Error| {
            if e.is_timeout() {
                AdapterError::Timeout(self.timeout)
            } else {
                AdapterError::Connect {
                    target: url.clone(),
                    detail: e.to_string(),
                }
            }
        };

        let response = build(None).send().await.map_err(&map_send_err)?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Auth {
                target: url.clone(),
            })?;

        let authorization =
            digest_authorization(&challenge, &self.username, &self.password, method.as_str(), path)
                .ok_or_else(|| {
                    AdapterError::Protocol(format!("unparseable digest challenge: {challenge}"))
                })?;

        debug!(url = %url, "retrying with digest authorization");
        let response = build(Some(authorization)).send().await.map_err(&map_send_err)?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdapterError::Auth { target: url });
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, AdapterError> {
        let response = self.request(reqwest::Method::GET, path, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Protocol(format!(
                "VMS GET {path} failed: {status}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::Protocol(format!("VMS GET {path}: invalid body: {e}")))
    }

    fn normalize_capabilities(doc: VmsCapabilitiesDoc) -> CameraCapabilities {
        let codecs = doc.codecs.map(|list| {
            list.iter()
                .filter_map(|c| match c.to_lowercase().as_str() {
                    "h264" => Some(VideoCodec::H264),
                    "h265" | "hevc" => Some(VideoCodec::H265),
                    "mjpeg" | "jpeg" => Some(VideoCodec::Mjpeg),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });
        let gain_range_db = match (doc.gain_min_db, doc.gain_max_db) {
            (Some(min_db), Some(max_db)) => Some(GainRange { min_db, max_db }),
            _ => None,
        };
        let feature = |name: &str| doc.features.get(name).copied().unwrap_or(false);

        CameraCapabilities {
            resolutions: doc.resolutions,
            codecs,
            min_fps: doc.min_fps,
            max_fps: doc.max_fps,
            max_bitrate_mbps: doc.max_bitrate_kbps.map(crate::translate::kbps_to_mbps),
            wdr_levels: doc.wdr_levels,
            shutter_modes: None,
            gain_range_db,
            ir_modes: None,
            noise_reduction_levels: None,
            has_wdr: feature("wdr"),
            has_ir: feature("ir"),
            has_blc: feature("blc"),
            has_hlc: feature("hlc"),
            has_ptz: feature("ptz"),
            lpr_capable: feature("lpr"),
        }
    }
}

#[async_trait]
impl CameraBackend for VmsBackend {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Vms
    }

    fn tolerances(&self) -> VerifyTolerances {
        // The VMS aggregates device reports and rounds both bitrate and
        // frame rate.
        VerifyTolerances {
            bitrate_mbps: 0.1,
            fps: 1,
        }
    }

    async fn connect(&self, handle: &CameraHandle) -> Result<(), AdapterError> {
        let id = self.camera_id(handle)?;
        let result: Result<JsonValue, AdapterError> =
            self.get_json(&format!("/api/cameras/{id}")).await;
        ADAPTER_OPERATIONS
            .with_label_values(&["vms", "connect", if result.is_ok() { "ok" } else { "error" }])
            .inc();
        result.map(|_| ())
    }

    /// Pages through the VMS camera inventory. This is a listing call,
    /// not a network probe; the deadline bounds how many pages are
    /// fetched and whatever was listed in time is returned.
    async fn discover(&self, params: &ScanParams) -> Result<Vec<DiscoveredCamera>, AdapterError> {
        let deadline = Instant::now() + Duration::from_secs(params.timeout_secs);
        let mut cameras = Vec::new();
        let mut page = 1usize;

        loop {
            if Instant::now() >= deadline {
                info!(found = cameras.len(), "VMS listing deadline reached, returning partial results");
                break;
            }
            let path = format!("/api/cameras?page={page}&per_page={}", params.page_size);
            let listing: VmsCameraPage = match self.get_json(&path).await {
                Ok(listing) => listing,
                Err(e) if !cameras.is_empty() => {
                    // Keep what earlier pages produced.
                    warn!(error = %e, page, "VMS listing page failed, returning partial results");
                    break;
                }
                Err(e) => return Err(e),
            };

            let page_len = listing.items.len();
            for record in listing.items {
                cameras.push(DiscoveredCamera {
                    address: record.ip_address,
                    name: record.name,
                    vendor: record.vendor,
                    model: record.model,
                    hardware_id: None,
                    source: AdapterKind::Vms,
                    vms_id: Some(record.id),
                    discovered_at: Utc::now(),
                });
                if cameras.len() >= params.max_results {
                    break;
                }
            }

            let exhausted = page_len < params.page_size
                || listing
                    .total
                    .is_some_and(|total| cameras.len() as u64 >= total);
            if exhausted || cameras.len() >= params.max_results {
                break;
            }
            page += 1;
        }

        DISCOVERED_CAMERAS
            .with_label_values(&["vms"])
            .inc_by(cameras.len() as u64);
        Ok(cameras)
    }

    async fn capabilities(
        &self,
        handle: &CameraHandle,
    ) -> Result<CameraCapabilities, AdapterError> {
        let id = self.camera_id(handle)?;
        let doc: Result<VmsCapabilitiesDoc, AdapterError> =
            self.get_json(&format!("/api/cameras/{id}/capabilities")).await;
        ADAPTER_OPERATIONS
            .with_label_values(&["vms", "capabilities", if doc.is_ok() { "ok" } else { "error" }])
            .inc();
        Ok(Self::normalize_capabilities(doc?))
    }

    async fn current_settings(
        &self,
        handle: &CameraHandle,
    ) -> Result<CameraSettings, AdapterError> {
        let id = self.camera_id(handle)?;
        // The settings document is already shaped as the four canonical
        // sub-groups; groups the VMS cannot expose are simply absent.
        let settings: Result<CameraSettings, AdapterError> =
            self.get_json(&format!("/api/cameras/{id}/settings")).await;
        ADAPTER_OPERATIONS
            .with_label_values(&[
                "vms",
                "get_settings",
                if settings.is_ok() { "ok" } else { "error" },
            ])
            .inc();
        settings
    }

    async fn apply_settings(
        &self,
        handle: &CameraHandle,
        intended: &CameraSettings,
    ) -> Result<AdapterApplyOutcome, AdapterError> {
        let id = self.camera_id(handle)?.to_string();
        let mut outcome = AdapterApplyOutcome::default();

        for group in intended.present_groups() {
            let body = serde_json::to_value(intended.only(group))
                .map_err(|e| AdapterError::Protocol(e.to_string()))?;
            let path = format!("/api/cameras/{id}/settings");

            let entry = match self.request(reqwest::Method::PATCH, &path, Some(&body)).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        // Accepted by the VMS; device-level confirmation
                        // comes from verification.
                        SubGroupOutcome::Applied
                    } else if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
                        || status == reqwest::StatusCode::NOT_IMPLEMENTED
                    {
                        SubGroupOutcome::SkippedUnsupported
                    } else {
                        let detail = response.text().await.unwrap_or_default();
                        SubGroupOutcome::Failed {
                            error: format!("VMS rejected {group}: {status} {detail}"),
                        }
                    }
                }
                Err(e) => SubGroupOutcome::Failed {
                    error: e.to_string(),
                },
            };
            ADAPTER_OPERATIONS
                .with_label_values(&[
                    "vms",
                    "apply",
                    if entry.is_applied() { "ok" } else { "error" },
                ])
                .inc();
            outcome.record(group, entry);
        }

        Ok(outcome)
    }
}

/// Parse a `WWW-Authenticate: Digest ...` challenge into its fields.
fn parse_digest_challenge(header: &str) -> Option<HashMap<String, String>> {
    let rest = header.trim().strip_prefix("Digest ")?;
    let mut fields = HashMap::new();
    for part in split_challenge(rest) {
        let (key, value) = part.split_once('=')?;
        fields.insert(
            key.trim().to_lowercase(),
            value.trim().trim_matches('"').to_string(),
        );
    }
    Some(fields)
}

/// Split on commas outside quoted values.
fn split_challenge(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Build an RFC 2617 digest Authorization header (MD5, qop=auth).
fn digest_authorization(
    challenge: &str,
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
) -> Option<String> {
    let fields = parse_digest_challenge(challenge)?;
    let realm = fields.get("realm")?;
    let nonce = fields.get("nonce")?;
    let qop = fields.get("qop").map(String::as_str);
    let opaque = fields.get("opaque");

    let ha1 = md5_hex(&format!("{username}:{realm}:{password}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));

    let (response, qop_part) = match qop {
        Some(qop) if qop.split(',').any(|q| q.trim() == "auth") => {
            let cnonce = Uuid::new_v4().simple().to_string();
            let nc = "00000001";
            let response = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));
            (
                response,
                format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""),
            )
        }
        _ => (md5_hex(&format!("{ha1}:{nonce}:{ha2}")), String::new()),
    };

    let mut header = format!(
        "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{response}\"{qop_part}"
    );
    if let Some(opaque) = opaque {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    Some(header)
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
