use crate::adapter::{
    AdapterApplyOutcome, AdapterKind, CameraBackend, CameraHandle, DiscoveredCamera, ScanParams,
    SubGroupOutcome, VerifyTolerances,
};
use crate::translate;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use common::{
    AdapterError, BitrateMode, CameraCapabilities, CameraSettings, ExposureMode,
    ExposureSettings, GainRange, ImageSettings, IrMode, LowLightSettings, StreamSettings,
    SubGroup, VideoCodec,
};
use std::time::{Duration, Instant};
use telemetry::metrics::{ADAPTER_OPERATIONS, DISCOVERED_CAMERAS};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use uuid::Uuid;

const WS_DISCOVERY_MULTICAST_ADDR: &str = "239.255.255.250:3702";

/// WS-Discovery probe message for ONVIF network video transmitters
const WS_DISCOVERY_PROBE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
    <a:MessageID>uuid:{message_id}</a:MessageID>
    <a:ReplyTo>
      <a:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
    </a:ReplyTo>
    <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
  </s:Header>
  <s:Body>
    <Probe xmlns="http://schemas.xmlsoap.org/ws/2005/04/discovery">
      <d:Types xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dp0="http://www.onvif.org/ver10/network/wsdl">dp0:NetworkVideoTransmitter</d:Types>
    </Probe>
  </s:Body>
</s:Envelope>"#;

/// Direct-device backend speaking WS-Discovery + ONVIF SOAP.
///
/// Every operation is a standalone exchange: the HTTP client keeps no
/// idle connections, matching devices that drop sessions between calls.
pub struct OnvifBackend {
    timeout: Duration,
    http: reqwest::Client,
}

impl OnvifBackend {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            http,
        })
    }

    fn service_url(handle: &CameraHandle) -> String {
        if handle.address.starts_with("http://") || handle.address.starts_with("https://") {
            handle.address.clone()
        } else {
            format!("http://{}/onvif/device_service", handle.address)
        }
    }

    fn build_envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:timg="http://www.onvif.org/ver20/imaging/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <s:Body>
    {body}
  </s:Body>
</s:Envelope>"#
        )
    }

    async fn send_soap(&self, handle: &CameraHandle, body: &str) -> Result<String, AdapterError> {
        let url = Self::service_url(handle);
        let envelope = Self::build_envelope(body);

        debug!(url = %url, "sending ONVIF request");

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope);

        if let Some(creds) = &handle.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout(self.timeout)
            } else {
                AdapterError::Connect {
                    target: url.clone(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AdapterError::Protocol(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdapterError::Auth { target: url });
        }
        if !status.is_success() {
            return Err(AdapterError::Protocol(format!(
                "ONVIF request failed: {status} - {text}"
            )));
        }
        Ok(text)
    }

    fn parse_stream_settings(xml: &str) -> Option<StreamSettings> {
        let codec = extract_tag(xml, "Encoding").and_then(|e| match e.to_uppercase().as_str() {
            "H264" => Some(VideoCodec::H264),
            "H265" | "HEVC" => Some(VideoCodec::H265),
            "JPEG" | "MJPEG" => Some(VideoCodec::Mjpeg),
            _ => None,
        });
        let resolution = match (
            extract_tag(xml, "Width").and_then(|w| w.parse::<u32>().ok()),
            extract_tag(xml, "Height").and_then(|h| h.parse::<u32>().ok()),
        ) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        };
        let fps = extract_tag(xml, "FrameRateLimit").and_then(|v| v.parse().ok());
        let bitrate_mbps = extract_tag(xml, "BitrateLimit")
            .and_then(|v| v.parse::<u32>().ok())
            .map(translate::kbps_to_mbps);
        let keyframe_interval = extract_tag(xml, "GovLength").and_then(|v| v.parse().ok());

        let settings = StreamSettings {
            resolution,
            codec,
            fps,
            bitrate_mbps,
            keyframe_interval,
            // ONVIF media profiles do not expose the rate-control mode
            // through this call.
            bitrate_mode: None,
        };
        (settings != StreamSettings::default()).then_some(settings)
    }

    fn parse_imaging_settings(
        xml: &str,
    ) -> (
        Option<ExposureSettings>,
        Option<LowLightSettings>,
        Option<ImageSettings>,
    ) {
        let exposure_mode = extract_section(xml, "Exposure")
            .as_deref()
            .and_then(|s| extract_tag(s, "Mode"))
            .map(|m| {
                if m.eq_ignore_ascii_case("manual") {
                    ExposureMode::Manual
                } else {
                    ExposureMode::Auto
                }
            });
        let shutter = extract_section(xml, "Exposure")
            .as_deref()
            .and_then(|s| extract_tag(s, "ExposureTime"))
            .and_then(|v| v.parse::<f64>().ok())
            .and_then(|micros| translate::micros_to_shutter(micros.round() as u64));
        let gain_limit_db = extract_section(xml, "Exposure")
            .as_deref()
            .and_then(|s| extract_tag(s, "Gain"))
            .and_then(|v| v.parse().ok());
        let wdr_level = extract_section(xml, "WideDynamicRange").as_deref().map(|s| {
            match extract_tag(s, "Mode").as_deref() {
                Some("ON") => extract_tag(s, "Level")
                    .and_then(|l| l.parse::<f64>().ok())
                    .map(|l| l.round() as u8)
                    .unwrap_or(1),
                _ => 0,
            }
        });
        let backlight_compensation = extract_section(xml, "BacklightCompensation")
            .as_deref()
            .and_then(|s| extract_tag(s, "Mode"))
            .map(|m| m == "ON");

        let exposure = ExposureSettings {
            mode: exposure_mode,
            shutter,
            iris: None,
            gain_limit_db,
            wdr_level,
            backlight_compensation,
            highlight_compensation: None,
        };

        let ir_mode = extract_tag(xml, "IrCutFilter").and_then(|m| match m.as_str() {
            "ON" => Some(IrMode::Off), // IR-cut engaged = IR illumination off
            "OFF" => Some(IrMode::On),
            "AUTO" => Some(IrMode::Auto),
            _ => None,
        });
        let noise_reduction = extract_section(xml, "NoiseReduction")
            .as_deref()
            .and_then(|s| extract_tag(s, "Level"))
            .and_then(|v| v.parse::<f64>().ok())
            .map(|l| l.round() as u8);

        let low_light = LowLightSettings {
            ir_mode,
            ir_intensity: None,
            day_night_mode: None,
            noise_reduction,
            slow_shutter: None,
        };

        let image = ImageSettings {
            sharpness: parse_percent(xml, "Sharpness"),
            contrast: parse_percent(xml, "Contrast"),
            saturation: parse_percent(xml, "ColorSaturation"),
            brightness: parse_percent(xml, "Brightness"),
            white_balance: None,
        };

        (
            (exposure != ExposureSettings::default()).then_some(exposure),
            (low_light != LowLightSettings::default()).then_some(low_light),
            (image != ImageSettings::default()).then_some(image),
        )
    }

    async fn apply_stream(
        &self,
        handle: &CameraHandle,
        stream: &StreamSettings,
    ) -> Result<(), AdapterError> {
        let mut parts = vec![
            r#"<trt:SetVideoEncoderConfiguration>
  <trt:Configuration token="video_encoder_config_1">
    <tt:Name>VideoEncoderConfig</tt:Name>
    <tt:UseCount>1</tt:UseCount>"#
                .to_string(),
        ];

        if let Some(codec) = stream.codec {
            let encoding = match codec {
                VideoCodec::H264 => "H264",
                VideoCodec::H265 => "H265",
                VideoCodec::Mjpeg => "JPEG",
            };
            parts.push(format!("    <tt:Encoding>{encoding}</tt:Encoding>"));
        }

        if let Some(resolution) = &stream.resolution {
            if let Some((w, h)) = split_resolution(resolution) {
                parts.push(format!(
                    "    <tt:Resolution><tt:Width>{w}</tt:Width><tt:Height>{h}</tt:Height></tt:Resolution>"
                ));
            }
        }

        if stream.fps.is_some() || stream.bitrate_mbps.is_some() {
            parts.push("    <tt:RateControl>".to_string());
            if let Some(fps) = stream.fps {
                parts.push(format!("      <tt:FrameRateLimit>{fps}</tt:FrameRateLimit>"));
            }
            if let Some(mbps) = stream.bitrate_mbps {
                let kbps = translate::mbps_to_kbps(mbps);
                parts.push(format!("      <tt:BitrateLimit>{kbps}</tt:BitrateLimit>"));
            }
            parts.push("    </tt:RateControl>".to_string());
        }

        if let Some(gov) = stream.keyframe_interval {
            parts.push(format!(
                "    <tt:H264><tt:GovLength>{gov}</tt:GovLength></tt:H264>"
            ));
        }

        if let Some(mode) = stream.bitrate_mode {
            let constant = matches!(mode, BitrateMode::Constant);
            parts.push(format!(
                "    <tt:Multicast><tt:AutoStart>false</tt:AutoStart></tt:Multicast><tt:ConstantBitRate>{constant}</tt:ConstantBitRate>"
            ));
        }

        parts.push(
            r#"  </trt:Configuration>
  <trt:ForcePersistence>true</trt:ForcePersistence>
</trt:SetVideoEncoderConfiguration>"#
                .to_string(),
        );

        self.send_soap(handle, &parts.join("\n")).await.map(|_| ())
    }

    async fn apply_imaging(
        &self,
        handle: &CameraHandle,
        inner: Vec<String>,
    ) -> Result<(), AdapterError> {
        let mut parts = vec![
            r#"<timg:SetImagingSettings>
  <timg:VideoSourceToken>video_source_1</timg:VideoSourceToken>
  <timg:ImagingSettings>"#
                .to_string(),
        ];
        parts.extend(inner);
        parts.push(
            r#"  </timg:ImagingSettings>
  <timg:ForcePersistence>true</timg:ForcePersistence>
</timg:SetImagingSettings>"#
                .to_string(),
        );
        self.send_soap(handle, &parts.join("\n")).await.map(|_| ())
    }

    fn exposure_body(exposure: &ExposureSettings) -> Vec<String> {
        let mut parts = Vec::new();
        let mut exposure_inner = Vec::new();
        if let Some(mode) = exposure.mode {
            let wire = match mode {
                ExposureMode::Manual => "MANUAL",
                // ONVIF only distinguishes auto/manual; the priority
                // modes ride on auto.
                _ => "AUTO",
            };
            exposure_inner.push(format!("      <tt:Mode>{wire}</tt:Mode>"));
        }
        if let Some(micros) = exposure
            .shutter
            .as_deref()
            .and_then(translate::shutter_to_micros)
        {
            exposure_inner.push(format!("      <tt:ExposureTime>{micros}</tt:ExposureTime>"));
        }
        if let Some(gain) = exposure.gain_limit_db {
            exposure_inner.push(format!("      <tt:Gain>{gain}</tt:Gain>"));
        }
        if !exposure_inner.is_empty() {
            parts.push("    <tt:Exposure>".to_string());
            parts.extend(exposure_inner);
            parts.push("    </tt:Exposure>".to_string());
        }
        if let Some(level) = exposure.wdr_level {
            let mode = if level > 0 { "ON" } else { "OFF" };
            parts.push(format!(
                "    <tt:WideDynamicRange><tt:Mode>{mode}</tt:Mode><tt:Level>{level}</tt:Level></tt:WideDynamicRange>"
            ));
        }
        if let Some(blc) = exposure.backlight_compensation {
            let mode = if blc { "ON" } else { "OFF" };
            parts.push(format!(
                "    <tt:BacklightCompensation><tt:Mode>{mode}</tt:Mode></tt:BacklightCompensation>"
            ));
        }
        parts
    }

    fn low_light_body(low_light: &LowLightSettings) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(ir) = low_light.ir_mode {
            // Canonical IR illumination maps inversely onto the IR-cut
            // filter position.
            let wire = match ir {
                IrMode::On => "OFF",
                IrMode::Off => "ON",
                IrMode::Auto => "AUTO",
            };
            parts.push(format!("    <tt:IrCutFilter>{wire}</tt:IrCutFilter>"));
        }
        if let Some(level) = low_light.noise_reduction {
            parts.push(format!(
                "    <tt:NoiseReduction><tt:Level>{level}</tt:Level></tt:NoiseReduction>"
            ));
        }
        parts
    }

    fn image_body(image: &ImageSettings) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(v) = image.brightness {
            parts.push(format!("    <tt:Brightness>{v}</tt:Brightness>"));
        }
        if let Some(v) = image.contrast {
            parts.push(format!("    <tt:Contrast>{v}</tt:Contrast>"));
        }
        if let Some(v) = image.saturation {
            parts.push(format!("    <tt:ColorSaturation>{v}</tt:ColorSaturation>"));
        }
        if let Some(v) = image.sharpness {
            parts.push(format!("    <tt:Sharpness>{v}</tt:Sharpness>"));
        }
        parts
    }

    fn parse_probe_match(xml: &str) -> Option<DiscoveredCamera> {
        if !xml.contains("ProbeMatch") {
            return None;
        }

        let xaddrs = extract_tag(xml, "XAddrs")?;
        let address = xaddrs.split_whitespace().next()?.to_string();

        let scopes: Vec<String> = extract_tag(xml, "Scopes")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Some(DiscoveredCamera {
            address,
            name: extract_scope_value(&scopes, "name"),
            vendor: extract_scope_value(&scopes, "manufacturer")
                .or_else(|| extract_scope_value(&scopes, "name")),
            model: extract_scope_value(&scopes, "hardware"),
            hardware_id: extract_scope_value(&scopes, "hardware"),
            source: AdapterKind::Onvif,
            vms_id: None,
            discovered_at: Utc::now(),
        })
    }
}

#[async_trait]
impl CameraBackend for OnvifBackend {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Onvif
    }

    fn tolerances(&self) -> VerifyTolerances {
        // Bitrate crosses a Mbps -> kbps -> Mbps rounding boundary.
        VerifyTolerances {
            bitrate_mbps: 0.05,
            fps: 0,
        }
    }

    async fn connect(&self, handle: &CameraHandle) -> Result<(), AdapterError> {
        // GetSystemDateAndTime is the conventional reachability check:
        // mandatory on every ONVIF device and allowed pre-auth.
        let result = self
            .send_soap(handle, "<tds:GetSystemDateAndTime/>")
            .await
            .map(|_| ());
        ADAPTER_OPERATIONS
            .with_label_values(&["onvif", "connect", status_label(&result)])
            .inc();
        result
    }

    async fn discover(&self, params: &ScanParams) -> Result<Vec<DiscoveredCamera>, AdapterError> {
        let message_id = Uuid::new_v4().to_string();
        let probe = WS_DISCOVERY_PROBE.replace("{message_id}", &message_id);

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| {
            AdapterError::Connect {
                target: WS_DISCOVERY_MULTICAST_ADDR.to_string(),
                detail: format!("failed to bind UDP socket: {e}"),
            }
        })?;
        socket.set_broadcast(true).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        socket
            .send_to(probe.as_bytes(), WS_DISCOVERY_MULTICAST_ADDR)
            .await
            .map_err(|e| AdapterError::Connect {
                target: WS_DISCOVERY_MULTICAST_ADDR.to_string(),
                detail: format!("failed to send probe: {e}"),
            })?;

        let deadline = Instant::now() + Duration::from_secs(params.timeout_secs);
        let mut cameras = Vec::new();
        let mut buffer = vec![0u8; 65535];

        // Collect responses until the deadline; whatever arrived by then
        // is the result.
        while cameras.len() < params.max_results {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => break,
            };
            match tokio::time::timeout(remaining, socket.recv_from(&mut buffer)).await {
                Ok(Ok((size, src))) => {
                    let response = String::from_utf8_lossy(&buffer[..size]);
                    debug!(src = %src, bytes = size, "received WS-Discovery response");
                    if let Some(camera) = Self::parse_probe_match(&response) {
                        cameras.push(camera);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "error receiving discovery response");
                    break;
                }
                Err(_) => break, // deadline reached
            }
        }

        info!(found = cameras.len(), "WS-Discovery scan completed");
        DISCOVERED_CAMERAS
            .with_label_values(&["onvif"])
            .inc_by(cameras.len() as u64);
        Ok(cameras)
    }

    async fn capabilities(
        &self,
        handle: &CameraHandle,
    ) -> Result<CameraCapabilities, AdapterError> {
        let encoder_options = self
            .send_soap(
                handle,
                r#"<trt:GetVideoEncoderConfigurationOptions/>"#,
            )
            .await;
        ADAPTER_OPERATIONS
            .with_label_values(&["onvif", "capabilities", status_label(&encoder_options)])
            .inc();
        let encoder_options = encoder_options?;

        let widths: Vec<u32> = extract_all(&encoder_options, "Width")
            .iter()
            .filter_map(|w| w.parse().ok())
            .collect();
        let heights: Vec<u32> = extract_all(&encoder_options, "Height")
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        let mut resolutions: Vec<String> = widths
            .iter()
            .zip(heights.iter())
            .map(|(w, h)| format!("{w}x{h}"))
            .collect();
        resolutions.sort_by_key(|r| std::cmp::Reverse(pixel_count(r)));
        resolutions.dedup();

        let mut codecs = Vec::new();
        if encoder_options.contains("H264") {
            codecs.push(VideoCodec::H264);
        }
        if encoder_options.contains("H265") {
            codecs.push(VideoCodec::H265);
        }
        if encoder_options.contains("JPEG") {
            codecs.push(VideoCodec::Mjpeg);
        }

        let frame_rates: Vec<u32> = extract_section(&encoder_options, "FrameRateRange")
            .map(|s| {
                [
                    extract_tag(&s, "Min").and_then(|v| v.parse().ok()),
                    extract_tag(&s, "Max").and_then(|v| v.parse().ok()),
                ]
                .into_iter()
                .flatten()
                .collect()
            })
            .unwrap_or_default();
        let max_bitrate_mbps = extract_section(&encoder_options, "BitrateRange")
            .as_deref()
            .and_then(|s| extract_tag(s, "Max"))
            .and_then(|v| v.parse::<u32>().ok())
            .map(translate::kbps_to_mbps);

        // Imaging options are a separate service call; absence leaves
        // those constraints unknown rather than unsupported.
        let imaging = self.send_soap(handle, "<timg:GetOptions/>").await.ok();

        let (wdr_levels, has_wdr, ir_modes, has_ir, gain_range_db) = match &imaging {
            Some(xml) => {
                let has_wdr = xml.contains("WideDynamicRange");
                let wdr_levels = has_wdr.then(|| vec![0, 1, 2, 3]);
                let ir_raw = extract_all(xml, "IrCutFilterModes");
                let ir_modes: Vec<IrMode> = ir_raw
                    .iter()
                    .filter_map(|m| match m.as_str() {
                        "ON" => Some(IrMode::Off),
                        "OFF" => Some(IrMode::On),
                        "AUTO" => Some(IrMode::Auto),
                        _ => None,
                    })
                    .collect();
                let has_ir = !ir_modes.is_empty();
                let gain = extract_section(xml, "Gain").and_then(|s| {
                    match (
                        extract_tag(&s, "Min").and_then(|v| v.parse().ok()),
                        extract_tag(&s, "Max").and_then(|v| v.parse().ok()),
                    ) {
                        (Some(min_db), Some(max_db)) => Some(GainRange { min_db, max_db }),
                        _ => None,
                    }
                });
                (
                    wdr_levels,
                    has_wdr,
                    (!ir_modes.is_empty()).then_some(ir_modes),
                    has_ir,
                    gain,
                )
            }
            None => (None, false, None, false, None),
        };

        Ok(CameraCapabilities {
            resolutions: (!resolutions.is_empty()).then_some(resolutions),
            codecs: (!codecs.is_empty()).then_some(codecs),
            min_fps: frame_rates.iter().min().copied(),
            max_fps: frame_rates.iter().max().copied(),
            max_bitrate_mbps,
            wdr_levels,
            shutter_modes: None,
            gain_range_db,
            ir_modes,
            noise_reduction_levels: None,
            has_wdr,
            has_ir,
            has_blc: imaging
                .as_deref()
                .map(|xml| xml.contains("BacklightCompensation"))
                .unwrap_or(false),
            has_hlc: false,
            has_ptz: false,
            lpr_capable: false,
        })
    }

    async fn current_settings(
        &self,
        handle: &CameraHandle,
    ) -> Result<CameraSettings, AdapterError> {
        let encoder = self
            .send_soap(
                handle,
                r#"<trt:GetVideoEncoderConfiguration>
  <trt:ConfigurationToken>video_encoder_config_1</trt:ConfigurationToken>
</trt:GetVideoEncoderConfiguration>"#,
            )
            .await;
        ADAPTER_OPERATIONS
            .with_label_values(&["onvif", "get_settings", status_label(&encoder)])
            .inc();
        let encoder = encoder?;

        let imaging = self
            .send_soap(
                handle,
                r#"<timg:GetImagingSettings>
  <timg:VideoSourceToken>video_source_1</timg:VideoSourceToken>
</timg:GetImagingSettings>"#,
            )
            .await
            .ok();

        let stream = Self::parse_stream_settings(&encoder);
        let (exposure, low_light, image) = match &imaging {
            Some(xml) => Self::parse_imaging_settings(xml),
            None => (None, None, None),
        };

        Ok(CameraSettings {
            stream,
            exposure,
            low_light,
            image,
        })
    }

    async fn apply_settings(
        &self,
        handle: &CameraHandle,
        intended: &CameraSettings,
    ) -> Result<AdapterApplyOutcome, AdapterError> {
        let mut outcome = AdapterApplyOutcome::default();

        for group in intended.present_groups() {
            let result = match group {
                SubGroup::Stream => match &intended.stream {
                    Some(stream) => self.apply_stream(handle, stream).await,
                    None => continue,
                },
                SubGroup::Exposure => match &intended.exposure {
                    Some(exposure) => {
                        self.apply_imaging(handle, Self::exposure_body(exposure)).await
                    }
                    None => continue,
                },
                SubGroup::LowLight => match &intended.low_light {
                    Some(low_light) => {
                        self.apply_imaging(handle, Self::low_light_body(low_light)).await
                    }
                    None => continue,
                },
                SubGroup::Image => match &intended.image {
                    Some(image) => self.apply_imaging(handle, Self::image_body(image)).await,
                    None => continue,
                },
            };

            let entry = match result {
                Ok(()) => SubGroupOutcome::Applied,
                Err(AdapterError::Unsupported { what }) => {
                    warn!(group = %group, what = %what, "sub-group unsupported by device");
                    SubGroupOutcome::SkippedUnsupported
                }
                Err(e) => {
                    warn!(group = %group, error = %e, "sub-group apply failed");
                    SubGroupOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            ADAPTER_OPERATIONS
                .with_label_values(&[
                    "onvif",
                    "apply",
                    if entry.is_applied() { "ok" } else { "error" },
                ])
                .inc();
            outcome.record(group, entry);
        }

        Ok(outcome)
    }
}

fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}

fn split_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn pixel_count(resolution: &str) -> u64 {
    split_resolution(resolution)
        .map(|(w, h)| u64::from(w) * u64::from(h))
        .unwrap_or(0)
}

fn parse_percent(xml: &str, tag: &str) -> Option<u8> {
    extract_tag(xml, tag)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.round().clamp(0.0, 100.0) as u8)
}

/// Extract the text content of the first `tag` element, tolerating
/// namespace prefixes (`<tt:Width>` matches tag `Width`). Not a full
/// XML parser; sufficient for the flat response shapes used here.
pub(crate) fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let content_start = find_open(xml, tag)?;
    let rest = &xml[content_start..];
    let close_at = find_close(rest, tag)?;
    Some(rest[..close_at].trim().to_string())
}

/// All occurrences of `tag`, in document order.
pub(crate) fn extract_all(xml: &str, tag: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = find_open(rest, tag) {
        let after = &rest[start..];
        let Some(close_at) = find_close(after, tag) else {
            break;
        };
        values.push(after[..close_at].trim().to_string());
        let Some(next) = after[close_at..].find('>') else {
            break;
        };
        rest = &after[close_at + next + 1..];
    }
    values
}

/// The raw inner XML of the first `tag` element, for scoped sub-field
/// extraction.
pub(crate) fn extract_section(xml: &str, tag: &str) -> Option<String> {
    extract_tag(xml, tag)
}

fn find_open(xml: &str, tag: &str) -> Option<usize> {
    let mut idx = 0;
    while let Some(lt) = xml[idx..].find('<') {
        let name_start = idx + lt + 1;
        let gt_rel = xml[name_start..].find('>')?;
        let name_full = &xml[name_start..name_start + gt_rel];
        if !name_full.starts_with('/') && !name_full.ends_with('/') {
            let name = name_full
                .split_whitespace()
                .next()
                .unwrap_or(name_full);
            let local = name.rsplit(':').next().unwrap_or(name);
            if local == tag {
                return Some(name_start + gt_rel + 1);
            }
        }
        idx = name_start + gt_rel;
    }
    None
}

fn find_close(xml: &str, tag: &str) -> Option<usize> {
    let mut idx = 0;
    while let Some(lt) = xml[idx..].find("</") {
        let name_start = idx + lt + 2;
        let gt_rel = xml[name_start..].find('>')?;
        let name = &xml[name_start..name_start + gt_rel];
        let local = name.rsplit(':').next().unwrap_or(name);
        if local == tag {
            return Some(idx + lt);
        }
        idx = name_start + gt_rel;
    }
    None
}

fn extract_scope_value(scopes: &[String], key: &str) -> Option<String> {
    for scope in scopes {
        if let Some(pos) = scope.find(&format!("/{key}/")) {
            let value_start = pos + key.len() + 2;
            let value = scope[value_start..]
                .split('/')
                .next()
                .unwrap_or("")
                .to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tag_handles_namespaces() {
        let xml = r#"<tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution>"#;
        assert_eq!(extract_tag(xml, "Width"), Some("1920".to_string()));
        assert_eq!(extract_tag(xml, "Height"), Some("1080".to_string()));
        assert_eq!(extract_tag(xml, "Missing"), None);
    }

    #[test]
    fn extract_all_collects_repeats() {
        let xml = "<a:Width>1920</a:Width><a:Width>1280</a:Width><a:Width>640</a:Width>";
        assert_eq!(extract_all(xml, "Width"), vec!["1920", "1280", "640"]);
    }

    #[test]
    fn scope_value_extraction() {
        let scopes = vec![
            "onvif://www.onvif.org/name/NorthGate".to_string(),
            "onvif://www.onvif.org/hardware/DS-2CD2345".to_string(),
        ];
        assert_eq!(
            extract_scope_value(&scopes, "name"),
            Some("NorthGate".to_string())
        );
        assert_eq!(
            extract_scope_value(&scopes, "hardware"),
            Some("DS-2CD2345".to_string())
        );
        assert_eq!(extract_scope_value(&scopes, "location"), None);
    }

    #[test]
    fn probe_match_parses_into_camera() {
        let xml = r#"<s:Envelope><s:Body><d:ProbeMatches><d:ProbeMatch>
            <d:Scopes>onvif://www.onvif.org/name/Gate onvif://www.onvif.org/hardware/AX-220</d:Scopes>
            <d:XAddrs>http://192.168.1.64/onvif/device_service</d:XAddrs>
        </d:ProbeMatch></d:ProbeMatches></s:Body></s:Envelope>"#;
        let camera = OnvifBackend::parse_probe_match(xml).unwrap();
        assert_eq!(camera.address, "http://192.168.1.64/onvif/device_service");
        assert_eq!(camera.name, Some("Gate".to_string()));
        assert_eq!(camera.model, Some("AX-220".to_string()));
        assert_eq!(camera.source, AdapterKind::Onvif);
    }

    #[test]
    fn non_probe_match_ignored() {
        assert!(OnvifBackend::parse_probe_match("<s:Envelope><s:Body/></s:Envelope>").is_none());
    }

    #[test]
    fn stream_settings_parse_from_encoder_response() {
        let xml = r#"<trt:Configuration>
            <tt:Encoding>H264</tt:Encoding>
            <tt:Resolution><tt:Width>2560</tt:Width><tt:Height>1440</tt:Height></tt:Resolution>
            <tt:RateControl><tt:FrameRateLimit>25</tt:FrameRateLimit><tt:BitrateLimit>4096</tt:BitrateLimit></tt:RateControl>
            <tt:H264><tt:GovLength>50</tt:GovLength></tt:H264>
        </trt:Configuration>"#;
        let stream = OnvifBackend::parse_stream_settings(xml).unwrap();
        assert_eq!(stream.resolution, Some("2560x1440".to_string()));
        assert_eq!(stream.codec, Some(VideoCodec::H264));
        assert_eq!(stream.fps, Some(25));
        assert_eq!(stream.bitrate_mbps, Some(4.096));
        assert_eq!(stream.keyframe_interval, Some(50));
    }

    #[test]
    fn imaging_settings_split_into_groups() {
        let xml = r#"<timg:ImagingSettings>
            <tt:Brightness>55</tt:Brightness>
            <tt:Contrast>50</tt:Contrast>
            <tt:IrCutFilter>AUTO</tt:IrCutFilter>
            <tt:Exposure><tt:Mode>AUTO</tt:Mode><tt:ExposureTime>4000</tt:ExposureTime><tt:Gain>24</tt:Gain></tt:Exposure>
            <tt:WideDynamicRange><tt:Mode>ON</tt:Mode><tt:Level>2</tt:Level></tt:WideDynamicRange>
        </timg:ImagingSettings>"#;
        let (exposure, low_light, image) = OnvifBackend::parse_imaging_settings(xml);

        let exposure = exposure.unwrap();
        assert_eq!(exposure.mode, Some(ExposureMode::Auto));
        assert_eq!(exposure.shutter, Some("1/250".to_string()));
        assert_eq!(exposure.gain_limit_db, Some(24.0));
        assert_eq!(exposure.wdr_level, Some(2));

        let low_light = low_light.unwrap();
        assert_eq!(low_light.ir_mode, Some(IrMode::Auto));

        let image = image.unwrap();
        assert_eq!(image.brightness, Some(55));
        assert_eq!(image.contrast, Some(50));
        assert_eq!(image.sharpness, None);
    }

    #[test]
    fn service_url_built_from_bare_address() {
        let handle = CameraHandle::new("192.168.1.64");
        assert_eq!(
            OnvifBackend::service_url(&handle),
            "http://192.168.1.64/onvif/device_service"
        );
        let explicit = CameraHandle::new("http://192.168.1.64:8080/onvif/device_service");
        assert_eq!(
            OnvifBackend::service_url(&explicit),
            "http://192.168.1.64:8080/onvif/device_service"
        );
    }
}
