use anyhow::Result;
use apply_engine::{ApplyEngine, ApplyEngineConfig, ApplyJob};
use axum_test::TestServer;
use camera_backends::{AdapterKind, CameraBackend, DiscoveredCamera, MockBackend};
use chrono::Utc;
use optimizer::{Orchestrator, RuleBasedProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tuner_gateway::{routes, GatewayState};

fn test_server(backend: Arc<dyn CameraBackend>) -> Result<TestServer> {
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(RuleBasedProvider::new()),
        Arc::new(RuleBasedProvider::new()),
    ));
    let engine = Arc::new(ApplyEngine::new(ApplyEngineConfig::default()).with_backend(backend));
    let app = routes::router(GatewayState::new(orchestrator, engine));
    Ok(TestServer::new(app)?)
}

fn apply_body(camera_id: &str) -> serde_json::Value {
    json!({
        "camera_id": camera_id,
        "handle": { "address": "192.168.50.10" },
        "adapter": "onvif",
        "verify": true,
        "settings": {
            "stream": { "resolution": "1920x1080", "fps": 15, "bitrate_mbps": 4.0 },
            "exposure": { "wdr_level": 2 },
            "low_light": { "noise_reduction": 2 },
            "image": { "brightness": 50 }
        }
    })
}

async fn wait_terminal(server: &TestServer, job_id: &str) -> ApplyJob {
    for _ in 0..300 {
        let job: ApplyJob = server.get(&format!("/api/jobs/{job_id}")).await.json();
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;
    let response = server.get("/health").await;
    response.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn optimize_returns_a_scored_recommendation() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;

    let response = server
        .post("/api/optimize")
        .json(&json!({
            "context": {
                "camera_id": "cam-1",
                "address": "192.168.50.10",
                "vendor": null,
                "model": null,
                "location": null,
                "scene_type": "entrance",
                "purpose": "facial"
            },
            "capabilities": { "has_wdr": true, "has_ir": true, "has_blc": true,
                              "has_hlc": true, "has_ptz": false, "lpr_capable": false },
            "current": null,
            "options": {}
        }))
        .await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["provider"], "rules");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!(confidence > 0.0 && confidence < 1.0);
    assert!(body["settings"]["stream"].is_object());
    Ok(())
}

#[tokio::test]
async fn malformed_optimization_context_is_a_400() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;

    let response = server
        .post("/api/optimize")
        .json(&json!({
            "context": {
                "camera_id": "cam-1",
                "address": "192.168.50.10",
                "scene_type": "entrance",
                "purpose": "facial"
            },
            "capabilities": { "has_wdr": true, "has_ir": true, "has_blc": true,
                              "has_hlc": true, "has_ptz": false, "lpr_capable": false },
            "options": { "bandwidth_limit_mbps": -2.0 }
        }))
        .await;
    response.assert_status_bad_request();
    Ok(())
}

#[tokio::test]
async fn apply_flow_runs_to_completion_over_http() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;

    let response = server.post("/api/cameras/apply").json(&apply_body("cam-9")).await;
    response.assert_status_ok();
    let job_id = response.json::<serde_json::Value>()["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let job = wait_terminal(&server, &job_id).await;
    assert_eq!(job.camera_id, "cam-9");
    assert!(job.state.is_terminal());
    assert!(job.verification.is_some());
    Ok(())
}

#[tokio::test]
async fn concurrent_apply_for_same_camera_is_a_409() -> Result<()> {
    // connect failure keeps nothing running long; use a mock whose
    // terminal comes quickly, so race the two posts immediately.
    let server = test_server(Arc::new(MockBackend::new()))?;

    let first = server.post("/api/cameras/apply").json(&apply_body("cam-busy")).await;
    first.assert_status_ok();
    let second = server.post("/api/cameras/apply").json(&apply_body("cam-busy")).await;

    // either the first finished already (ok) or the lock held (conflict)
    let status = second.status_code();
    assert!(
        status == axum::http::StatusCode::OK || status == axum::http::StatusCode::CONFLICT,
        "unexpected status {status}"
    );
    Ok(())
}

#[tokio::test]
async fn unknown_job_is_a_404() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;
    let response = server.get("/api/jobs/not-a-job").await;
    response.assert_status_not_found();
    Ok(())
}

#[tokio::test]
async fn discover_passes_through_to_the_selected_backend() -> Result<()> {
    let cameras = vec![DiscoveredCamera {
        address: "192.168.50.31".to_string(),
        name: Some("Dock east".to_string()),
        vendor: Some("Axis".to_string()),
        model: Some("P3268".to_string()),
        hardware_id: None,
        source: AdapterKind::Onvif,
        vms_id: None,
        discovered_at: Utc::now(),
    }];
    let server = test_server(Arc::new(MockBackend::new().with_discovered(cameras)))?;

    let response = server
        .post("/api/discover")
        .json(&json!({ "adapter": "onvif" }))
        .await;
    response.assert_status_ok();
    let found: Vec<DiscoveredCamera> = response.json();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].address, "192.168.50.31");
    Ok(())
}

#[tokio::test]
async fn unregistered_adapter_kind_is_a_400() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;
    let response = server
        .post("/api/discover")
        .json(&json!({ "adapter": "vms" }))
        .await;
    response.assert_status_bad_request();
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_counters() -> Result<()> {
    let server = test_server(Arc::new(MockBackend::new()))?;

    // generate some traffic first
    server.post("/api/cameras/apply").json(&apply_body("cam-m")).await;
    let response = server.get("/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("apply_jobs"));
    Ok(())
}
