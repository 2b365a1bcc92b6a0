use anyhow::{Context, Result};
use apply_engine::{ApplyEngine, ApplyEngineConfig};
use camera_backends::{OnvifBackend, VmsBackend};
use optimizer::{
    OptimizationProvider, Orchestrator, RuleBasedProvider, VisionProvider, VisionProviderConfig,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tuner_gateway::{routes, GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_with_service("tuner-gateway");

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    let bind_addr: std::net::SocketAddr =
        config.bind_addr.parse().context("invalid bind address")?;

    // Providers: the vision service when configured, rules always as
    // the availability floor.
    let fallback: Arc<dyn OptimizationProvider> = Arc::new(RuleBasedProvider::new());
    let primary: Arc<dyn OptimizationProvider> =
        match (&config.vision_endpoint, &config.vision_api_key) {
            (Some(endpoint), Some(api_key)) => {
                info!(endpoint = %endpoint, model = %config.vision_model, "vision provider enabled");
                Arc::new(
                    VisionProvider::new(VisionProviderConfig {
                        endpoint: endpoint.clone(),
                        api_key: api_key.clone(),
                        model: config.vision_model.clone(),
                        timeout_secs: config.vision_timeout_secs,
                    })
                    .context("failed to create vision provider")?,
                )
            }
            _ => {
                info!("no vision service configured, running rule-based only");
                Arc::clone(&fallback)
            }
        };
    let orchestrator = Arc::new(Orchestrator::new(primary, fallback));

    // Backends: direct ONVIF always, VMS when configured.
    let mut engine = ApplyEngine::new(ApplyEngineConfig {
        step_timeout_secs: config.step_timeout_secs,
    })
    .with_backend(Arc::new(
        OnvifBackend::new(config.adapter_timeout_secs)
            .context("failed to create ONVIF backend")?,
    ));
    if let Some(vms_url) = &config.vms_url {
        info!(url = %vms_url, "VMS backend enabled");
        engine = engine.with_backend(Arc::new(
            VmsBackend::new(
                vms_url,
                &config.vms_username,
                &config.vms_password,
                config.adapter_timeout_secs,
            )
            .context("failed to create VMS backend")?,
        ));
    }

    let state = GatewayState::new(orchestrator, Arc::new(engine));
    let app = routes::router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "tuner-gateway listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
