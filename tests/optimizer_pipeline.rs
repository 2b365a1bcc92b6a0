use anyhow::Result;
use common::{
    CameraCapabilities, CameraContext, CameraPurpose, OptimizationContext, OptimizeError,
    SceneType, VideoCodec,
};
use optimizer::{
    OptimizationProvider, OptimizationRequest, Orchestrator, RuleBasedProvider,
    FALLBACK_CONFIDENCE_CEILING,
};
use std::sync::Arc;

fn request(scene: SceneType, purpose: CameraPurpose) -> OptimizationRequest {
    OptimizationRequest {
        context: CameraContext {
            camera_id: "cam-entrance-1".to_string(),
            address: "192.168.10.21".to_string(),
            vendor: Some("Hikvision".to_string()),
            model: Some("DS-2CD2345".to_string()),
            location: Some("North entrance".to_string()),
            scene_type: scene,
            purpose,
        },
        capabilities: CameraCapabilities::unconstrained(),
        current: None,
        options: OptimizationContext::default(),
    }
}

fn rules_orchestrator() -> Orchestrator {
    // Rules as both primary and fallback: the offline deployment shape.
    Orchestrator::new(
        Arc::new(RuleBasedProvider::new()),
        Arc::new(RuleBasedProvider::new()),
    )
}

#[tokio::test]
async fn recommendations_respect_constrained_capabilities() -> Result<()> {
    let orchestrator = rules_orchestrator();

    let mut req = request(SceneType::Entrance, CameraPurpose::Facial);
    req.capabilities = CameraCapabilities {
        resolutions: Some(vec!["1920x1080".to_string(), "1280x720".to_string()]),
        codecs: Some(vec![VideoCodec::H264]),
        min_fps: Some(1),
        max_fps: Some(12),
        max_bitrate_mbps: Some(3.0),
        ..CameraCapabilities::unconstrained()
    };

    let result = orchestrator.optimize(&req).await?;

    let stream = result.settings.stream.as_ref().unwrap();
    assert_eq!(stream.resolution.as_deref(), Some("1920x1080"));
    assert_eq!(stream.codec, Some(VideoCodec::H264));
    assert!(stream.fps.unwrap() <= 12);
    assert!(stream.bitrate_mbps.unwrap() <= 3.0);
    // every substituted value produced a warning
    assert!(!result.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn fallback_results_are_distinguishable_by_confidence() -> Result<()> {
    let orchestrator = rules_orchestrator();

    for scene in SceneType::ALL {
        for purpose in CameraPurpose::ALL {
            let result = orchestrator.optimize(&request(scene, purpose)).await?;
            assert_eq!(result.provider, "rules");
            assert!(
                result.confidence < FALLBACK_CONFIDENCE_CEILING,
                "{scene:?}/{purpose:?} fallback confidence {} reached the ceiling",
                result.confidence
            );
            // no warnings against a maximally permissive capability set
            assert!(
                result.warnings.is_empty(),
                "{scene:?}/{purpose:?} warned against unconstrained capabilities: {:?}",
                result.warnings
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn out_of_range_optimization_context_is_an_input_error() {
    let orchestrator = rules_orchestrator();

    let mut req = request(SceneType::Parking, CameraPurpose::Plates);
    req.options.retention_days = Some(0);

    let err = orchestrator.optimize(&req).await.unwrap_err();
    assert!(matches!(err, OptimizeError::Input(_)));
}

#[tokio::test]
async fn results_are_immutable_snapshots() -> Result<()> {
    let orchestrator = rules_orchestrator();
    let req = request(SceneType::Lobby, CameraPurpose::Counting);

    let first = orchestrator.optimize(&req).await?;
    let second = orchestrator.optimize(&req).await?;

    // same inputs, same recommendation; separate result instances
    assert_eq!(first.settings, second.settings);
    assert_eq!(first.confidence, second.confidence);
    Ok(())
}

#[tokio::test]
async fn rule_provider_declares_no_network_dependency() {
    let provider = RuleBasedProvider::new();
    assert!(!provider.requires_network());
}
