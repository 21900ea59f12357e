//! smoke_hub - multi-camera smoke detection hub
//!
//! Main entry point.

use smoke_hub::{
    camera_malfunction_reporter::{CameraMalfunctionReporter, EscalationPolicy},
    camera_status_tracker::CameraStatusTracker,
    config_store::ConfigStore,
    connection_supervisor::ConnectionSupervisor,
    crop_upload_fanout::{CropUploadFanout, HttpArtifactUploader, UploadLedger},
    detection::{BestFrameSelector, HttpDetector, ThresholdPolicy},
    frame_sampler::{FrameSampler, HttpSampleSink, SampleSink, SamplerSettings},
    group_aggregator::{GroupAggregator, GroupDispatcher},
    inbox::{Inbox, InboxSink, InboxWatcher},
    notifier::FanoutNotifier,
    pipeline::DetectionPipeline,
    ptz_controller::{ActuationCooldown, CameraControl, DahuaPtzClient, PatrolService},
    rtsp_manager::{FfmpegTransport, VideoTransport},
    snapshot_service::SnapshotService,
    state::{AppConfig, AppState},
    web_api,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tell the central server this workstation is up
async fn announce_startup(url: &str) -> reqwest::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    match client
        .post(url)
        .json(&serde_json::json!({ "message": "workstation_started" }))
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            tracing::info!(url = %url, "Startup notice sent");
        }
        Ok(response) => {
            tracing::warn!(url = %url, status = %response.status(), "Startup notice rejected");
        }
        Err(e) => tracing::warn!(url = %url, error = %e, "Startup notice failed"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smoke_hub=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting smoke_hub v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        config_path = %config.config_path.display(),
        detector_url = %config.detector_url,
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        snapshot_dir = %config.snapshot_dir.display(),
        "Configuration loaded"
    );

    let config_store = Arc::new(ConfigStore::load(&config.config_path).await?);
    let timezone = config_store.timezone();
    let supervisor_policy = config_store.supervisor().clone();
    let housekeeping = config_store.housekeeping().clone();
    tracing::info!(
        cameras = config_store.cameras().count(),
        timezone = timezone.name(),
        "ConfigStore initialized"
    );

    match FfmpegTransport::check_ffmpeg().await {
        Ok(version) => tracing::info!(version = %version, "ffmpeg available"),
        Err(e) => tracing::error!(error = %e, "ffmpeg unavailable, streams will not open"),
    }

    // Alerts and PTZ
    let alerts = Arc::new(FanoutNotifier::new(config.alert_channels()?));
    if alerts.is_empty() {
        tracing::warn!("No alert channel configured");
    }
    let control: Arc<dyn CameraControl> =
        Arc::new(DahuaPtzClient::new(config_store.credentials().cloned())?);
    let cooldown = Arc::new(ActuationCooldown::new(
        control.clone(),
        config_store.actuation().clone(),
    ));

    // Detection pipeline
    let selector = Arc::new(BestFrameSelector::new(
        Arc::new(HttpDetector::new(config.detector_url.clone())?),
        ThresholdPolicy::from_detection(config_store.detection(), timezone),
    ));
    let fanout = Arc::new(
        CropUploadFanout::new(
            config_store.clone(),
            Arc::new(HttpArtifactUploader::new()?),
            Arc::new(UploadLedger::new()),
            config.output_dir.clone(),
        )
        .with_actuation(cooldown.clone())
        .with_notifier(alerts.clone()),
    );
    let pipeline = Arc::new(DetectionPipeline::new(selector, fanout));

    // Grouping
    let targets: HashMap<_, _> = config_store
        .cameras()
        .map(|c| (c.ip.clone(), config_store.group_target(&c.ip)))
        .collect();
    let aggregator = Arc::new(
        GroupAggregator::new(
            config_store.detection().group_size,
            Duration::from_secs(config_store.detection().unit_wait_secs),
        )
        .with_targets(targets),
    );
    let dispatcher = Arc::new(GroupDispatcher::new(aggregator, pipeline));
    let inbox = Arc::new(Inbox::new(&config.input_dir).await?);

    let sink: Arc<dyn SampleSink> = match &config_store.fleet().sample_upload_url {
        Some(url) => {
            tracing::info!(url = %url, "Samples go to a remote ingestion endpoint");
            Arc::new(HttpSampleSink::new(url.clone())?)
        }
        None => Arc::new(InboxSink::new(inbox.clone(), dispatcher.clone())),
    };

    // Camera supervisors
    let status = Arc::new(CameraStatusTracker::new(
        config_store.cameras().map(|c| &c.ip),
    ));
    let snapshots = Arc::new(SnapshotService::new(config.snapshot_dir.clone(), timezone).await?);
    let transport: Arc<dyn VideoTransport> = Arc::new(FfmpegTransport::new(Duration::from_secs(
        supervisor_policy.open_timeout_secs,
    )));
    let reporter = Arc::new(CameraMalfunctionReporter::new(alerts.clone()));
    let escalation = EscalationPolicy::from_supervisor(&supervisor_policy, timezone);
    let retry_interval = Duration::from_secs(supervisor_policy.retry_interval_secs);

    for camera in config_store.cameras() {
        let Some(cell) = status.cell(&camera.ip) else {
            continue;
        };
        let sampler = Arc::new(FrameSampler::new(
            camera.clone(),
            snapshots.clone(),
            sink.clone(),
            SamplerSettings::from(&supervisor_policy),
        ));
        ConnectionSupervisor::new(
            camera.clone(),
            config_store.stream_url(camera),
            transport.clone(),
            sampler,
            cell,
            reporter.clone(),
            escalation.clone(),
            retry_interval,
        )
        .spawn();
    }
    tracing::info!("Connection supervisors started");

    // Background tasks
    dispatcher.start_sweeper(Duration::from_secs(housekeeping.sweep_interval_secs.max(1)));
    let watcher = Arc::new(InboxWatcher::new(
        inbox.clone(),
        dispatcher.clone(),
        timezone,
        housekeeping,
    ));
    watcher.start().await;

    let patrol = Arc::new(PatrolService::new(control, cooldown.clone()));
    let patrols = patrol.start(config_store.cameras());
    tracing::info!(cameras = patrols.len(), "Patrol tasks started");

    if let Some(url) = config_store.fleet().server_notify_url.clone() {
        tokio::spawn(async move {
            if let Err(e) = announce_startup(&url).await {
                tracing::error!(url = %url, error = %e, "Startup notice client unavailable");
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        config_store,
        status,
        dispatcher,
        inbox,
        cooldown,
        started_at: Instant::now(),
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
