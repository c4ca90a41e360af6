use anyhow::{Context, Result};
use coldstore_monitor::config::Config;
use coldstore_monitor::http::{self, HttpState};
use coldstore_monitor::monitor::ColdStoreMonitor;
use coldstore_monitor::mqtt;
use coldstore_monitor::persistence::{build_pool, PersistenceGateway, PgGateway};
use coldstore_monitor::stats::MonitorStats;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,coldstore_monitor=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let endpoint = normalize_otlp_http_endpoint(endpoint);
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "coldstore-monitor"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind coldstore-monitor on {addr}: port already in use. Stop the other service or set COLDSTORE_HTTP_BIND.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind coldstore-monitor on {addr}"))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let policy = config.threshold_policy()?;
    let pool = build_pool(&config.database_url, config.db_pool_size, config.db_timeout()).await?;
    let gateway = PgGateway::new(pool.clone(), config.db_timeout());
    gateway.ensure_schema(&policy).await?;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway);

    let stats = Arc::new(MonitorStats::new());
    let monitor = ColdStoreMonitor::new(
        policy,
        config.alert_cooldown(),
        config.alert_history_limit,
        stats,
    );

    let listener = bind_listener(&config.http_bind).await?;
    let session = mqtt::connect(&config).await.with_context(|| {
        format!(
            "MQTT broker {}:{} unreachable at startup",
            config.mqtt_host, config.mqtt_port
        )
    })?;

    let cancel = CancellationToken::new();
    let mqtt_handle = {
        let config = config.clone();
        let monitor = monitor.clone();
        let gateway = config.persist_mqtt_readings.then(|| gateway.clone());
        let cancel = cancel.clone();
        tokio::spawn(async move {
            mqtt::run_listener(config, monitor, gateway, session, cancel).await
        })
    };

    let app = http::router(HttpState {
        monitor,
        gateway,
        history_limit: config.history_limit,
    });
    tracing::info!(addr=%config.http_bind, topic=%config.mqtt_topic, "coldstore-monitor listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    if let Err(err) = mqtt_handle.await {
        tracing::warn!(error=%err, "MQTT task failed");
    }
    pool.close().await;
    served.context("HTTP server failed")?;
    Ok(())
}
