use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use realtime_translate_api::config::{ConfigSet, ServiceBackend};
use realtime_translate_api::server;
use realtime_translate_api::service::{GeminiService, MockTranslationService, TranslationService};
use realtime_translate_api::RelayService;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match ConfigSet::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = ?err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(root = ?config.root(), "configuration loaded");
    info!(
        source = %config.pipeline.profile.source_language,
        target = %config.pipeline.profile.target_language,
        inner_deadline_ms = config.pipeline.inner_deadline_ms,
        backup_deadline_ms = config.pipeline.backup_deadline_ms,
        delivery = ?config.pipeline.delivery_mode,
        "translation pipeline configured"
    );

    let synthesis_rate = config.audio.service.synthesis_sample_rate_hz;
    let result = match config.service.backend {
        ServiceBackend::Gemini => match GeminiService::from_env(config.service.clone()) {
            Ok(service) => serve(&config, Arc::new(service.with_synthesis_rate(synthesis_rate))).await,
            Err(err) => {
                error!(error = %err, env = %config.service.api_key_env, "translation service unavailable");
                std::process::exit(1);
            }
        },
        ServiceBackend::Mock => {
            warn!("using mock translation service");
            let service = MockTranslationService::echo().with_synthesis_rate(synthesis_rate);
            serve(&config, Arc::new(service)).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "failed to start server");
        std::process::exit(1);
    }
}

async fn serve<S>(config: &ConfigSet, service: Arc<S>) -> Result<(), server::ServerError>
where
    S: TranslationService + 'static,
{
    let relay = RelayService::new(config, service);
    let ws_addr = config.server.ws_bind_addr.clone();
    info!(
        addr = %ws_addr,
        max_sessions = config.server.max_sessions,
        "starting websocket relay server"
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server::bind_and_run(&ws_addr, relay.clone()) => result,
        () = shutdown => {
            let closed = relay.shutdown();
            info!(closed, "shutdown requested; relay stopped");
            Ok(())
        }
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
