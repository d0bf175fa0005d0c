use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use uuid::Uuid;
use warp::{self, Filter};

use chatpipe::config::PipelineConfig;
use chatpipe::constants::WS_PATH;
use chatpipe::core::broadcast::BroadcastFabric;
use chatpipe::core::membership::RoomMembershipIndex;
use chatpipe::core::pipeline::{LogMentionSink, MessagePipeline};
use chatpipe::handlers::websocket::{handle_ws_client, identity_from_query, AppState, SharedState};
use chatpipe::metrics::{InMemoryMetricsCollector, PipelineMetrics};
use chatpipe::storage::memory::{
    MemoryMessageStore, MemoryRateLimitStore, MemoryRelay, MemorySessionStore,
};

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    // Load config from the environment
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, rate limit {}/{}s, session ttl {}s",
        config.host,
        config.port,
        config.rate_limit_max_messages,
        config.rate_limit_window.as_secs(),
        config.session_ttl.as_secs()
    );

    // Single-node wiring: in-memory stand-ins for the distributed stores.
    // A clustered deployment swaps these for shared-store implementations.
    let session_store = Arc::new(MemorySessionStore::new(config.session_ttl));
    let rate_limit_store = Arc::new(MemoryRateLimitStore::new());
    let message_store = Arc::new(MemoryMessageStore::new());
    let relay = Arc::new(MemoryRelay::new());

    let node_id = Uuid::new_v4().to_string();
    info!("Node id: {}", node_id);

    let membership = Arc::new(RoomMembershipIndex::new());
    let fabric = Arc::new(BroadcastFabric::new(node_id, relay));
    let collector = Arc::new(InMemoryMetricsCollector::new());
    let metrics = Arc::new(PipelineMetrics::new(collector.clone()));

    let pipeline = match MessagePipeline::new(
        &config,
        session_store,
        rate_limit_store,
        message_store,
        membership,
        fabric.clone(),
        metrics,
        Arc::new(LogMentionSink),
    ) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Failed to build message pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let state: SharedState = Arc::new(AppState {
        pipeline,
        fabric,
        metrics: collector.clone(),
        connections: Default::default(),
    });

    // WebSocket route; identity comes from upgrade-time query parameters
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .map(
            |ws: warp::ws::Ws, query: HashMap<String, String>, state: SharedState| {
                ws.on_upgrade(move |socket| {
                    let socket_id = Uuid::new_v4().to_string();
                    let identity = identity_from_query(&query, &socket_id);
                    handle_ws_client(socket, identity, state)
                })
            },
        );

    // Health check route
    let health_route = warp::path("health").map(|| "OK");

    // Metrics export route
    let metrics_route = warp::path("metrics")
        .and(warp::any().map(move || collector.clone()))
        .and_then(
            |collector: Arc<InMemoryMetricsCollector>| async move {
                use chatpipe::metrics::MetricsCollector;
                match collector.export_metrics("prometheus").await {
                    Ok(body) => Ok::<_, Infallible>(body),
                    Err(e) => {
                        error!("Failed to export metrics: {}", e);
                        Ok(String::new())
                    }
                }
            },
        );

    let routes = ws_route.or(health_route).or(metrics_route);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting ChatPipe server on {}", addr);

    warp::serve(routes).run(addr).await;
}

// Helper function to include shared state in request
fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
