use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::SlotAllocationService;
use conversation_cell::{ConversationEngine, ConversationStore, InMemoryConversationStore, SupabaseConversationStore};
use doctor_cell::DirectoryService;
use intent_cell::ResilientExtractor;
use patient_cell::IdentityResolver;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::{ClinicStore, InMemoryClinicStore, SupabaseClinicStore};
use shared_utils::{Clock, SystemClock};

use router::AppServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic chat API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Storage
    let (store, conversations): (Arc<dyn ClinicStore>, Arc<dyn ConversationStore>) = if config.is_configured() {
        let supabase = Arc::new(SupabaseClient::new(&config));
        (
            Arc::new(SupabaseClinicStore::new(supabase.clone())),
            Arc::new(SupabaseConversationStore::new(supabase)),
        )
    } else {
        warn!("Supabase is not configured, using in-memory storage");
        (Arc::new(InMemoryClinicStore::new()), Arc::new(InMemoryConversationStore::new()))
    };

    if !config.is_language_model_configured() {
        warn!("GEMINI_API_KEY not set, messages are read by the keyword extractor only");
    }
    let extractor = Arc::new(ResilientExtractor::from_config(&config));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.clinic_utc_offset_minutes));

    let services = AppServices {
        engine: Arc::new(ConversationEngine::new(
            store.clone(),
            conversations,
            extractor,
            clock.clone(),
            &config,
        )),
        identity: Arc::new(IdentityResolver::new(store.clone())),
        directory: Arc::new(DirectoryService::new(store.clone())),
        allocation: Arc::new(SlotAllocationService::new(store, clock)),
    };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
