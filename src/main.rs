use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_stream_relay::config::RelayConfig;
use video_stream_relay::infrastructure::storage;
use video_stream_relay::models::TransferRequest;
use video_stream_relay::services::source::YtDlpSource;
use video_stream_relay::services::transfer::TransferService;
use video_stream_relay::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Transfer this video id once and exit instead of serving
    #[arg(long)]
    video_id: Option<String>,

    /// Transfer this video URL once and exit instead of serving
    #[arg(long)]
    video_url: Option<String>,

    /// Folder inside the bucket for the one-shot transfer
    #[arg(long)]
    path: Option<String>,

    /// Quality for the one-shot transfer (default: highest)
    #[arg(long)]
    quality: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_stream_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Video Stream Relay...");

    // 2. Config & Infrastructure
    let config = RelayConfig::from_env()?;
    info!(
        "🛠️  Relay Config: Bucket={}, Part Size={}MB, Concurrency={}, Relay Capacity={}, Timeout={:?}",
        config.bucket_name,
        config.part_size / 1024 / 1024,
        config.upload_concurrency,
        config.relay_capacity,
        config.transfer_timeout
    );

    let storage_service = storage::setup_storage(&config).await;
    let source = Arc::new(YtDlpSource::new(config.ytdlp_binary.clone()));
    let transfer = Arc::new(TransferService::new(config, source, storage_service));

    // 3. One-shot mode
    if args.video_id.is_some() || args.video_url.is_some() {
        let req = TransferRequest {
            video_id: args.video_id,
            video_url: args.video_url,
            path: args.path,
            quality: args.quality,
        };

        return match transfer.transfer(&req).await {
            Ok(res) => {
                println!("{}", serde_json::to_string_pretty(&res)?);
                Ok(())
            }
            Err(e) => {
                let body = serde_json::json!({ "error": e.public_message() });
                eprintln!("{}", body);
                error!(stage = ?e.stage(), "❌ Transfer failed: {}", e);
                std::process::exit(1);
            }
        };
    }

    // 4. API Service
    let state = AppState { transfer };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
