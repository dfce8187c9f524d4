mod cache;
mod config;
mod db;
mod error;
mod fallback;
mod handlers;
mod locale;
mod meta;
mod models;
mod pagination;
mod rate_limit;
mod render;
mod seo;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::db::Db;
use crate::locale::Lang;
use crate::rate_limit::FixedWindowLimiter;

/// 全站基线限流：600 次/分/IP
const GENERAL_LIMIT_PER_MIN: u32 = 600;
/// 详情页限流：120 次/分/IP (反爬)
const DETAIL_LIMIT_PER_MIN: u32 = 120;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub db: Db,
    pub sitemap_cache: Arc<TtlCache>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 任何真正漏到顶的 panic：记日志，延迟退出让 supervisor 拉起来
    std::panic::set_hook(Box::new(|info| {
        error!("[uncaught] {}", info);
        std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(300));
            std::process::exit(1);
        });
    }));

    let cfg = Arc::new(Config::from_env());

    // Mongo 连不上就退避重试，连上之前不绑端口
    let db = db::connect_with_backoff(&cfg).await?;

    let state = AppState {
        cfg: cfg.clone(),
        db,
        sitemap_cache: Arc::new(TtlCache::new()),
    };

    let general_limiter = FixedWindowLimiter::new(GENERAL_LIMIT_PER_MIN);
    let detail_limiter = FixedWindowLimiter::new(DETAIL_LIMIT_PER_MIN);

    // /zh-CN 镜像：同一套路由，请求打上简体标记
    let app = Router::new()
        .merge(site_routes(&cfg, detail_limiter.clone()))
        .nest(
            "/zh-CN",
            site_routes(&cfg, detail_limiter).layer(middleware::from_fn(set_lang_cn)),
        )
        // SEO 端点
        .route("/robots.txt", get(seo::robots))
        .route("/sitemap.xml", get(seo::sitemap_index))
        .route("/sitemap.xml.gz", get(seo::sitemap_index))
        .route("/sitemap-media.xml", get(seo::sitemap_media))
        .route("/sitemap-media.xml.gz", get(seo::sitemap_media))
        .route("/sitemap-tag.xml", get(seo::sitemap_tag))
        .route("/sitemap-tag.xml.gz", get(seo::sitemap_tag))
        .route("/sitemap-cat.xml", get(seo::sitemap_cat))
        .route("/sitemap-cat.xml.gz", get(seo::sitemap_cat))
        // 入库 / 查重 / 榜单接口
        .route("/users/resource", post(handlers::resource_post))
        .route("/users/isHave", post(handlers::resource_find))
        .route("/thumbzilla/checkData", post(handlers::resource_find))
        .route("/rank/save", post(handlers::rank_save))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn(request_id))
                .layer(middleware::from_fn_with_state(
                    general_limiter,
                    rate_limit::general_limit,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    fallback::response_funnel,
                )),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 {} 启动在 http://{}", cfg.site_name, addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("[shutdown] bye");
    Ok(())
}

/// 页面路由表，根路径和 /zh-CN 各挂一份
fn site_routes(cfg: &Config, detail_limiter: FixedWindowLimiter) -> Router<AppState> {
    let detail = Router::new()
        .route(
            &format!("/{}/{{id}}", cfg.detail_prefix),
            get(handlers::detail),
        )
        .route_layer(middleware::from_fn_with_state(
            detail_limiter,
            rate_limit::detail_limit,
        ));

    Router::new()
        .route("/", get(handlers::home))
        .route("/hot", get(handlers::hot))
        .route("/hot/{page}", get(handlers::hot_page))
        .route("/search", get(handlers::search))
        .route("/search/{q}", get(handlers::search_q))
        .route("/search/{q}/{page}", get(handlers::search_q_page))
        .route("/tag/{name}", get(handlers::tag))
        .route("/tag/{name}/{page}", get(handlers::tag_page))
        .route("/cat/{name}", get(handlers::cat))
        .route("/cat/{name}/{page}", get(handlers::cat_page))
        .route("/genre", get(handlers::genre))
        .route("/genre/{page}", get(handlers::genre_page))
        .merge(detail)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// /zh-CN 子树：请求打上简体标记
async fn set_lang_cn(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(Lang::Cn);
    next.run(req).await
}

/// 透传或生成 X-Request-Id
async fn request_id(req: Request, next: Next) -> Response {
    let rid = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(64).collect::<String>())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[shutdown] ctrl_c listen failed: {}", e);
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("[shutdown] SIGTERM listen failed: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("[shutdown] SIGINT received"),
        _ = terminate => info!("[shutdown] SIGTERM received"),
    }
}
