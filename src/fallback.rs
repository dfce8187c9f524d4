//! 统一 404/500 兜底
//! HTML 请求的错误响应换成随机画廊页，把人留在站内；资源/接口请求只给裸状态码

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use crate::locale::Lang;
use crate::meta::default_meta;
use crate::models::EntryCard;
use crate::pagination::page_range;
use crate::render::{card_views, render_gallery, GalleryContext};
use crate::AppState;

/// 兜底页卡片数量
const FALLBACK_LIMIT: i64 = 16;
/// 优先从最近 N 天里抽
const RECENT_WINDOW_DAYS: i64 = 30;

/// 最近窗口随机抽样，不够就全库随机补齐 (排除已抽中的)
pub async fn fallback_docs(state: &AppState) -> mongodb::error::Result<Vec<EntryCard>> {
    let since = Utc::now().timestamp_millis() - RECENT_WINDOW_DAYS * 24 * 60 * 60 * 1000;
    let mut docs = state
        .db
        .sample_cards(
            mongodb::bson::doc! { "date": { "$gte": since } },
            FALLBACK_LIMIT,
        )
        .await?;

    if (docs.len() as i64) < FALLBACK_LIMIT {
        let need = FALLBACK_LIMIT - docs.len() as i64;
        let existing: Vec<_> = docs.iter().filter_map(|d| d.oid).collect();
        let more = state
            .db
            .sample_cards(
                mongodb::bson::doc! { "_id": { "$nin": existing } },
                need,
            )
            .await?;
        docs.extend(more);
    }
    Ok(docs)
}

/// 渲染兜底画廊页，保留原状态码；渲染本身挂了就退成纯文本
pub async fn render_fallback(state: &AppState, lang: Lang, status: StatusCode) -> Response {
    let result = async {
        let docs = fallback_docs(state).await?;
        let ctx = GalleryContext {
            meta: default_meta(&state.cfg, lang),
            site_name: state.cfg.site_name.clone(),
            lang_prefix: lang.prefix().to_string(),
            docs: card_views(&state.cfg, lang, &docs),
            range: page_range(1, 1, ""),
            page: 1,
            total_pages: 1,
            total_docs: 0,
            name: String::new(),
            cur_site: String::new(),
            message: String::new(),
        };
        let html = render_gallery(&ctx)?;
        Ok::<String, anyhow::Error>(html)
    }
    .await;

    match result {
        Ok(html) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(html))
            .unwrap_or_else(|_| status.into_response()),
        Err(e) => {
            error!("[fallback] render failed: {}", e);
            let text = if status == StatusCode::NOT_FOUND {
                "Not Found"
            } else {
                "Server Error"
            };
            (status, text).into_response()
        }
    }
}

/// 静态资源类请求不渲染 HTML 兜底
pub fn is_asset_request(path: &str) -> bool {
    if path.starts_with("/public/") || path.starts_with("/css/") || path.starts_with("/js/") {
        return true;
    }
    const ASSET_EXT: &[&str] = &[
        ".css", ".js", ".mjs", ".map", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg",
        ".ico", ".woff", ".woff2", ".ttf", ".eot", ".mp4", ".m3u8", ".ts",
    ];
    let p = path.split('?').next().unwrap_or(path);
    ASSET_EXT.iter().any(|ext| p.to_ascii_lowercase().ends_with(ext))
}

/// 接口类请求 (JSON accept / POST / ajax=1) 也只给裸状态码
pub fn is_api_request(method: &str, accept: &str, query: Option<&str>) -> bool {
    if method != "GET" && method != "HEAD" {
        return true;
    }
    if accept.contains("application/json") {
        return true;
    }
    query
        .map(|q| q.split('&').any(|kv| kv == "ajax=1" || kv == "ajax=true"))
        .unwrap_or(false)
}

/// 响应漏斗：404 与 5xx 的 HTML 请求统一换成兜底画廊页
pub async fn response_funnel(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let method = req.method().as_str().to_string();
    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let lang = if path.starts_with("/zh-CN") { Lang::Cn } else { Lang::Tw };

    let res = next.run(req).await;
    let status = res.status();
    if status != StatusCode::NOT_FOUND && !status.is_server_error() {
        return res;
    }
    if is_asset_request(&path) || is_api_request(&method, &accept, query.as_deref()) {
        return res;
    }
    render_fallback(&state, lang, status).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_detection() {
        assert!(is_asset_request("/css/main.css"));
        assert!(is_asset_request("/img/logo.PNG"));
        assert!(is_asset_request("/video/clip.mp4"));
        assert!(!is_asset_request("/tag/cosplay"));
        assert!(!is_asset_request("/javs/abc.html"));
    }

    #[test]
    fn test_api_detection() {
        assert!(is_api_request("POST", "", None));
        assert!(is_api_request("GET", "application/json", None));
        assert!(is_api_request("GET", "text/html", Some("ajax=1")));
        assert!(!is_api_request("GET", "text/html", Some("page=2")));
        assert!(!is_api_request("GET", "text/html,application/xhtml+xml", None));
    }
}
