//! SEO 端点
//! robots.txt + sitemap 索引与三个子图 (media/tag/cat)。
//! media 子图是 最新N + 随机M 的混合：既保证新内容被发现，
//! 又不给爬虫一份可枚举的全量目录。响应进程内缓存，按需 gzip。

use std::io::Write;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::db::IdDate;
use crate::error::AppError;
use crate::AppState;

/// tag 子图的精选白名单：只放站内真实运营的标签，杂草标签不进 sitemap
const CURATED_TAGS: &[&str] = &[
    "cosplay", "onlyfans", "instagram", "tiktok", "bikini", "lingerie", "selfie",
    "asian", "jav", "hanime", "gravure", "model",
    "自拍", "巨乳", "美腿", "制服", "寫真", "素人", "台灣", "日本", "韓國", "歐美",
];

// ---------- robots ----------

pub async fn robots(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        "User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n",
        state.cfg.site_url
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

// ---------- XML 组装 ----------

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn urlset(entries: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">{}</urlset>",
        entries
    )
}

fn lastmod(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

// ---------- 最新 + 随机 合并 ----------

/// 去重合并：最新在前，随机补充在后，撞车用 reserve (顺延的最新) 补位，
/// 总量不超过 cap
pub fn merge_recent_random(
    recent: Vec<IdDate>,
    random: Vec<IdDate>,
    reserve: Vec<IdDate>,
    cap: usize,
) -> Vec<IdDate> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(cap);
    for d in recent.into_iter().chain(random).chain(reserve) {
        if out.len() >= cap {
            break;
        }
        if seen.insert(d.oid) {
            out.push(d);
        }
    }
    out
}

// ---------- gzip ----------

/// 是否压缩：.gz 后缀、?gz=1、或 Accept-Encoding 带 gzip
pub fn wants_gzip(path: &str, query: Option<&str>, headers: &HeaderMap) -> bool {
    if path.ends_with(".gz") {
        return true;
    }
    if query
        .map(|q| q.split('&').any(|kv| kv == "gz=1"))
        .unwrap_or(false)
    {
        return true;
    }
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false)
}

pub fn gzip_bytes(input: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(input)?;
    enc.finish()
}

// ---------- 缓存 + 响应 ----------

fn xml_response(body: Vec<u8>, gz: bool) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml; charset=utf-8");
    if gz {
        builder = builder.header(header::CONTENT_ENCODING, "gzip");
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

impl AppState {
    /// 取缓存的 sitemap，没有或过期就重建；gz 变体单独缓存
    async fn cached_xml<F, Fut>(&self, key: &str, gz: bool, build: F) -> Result<Response, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String, AppError>>,
    {
        let ttl = Duration::from_secs(self.cfg.sitemap_ttl_secs);
        let plain = match self.sitemap_cache.get(key) {
            Some(b) => b,
            None => {
                debug!("[sitemap] rebuild {}", key);
                let xml = build().await?;
                self.sitemap_cache.put(key, xml.into_bytes(), ttl)
            }
        };
        if !gz {
            return Ok(xml_response(plain.as_ref().clone(), false));
        }
        let gz_key = format!("{}.gz", key);
        let zipped = match self.sitemap_cache.get(&gz_key) {
            Some(b) => b,
            None => {
                let z = gzip_bytes(&plain)
                    .map_err(|e| AppError::BadRequest(format!("gzip failed: {}", e)))?;
                self.sitemap_cache.put(&gz_key, z, ttl)
            }
        };
        Ok(xml_response(zipped.as_ref().clone(), true))
    }
}

// ---------- 各 sitemap 端点 ----------

pub async fn sitemap_index(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let gz = wants_gzip(uri.path(), uri.query(), &headers);
    let site_url = state.cfg.site_url.clone();
    state
        .cached_xml("index", gz, || async move {
            let leaves = ["media", "tag", "cat"]
                .iter()
                .map(|kind| {
                    format!(
                        "<sitemap><loc>{}/sitemap-{}.xml</loc></sitemap>",
                        site_url, kind
                    )
                })
                .collect::<String>();
            Ok(format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">{}</sitemapindex>",
                leaves
            ))
        })
        .await
}

pub async fn sitemap_media(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let gz = wants_gzip(uri.path(), uri.query(), &headers);
    let st = state.clone();
    state
        .cached_xml("media", gz, || async move {
            let recent_n = st.cfg.sitemap_recent;
            let random_n = st.cfg.sitemap_random;
            let recent = st.db.recent_id_dates(0, recent_n as i64).await?;
            let random = st.db.sample_id_dates(random_n as i64).await?;
            // 随机抽样撞上最新集时，从顺延的最新里补位
            let reserve = st
                .db
                .recent_id_dates(recent_n as u64, random_n as i64)
                .await?;
            let merged = merge_recent_random(recent, random, reserve, recent_n + random_n);

            let entries = merged
                .iter()
                .map(|d| {
                    format!(
                        "<url><loc>{}</loc><lastmod>{}</lastmod></url>",
                        xml_escape(&st.cfg.detail_url(&d.oid.to_hex())),
                        lastmod(d.date)
                    )
                })
                .collect::<String>();
            Ok(urlset(&entries))
        })
        .await
}

pub async fn sitemap_tag(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let gz = wants_gzip(uri.path(), uri.query(), &headers);
    let st = state.clone();
    state
        .cached_xml("tag", gz, || async move {
            let mut tags = st.db.distinct_values("tag").await?;
            tags.retain(|t| is_curated_tag(t));
            tags.truncate(st.cfg.sitemap_tag_max);
            let entries = tags
                .iter()
                .map(|t| {
                    format!(
                        "<url><loc>{}/tag/{}/</loc></url>",
                        st.cfg.site_url,
                        urlencoding::encode(t)
                    )
                })
                .collect::<String>();
            Ok(urlset(&entries))
        })
        .await
}

pub async fn sitemap_cat(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let gz = wants_gzip(uri.path(), uri.query(), &headers);
    let st = state.clone();
    state
        .cached_xml("cat", gz, || async move {
            let mut cats = st.db.distinct_values("cat").await?;
            cats.truncate(st.cfg.sitemap_tag_max);
            let entries = cats
                .iter()
                .map(|c| {
                    format!(
                        "<url><loc>{}/cat/{}/</loc></url>",
                        st.cfg.site_url,
                        urlencoding::encode(c)
                    )
                })
                .collect::<String>();
            Ok(urlset(&entries))
        })
        .await
}

fn is_curated_tag(tag: &str) -> bool {
    let t = tag.trim();
    CURATED_TAGS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(t) || *c == t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use std::io::Read;

    fn id_date(oid: ObjectId, date: i64) -> IdDate {
        IdDate { oid, date }
    }

    #[test]
    fn test_merge_dedupes_and_caps() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let c = ObjectId::new();
        let d = ObjectId::new();
        let recent = vec![id_date(a, 3), id_date(b, 2)];
        // 随机抽样撞上了 a
        let random = vec![id_date(a, 3), id_date(c, 1)];
        let reserve = vec![id_date(d, 0)];
        let merged = merge_recent_random(recent, random, reserve, 4);
        let ids: Vec<_> = merged.iter().map(|d| d.oid).collect();
        assert_eq!(ids, vec![a, b, c, d]);

        // cap 生效
        let merged = merge_recent_random(
            vec![id_date(a, 3), id_date(b, 2)],
            vec![id_date(c, 1)],
            vec![],
            2,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_no_duplicates() {
        let ids: Vec<ObjectId> = (0..10).map(|_| ObjectId::new()).collect();
        let recent: Vec<IdDate> = ids.iter().map(|&o| id_date(o, 1)).collect();
        let random: Vec<IdDate> = ids.iter().map(|&o| id_date(o, 1)).collect();
        let merged = merge_recent_random(recent, random, vec![], 100);
        assert_eq!(merged.len(), 10);
    }

    #[test]
    fn test_wants_gzip() {
        let headers = HeaderMap::new();
        assert!(wants_gzip("/sitemap.xml.gz", None, &headers));
        assert!(wants_gzip("/sitemap.xml", Some("gz=1"), &headers));
        assert!(!wants_gzip("/sitemap.xml", Some("page=2"), &headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, "gzip, br".parse().unwrap());
        assert!(wants_gzip("/sitemap.xml", None, &headers));
    }

    #[test]
    fn test_gzip_roundtrip() {
        let xml = urlset("<url><loc>https://example.com/a.html</loc></url>");
        let zipped = gzip_bytes(xml.as_bytes()).unwrap();
        let mut dec = flate2::read::GzDecoder::new(zipped.as_slice());
        let mut out = String::new();
        dec.read_to_string(&mut out).unwrap();
        assert_eq!(out, xml);
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a&b<c>"), "a&amp;b&lt;c&gt;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn test_curated_tags() {
        assert!(is_curated_tag("Cosplay"));
        assert!(is_curated_tag("台灣"));
        assert!(!is_curated_tag("totally-random-spam-tag"));
    }
}
