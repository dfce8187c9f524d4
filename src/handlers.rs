//! 页面与接口 handler
//! 列表/详情路由 + 三个 POST 接口；?ajax=1 时同样的数据直接出 JSON

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{MAX_SEARCH_LEN, PICS_PAGE_SIZE};
use crate::db::{alive_filter, ListPage};
use crate::error::AppError;
use crate::locale::{entry_desc, entry_title, Lang};
use crate::meta::{build_detail_seo, build_list_meta, default_meta, ListMetaInput, PageMeta};
use crate::models::RankSnapshot;
use crate::pagination::{page_range, PAGE_TPL};
use crate::render::{card_views, render_detail, render_gallery, DetailContext, GalleryContext};
use crate::AppState;

/// 旧 id 的合法形状 (非 ObjectId 的那一类)
static LEGACY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,64}$").expect("legacy id regex"));

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub ajax: Option<String>,
    pub site: Option<String>,
    pub search_query: Option<String>,
}

impl ListQuery {
    fn is_ajax(&self) -> bool {
        matches!(self.ajax.as_deref(), Some("1") | Some("true"))
    }
    fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }
}

fn lang_of(ext: Option<Extension<Lang>>) -> Lang {
    ext.map(|e| e.0).unwrap_or_default()
}

/// Mongo $regex 的字面量转义
pub fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '.' | '*' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 校验搜索词：空白修剪后超长直接 400，不碰数据库
pub fn validate_search_query(raw: &str) -> Result<String, AppError> {
    let q = raw.trim().to_string();
    if q.chars().count() > MAX_SEARCH_LEN {
        return Err(AppError::BadRequest("Bad Request".to_string()));
    }
    Ok(q)
}

/// 搜索过滤条件：title/title_cn/desc 任一命中；空词退化为全量，但存活过滤不掉
fn search_filter(query: &str) -> Document {
    let mut filter = alive_filter();
    if !query.is_empty() {
        let reg = escape_regex(query);
        filter.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": &reg, "$options": "i" } },
                doc! { "title_cn": { "$regex": &reg, "$options": "i" } },
                doc! { "desc": { "$regex": &reg, "$options": "i" } },
            ],
        );
    }
    filter
}

/// tag/cat 过滤条件，site 可叠加
fn keyword_filter(kind: &str, name: &str, site: &str) -> Document {
    let mut filter = alive_filter();
    filter.insert(kind, doc! { "$regex": escape_regex(name), "$options": "i" });
    if !site.is_empty() {
        filter.insert("site", site);
    }
    filter
}

/// 搜索翻页链接；空词走 query 形式，路径形式会出现空段 (/search//2) 打不中路由
fn search_prelink(lang: Lang, query: &str) -> String {
    if query.is_empty() {
        format!("{}/search?search_query=&page={}", lang.prefix(), PAGE_TPL)
    } else {
        format!(
            "{}/search/{}/{}",
            lang.prefix(),
            urlencoding::encode(query),
            PAGE_TPL
        )
    }
}

/// 列表响应：ajax 出 JSON，否则渲染画廊模板
fn respond_list(
    state: &AppState,
    lang: Lang,
    lp: ListPage,
    prelink: String,
    name: String,
    cur_site: String,
    meta: PageMeta,
    ajax: bool,
) -> Result<Response, AppError> {
    let range = page_range(lp.page, lp.total_pages, &prelink);
    if ajax {
        return Ok(Json(json!({
            "docs": lp.docs,
            "page": lp.page,
            "totalDocs": lp.total_docs,
            "totalPages": lp.total_pages,
            "range": range,
            "name": name,
        }))
        .into_response());
    }
    let ctx = GalleryContext {
        meta,
        site_name: state.cfg.site_name.clone(),
        lang_prefix: lang.prefix().to_string(),
        docs: card_views(&state.cfg, lang, &lp.docs),
        range,
        page: lp.page,
        total_pages: lp.total_pages,
        total_docs: lp.total_docs,
        name,
        cur_site,
        message: String::new(),
    };
    Ok(Html(render_gallery(&ctx)?).into_response())
}

// ---------- 列表路由 ----------

/// GET / 首页：最新
pub async fn home(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let lang = lang_of(lang);
    let lp = state
        .db
        .list_page(alive_filter(), doc! { "date": -1 }, q.page())
        .await?;
    let prelink = format!("{}/?page={}", lang.prefix(), PAGE_TPL);
    let meta = default_meta(&state.cfg, lang);
    respond_list(&state, lang, lp, prelink, String::new(), String::new(), meta, q.is_ajax())
}

/// GET /hot 热度排序
pub async fn hot(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    hot_inner(state, lang, None, q).await
}

pub async fn hot_page(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(page): Path<u64>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    hot_inner(state, lang, Some(page), q).await
}

async fn hot_inner(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    page: Option<u64>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let lang = lang_of(lang);
    let page = page.unwrap_or_else(|| q.page()).max(1);
    let lp = state
        .db
        .list_page(alive_filter(), doc! { "likes": -1 }, page)
        .await?;
    let prelink = format!("{}/hot/{}", lang.prefix(), PAGE_TPL);
    let meta = default_meta(&state.cfg, lang);
    respond_list(&state, lang, lp, prelink, String::new(), String::new(), meta, q.is_ajax())
}

/// GET /search[/{q}[/{page}]] 搜索，词也可走 ?search_query=
pub async fn search(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    let raw = q.search_query.clone().unwrap_or_default();
    search_inner(state, lang, raw, None, q).await
}

pub async fn search_q(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(raw): Path<String>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    search_inner(state, lang, raw, None, q).await
}

pub async fn search_q_page(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    Path((raw, page)): Path<(String, u64)>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    search_inner(state, lang, raw, Some(page), q).await
}

async fn search_inner(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    raw: String,
    page: Option<u64>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let lang = lang_of(lang);
    let raw = urlencoding::decode(&raw).map(|s| s.into_owned()).unwrap_or(raw);
    let query = validate_search_query(&raw)?;
    let page = page.unwrap_or_else(|| q.page()).max(1);

    let lp = state
        .db
        .list_page(search_filter(&query), doc! { "date": -1 }, page)
        .await?;
    let prelink = search_prelink(lang, &query);
    let meta = default_meta(&state.cfg, lang);
    respond_list(&state, lang, lp, prelink, query, String::new(), meta, q.is_ajax())
}

/// GET /tag/{name}[/{page}] 与 /cat/{name}[/{page}]
/// 两条路由只差过滤字段，site 参数可再叠加一层过滤
async fn keyword_list(
    state: AppState,
    lang: Lang,
    kind: &str,
    name: String,
    page: u64,
    q: ListQuery,
) -> Result<Response, AppError> {
    let name = urlencoding::decode(&name)
        .map(|s| s.into_owned())
        .unwrap_or(name)
        .trim()
        .to_string();
    if name.is_empty() {
        return Err(AppError::NotFound);
    }

    let cur_site = q.site.clone().unwrap_or_default();
    let filter = keyword_filter(kind, &name, &cur_site);

    let mut prelink = format!(
        "{}/{}/{}/{}",
        lang.prefix(),
        kind,
        urlencoding::encode(&name),
        PAGE_TPL
    );
    if !cur_site.is_empty() {
        prelink.push_str(&format!("?site={}", urlencoding::encode(&cur_site)));
    }

    let lp = state.db.list_page(filter, doc! { "date": -1 }, page).await?;
    let meta = build_list_meta(
        &state.cfg,
        &ListMetaInput {
            kind,
            name: &name,
            page: lp.page,
            total_pages: lp.total_pages,
            lang,
        },
    );
    respond_list(&state, lang, lp, prelink, name, cur_site, meta, q.is_ajax())
}

pub async fn tag(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(name): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let page = q.page();
    keyword_list(state, lang_of(lang), "tag", name, page, q).await
}

pub async fn tag_page(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Path((name, page)): Path<(String, u64)>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    keyword_list(state, lang_of(lang), "tag", name, page.max(1), q).await
}

pub async fn cat(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(name): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let page = q.page();
    keyword_list(state, lang_of(lang), "cat", name, page, q).await
}

pub async fn cat_page(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Path((name, page)): Path<(String, u64)>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    keyword_list(state, lang_of(lang), "cat", name, page.max(1), q).await
}

/// GET /genre[/{page}] 配置里钉死的 site 过滤
pub async fn genre(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    genre_inner(state, lang, None, q).await
}

pub async fn genre_page(
    state: State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(page): Path<u64>,
    q: Query<ListQuery>,
) -> Result<Response, AppError> {
    genre_inner(state, lang, Some(page), q).await
}

async fn genre_inner(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    page: Option<u64>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let lang = lang_of(lang);
    let page = page.unwrap_or_else(|| q.page()).max(1);
    let mut filter = alive_filter();
    filter.insert("site", &state.cfg.genre_site);
    let lp = state.db.list_page(filter, doc! { "date": -1 }, page).await?;
    let prelink = format!("{}/genre/{}", lang.prefix(), PAGE_TPL);
    let meta = default_meta(&state.cfg, lang);
    let cur_site = state.cfg.genre_site.clone();
    respond_list(&state, lang, lp, prelink, String::new(), cur_site, meta, q.is_ajax())
}

// ---------- 详情 ----------

/// id 形状判定：24 位十六进制走 _id，其余按旧 id 处理
pub enum IdShape {
    Oid(ObjectId),
    Legacy(String),
    Invalid,
}

pub fn classify_id(raw: &str) -> IdShape {
    let id = raw.trim().trim_end_matches(".html");
    if id.is_empty() {
        return IdShape::Invalid;
    }
    if let Ok(oid) = ObjectId::parse_str(id) {
        return IdShape::Oid(oid);
    }
    if LEGACY_ID_RE.is_match(id) {
        return IdShape::Legacy(id.to_string());
    }
    IdShape::Invalid
}

/// GET /{prefix}/{id}.html
/// 直查 -> 旧链接映射 -> 随机落点并原子记住，三段式兜底
pub async fn detail(
    State(state): State<AppState>,
    lang: Option<Extension<Lang>>,
    Path(raw): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Response, AppError> {
    let lang = lang_of(lang);

    let entry = match classify_id(&raw) {
        IdShape::Invalid => None,
        IdShape::Oid(oid) => state.db.find_by_oid(oid).await?,
        IdShape::Legacy(id) => state.db.find_by_legacy_id(&id).await?,
    };

    let entry = match entry {
        Some(e) => e,
        None => {
            let old_id = raw.trim().trim_end_matches(".html");
            if old_id.is_empty() || matches!(classify_id(&raw), IdShape::Invalid) {
                return Err(AppError::NotFound);
            }
            // 旧链接：映射过就跟着走，没映射过就现场选一条并记住
            let Some(new_id) = state.db.resolve_legacy(old_id).await? else {
                return Err(AppError::NotFound);
            };
            info!("[legacy] {} -> {}", old_id, new_id.to_hex());
            match state.db.find_by_oid(new_id).await? {
                Some(e) => e,
                None => return Err(AppError::NotFound),
            }
        }
    };

    let page = q.page();
    let total_pics = entry.pics.len();
    let total_pages = (total_pics.div_ceil(PICS_PAGE_SIZE)).max(1) as u64;
    let page = page.min(total_pages);
    let start = ((page - 1) as usize) * PICS_PAGE_SIZE;
    let cur_pics: Vec<String> = entry
        .pics
        .iter()
        .skip(start)
        .take(PICS_PAGE_SIZE)
        .cloned()
        .collect();

    let id_hex = entry
        .oid
        .map(|o| o.to_hex())
        .unwrap_or_else(|| entry.id.clone());
    let prelink = format!(
        "{}/{}/{}.html?page={}",
        lang.prefix(),
        state.cfg.detail_prefix,
        id_hex,
        PAGE_TPL
    );
    let range = page_range(page, total_pages, &prelink);

    let similar = state.db.sample_cards(doc! {}, 12).await?;
    let seo = build_detail_seo(&state.cfg, &entry, page, lang);

    if q.is_ajax() {
        return Ok(Json(json!({
            "video": entry,
            "curPics": cur_pics,
            "page": page,
            "totalPages": total_pages,
            "total": total_pics,
            "range": range,
            "similar": similar,
            "seo": seo,
        }))
        .into_response());
    }

    let meta = PageMeta {
        title: seo.title.clone(),
        keywords: seo.keywords.clone(),
        desc: seo.description.clone(),
        ..Default::default()
    };
    let ctx = DetailContext {
        meta,
        site_name: state.cfg.site_name.clone(),
        lang_prefix: lang.prefix().to_string(),
        title: entry_title(&entry, lang),
        desc: entry_desc(&entry, lang),
        site: entry.site.clone(),
        date: entry.date,
        likes: entry.likes,
        tag: entry.tag.clone(),
        source: entry.source.clone(),
        cur_pics,
        range,
        page,
        total_pages,
        total_pics,
        similar: card_views(&state.cfg, lang, &similar),
        seo,
    };
    Ok(Html(render_detail(&ctx)?).into_response())
}

// ---------- POST 接口 ----------

fn json_to_document(value: &Value) -> Result<Document, AppError> {
    mongodb::bson::to_document(value)
        .map_err(|e| AppError::BadRequest(format!("invalid body: {}", e)))
}

/// POST /users/resource 入库：(id, site) 键控 upsert
pub async fn resource_post(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    let mut obj = json_to_document(&payload)?;
    // _id 不许外部指定
    obj.remove("_id");
    let id_ok = obj.get_str("id").map(|s| !s.is_empty()).unwrap_or(false);
    let site_ok = obj.get_str("site").map(|s| !s.is_empty()).unwrap_or(false);
    if !id_ok || !site_ok {
        return Ok((
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "msg": "id 和 site 必填" })),
        )
            .into_response());
    }
    let doc = state.db.upsert_entry(obj).await?;
    Ok(Json(json!({ "ok": true, "data": doc })).into_response())
}

/// POST /users/isHave 与 /thumbzilla/checkData：按任意条件查重
pub async fn resource_find(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    let filter = json_to_document(&payload)?;
    if filter.is_empty() {
        return Err(AppError::BadRequest("empty filter".to_string()));
    }
    match state.db.find_one_raw(filter).await? {
        Some(doc) => Ok(Json(json!({ "code": 600, "msg": "已经存在", "data": doc })).into_response()),
        None => Ok(Json(json!({ "code": 200, "data": Value::Null })).into_response()),
    }
}

/// POST /rank/save 榜单快照，(site, day) 键控 upsert
pub async fn rank_save(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    let obj = json_to_document(&payload)?;
    let site = obj.get_str("site").unwrap_or_default().to_string();
    let list = obj
        .get_array("list")
        .map(|a| {
            a.iter()
                .filter_map(|b| b.as_document().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if site.is_empty() || list.is_empty() {
        return Ok((
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "msg": "site 和 list 必填" })),
        )
            .into_response());
    }
    let day = obj
        .get_str("day")
        .map(|s| s.to_string())
        .unwrap_or_else(|_| Utc::now().format("%Y-%m-%d").to_string());
    let snap = RankSnapshot { oid: None, site, day, list };
    state.db.save_rank(&snap).await?;
    Ok(Json(json!({ "ok": true })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("a.b*c"), r"a\.b\*c");
        assert_eq!(escape_regex("plain"), "plain");
        assert_eq!(escape_regex("(x|y)"), r"\(x\|y\)");
    }

    #[test]
    fn test_search_len_cap() {
        let ok = "a".repeat(60);
        assert!(validate_search_query(&ok).is_ok());
        let too_long = "a".repeat(61);
        assert!(matches!(
            validate_search_query(&too_long),
            Err(AppError::BadRequest(_))
        ));
        // 修剪后不超限则放行
        let padded = format!("  {}  ", "b".repeat(60));
        assert!(validate_search_query(&padded).is_ok());
    }

    #[test]
    fn test_read_filters_keep_disable_guard() {
        // 任何读路径的过滤条件都不许丢软删除过滤
        for f in [
            alive_filter(),
            search_filter(""),
            search_filter("cosplay"),
            keyword_filter("tag", "cosplay", ""),
            keyword_filter("cat", "寫真", "hanime"),
        ] {
            assert_eq!(f.get_document("disable").unwrap(), &doc! { "$ne": 1 });
        }
        // 空搜索词不产生 $or，带词才有
        assert!(search_filter("").get("$or").is_none());
        assert!(search_filter("x").get("$or").is_some());
        assert_eq!(
            keyword_filter("tag", "t", "hanime").get_str("site").unwrap(),
            "hanime"
        );
    }

    #[test]
    fn test_search_prelink_empty_term() {
        // 空词不能生成 /search//pageTpl 这种带空段的路径
        assert_eq!(
            search_prelink(Lang::Tw, ""),
            "/search?search_query=&page=pageTpl"
        );
        assert_eq!(
            search_prelink(Lang::Cn, ""),
            "/zh-CN/search?search_query=&page=pageTpl"
        );
        assert_eq!(search_prelink(Lang::Tw, "abc"), "/search/abc/pageTpl");
    }

    #[test]
    fn test_classify_id() {
        assert!(matches!(
            classify_id("64b1f0a2465cf16541775abc.html"),
            IdShape::Oid(_)
        ));
        assert!(matches!(
            classify_id("some_legacy-id01"),
            IdShape::Legacy(_)
        ));
        // 太短 / 带奇怪字符都判非法
        assert!(matches!(classify_id("ab"), IdShape::Invalid));
        assert!(matches!(classify_id("../etc/passwd"), IdShape::Invalid));
        assert!(matches!(classify_id(""), IdShape::Invalid));
    }

    #[test]
    fn test_legacy_strip_html_suffix() {
        match classify_id("abcdef123456.html") {
            IdShape::Legacy(id) => assert_eq!(id, "abcdef123456"),
            _ => panic!("expected legacy id"),
        }
    }
}
