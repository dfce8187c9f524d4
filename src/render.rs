//! 模板渲染
//! 全局 Tera 实例 + 列表/详情两个视图的上下文组装

use once_cell::sync::Lazy;
use serde::Serialize;
use tera::Tera;

use crate::config::Config;
use crate::locale::{card_title, Lang};
use crate::meta::{DetailSeo, PageMeta};
use crate::models::EntryCard;
use crate::pagination::PageLink;

pub static TERA: Lazy<Tera> = Lazy::new(|| {
    Tera::new("templates/**/*.html").expect("Failed to load templates")
});

/// 列表卡片视图：locale 已选定，链接已拼好
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub href: String,
    pub title: String,
    pub img: String,
    pub site: String,
    pub date: i64,
    pub tag: Vec<String>,
}

pub fn card_views(cfg: &Config, lang: Lang, cards: &[EntryCard]) -> Vec<CardView> {
    cards
        .iter()
        .map(|c| {
            let id = c
                .oid
                .map(|o| o.to_hex())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| c.id.clone());
            CardView {
                href: format!("{}/{}/{}.html", lang.prefix(), cfg.detail_prefix, id),
                title: card_title(c, lang),
                img: c.img.clone(),
                site: c.site.clone(),
                date: c.date,
                tag: c.tag.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct GalleryContext {
    pub meta: PageMeta,
    pub site_name: String,
    pub lang_prefix: String,
    pub docs: Vec<CardView>,
    pub range: Vec<PageLink>,
    pub page: u64,
    pub total_pages: u64,
    pub total_docs: u64,
    /// 搜索词 / tag 名，模板回显用
    pub name: String,
    pub cur_site: String,
    pub message: String,
}

pub fn render_gallery(ctx: &GalleryContext) -> Result<String, tera::Error> {
    let context = tera::Context::from_serialize(ctx)?;
    TERA.render("gallery.html", &context)
}

#[derive(Debug, Serialize)]
pub struct DetailContext {
    pub meta: PageMeta,
    pub seo: DetailSeo,
    pub site_name: String,
    pub lang_prefix: String,
    pub title: String,
    pub desc: String,
    pub site: String,
    pub date: i64,
    pub likes: i64,
    pub tag: Vec<String>,
    pub source: String,
    /// 当前页图片
    pub cur_pics: Vec<String>,
    pub range: Vec<PageLink>,
    pub page: u64,
    pub total_pages: u64,
    pub total_pics: usize,
    pub similar: Vec<CardView>,
}

pub fn render_detail(ctx: &DetailContext) -> Result<String, tera::Error> {
    let context = tera::Context::from_serialize(ctx)?;
    TERA.render("detail.html", &context)
}
