//! SEO 文案
//! 列表页 meta 与详情页 seo 块；文案按 locale 取，站点名来自配置

use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::locale::{entry_title, Lang};
use crate::models::MediaEntry;

/// 列表 meta 判定为垃圾页的关键词长度上限
const MAX_KW_LEN: usize = 40;
/// 超过这个页数的深分页一律 noindex
const MAX_INDEX_PAGE: u64 = 200;

#[derive(Debug, Clone, Serialize, Default)]
pub struct PageMeta {
    pub title: String,
    pub keywords: String,
    pub desc: String,
    pub canonical: String,
    pub prev: String,
    pub next: String,
    pub robots: String,
}

/// 站点级默认 meta (首页 / hot / genre / 搜索)
pub fn default_meta(cfg: &Config, lang: Lang) -> PageMeta {
    let desc = match lang {
        Lang::Tw => format!("{} 每日更新的高清圖庫與影片合集，支援分頁瀏覽與站內搜尋。", cfg.site_name),
        Lang::Cn => format!("{} 每日更新的高清图库与视频合集，支持分页浏览与站内搜索。", cfg.site_name),
    };
    PageMeta {
        title: format!("{} – Free Model Gallery & Videos", cfg.site_name),
        keywords: format!("gallery, photos, videos, {}", cfg.site_name),
        desc,
        ..Default::default()
    }
}

/// tag / cat 列表页 meta
pub struct ListMetaInput<'a> {
    pub kind: &'a str, // "tag" | "cat"
    pub name: &'a str,
    pub page: u64,
    pub total_pages: u64,
    pub lang: Lang,
}

pub fn build_list_meta(cfg: &Config, input: &ListMetaInput<'_>) -> PageMeta {
    let kw = input.name.split_whitespace().collect::<Vec<_>>().join(" ");
    let bad_kw = kw.is_empty() || kw.chars().count() > MAX_KW_LEN;
    let bad_page = input.page < 1
        || input.page > input.total_pages.max(1)
        || input.page > MAX_INDEX_PAGE;

    let type_label = match (input.kind, input.lang) {
        ("tag", Lang::Tw) => "相關影片",
        ("tag", Lang::Cn) => "相关视频",
        (_, Lang::Tw) => "分類影片",
        (_, Lang::Cn) => "分类视频",
    };

    let title = if input.page > 1 {
        match input.lang {
            Lang::Tw => format!("{}{} - 第{}頁 - {}", kw, type_label, input.page, cfg.site_name),
            Lang::Cn => format!("{}{} - 第{}页 - {}", kw, type_label, input.page, cfg.site_name),
        }
    } else {
        format!("{}{} - {}", kw, type_label, cfg.site_name)
    };

    let desc_base = match (input.kind, input.lang) {
        ("tag", Lang::Tw) => format!("收錄{}相關影片，包含最新更新與熱門推薦，支援線上播放與分頁瀏覽。", kw),
        ("tag", Lang::Cn) => format!("收录{}相关视频，包含最新更新与热门推荐，支持在线播放与分页浏览。", kw),
        (_, Lang::Tw) => format!("收錄{}分類影片合集，依更新時間與熱門程度瀏覽，支援分頁與篩選。", kw),
        (_, Lang::Cn) => format!("收录{}分类视频合集，按更新时间与热门程度浏览，支持分页与筛选。", kw),
    };
    let desc = if input.page > 1 {
        match input.lang {
            Lang::Tw => format!("{}（第{}頁）", desc_base, input.page),
            Lang::Cn => format!("{}（第{}页）", desc_base, input.page),
        }
    } else {
        desc_base
    };

    let base_path = format!(
        "{}/{}/{}/",
        input.lang.prefix(),
        input.kind,
        urlencoding::encode(&kw)
    );
    let page_path = if input.page > 1 {
        format!("{}{}", base_path, input.page)
    } else {
        base_path.clone()
    };
    let prev = match input.page {
        0 | 1 => String::new(),
        2 => format!("{}{}", cfg.site_url, base_path),
        p => format!("{}{}{}", cfg.site_url, base_path, p - 1),
    };
    let next = if input.page < input.total_pages {
        format!("{}{}{}", cfg.site_url, base_path, input.page + 1)
    } else {
        String::new()
    };

    // 垃圾关键词 / 越界分页 / 空结果一律 noindex
    let robots = if bad_kw || bad_page || input.total_pages == 0 {
        "noindex,follow,noarchive"
    } else {
        "index,follow,noarchive"
    };

    PageMeta {
        title,
        keywords: format!("{},{},{}", kw, input.kind, cfg.site_name),
        desc,
        canonical: format!("{}{}", cfg.site_url, page_path),
        prev,
        next,
        robots: robots.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DetailSeo {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub longtail_text: String,
    pub json_ld: String,
}

/// 详情页 SEO 块：主名 + 别名拼展示名，图片列表出 JSON-LD
pub fn build_detail_seo(cfg: &Config, entry: &MediaEntry, page: u64, lang: Lang) -> DetailSeo {
    let name = entry_title(entry, lang).trim().to_string();
    let else_names: Vec<String> = entry
        .else_name
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();

    let display_name = if else_names.is_empty() {
        name.clone()
    } else {
        format!("{} / {}", name, else_names.join(" "))
    };

    let title = if page > 1 {
        format!(
            "{} Photos & Videos Gallery – {} – Page {}",
            display_name, cfg.site_name, page
        )
    } else {
        format!("{} Photos & Videos Gallery – {}", display_name, cfg.site_name)
    };

    let description = format!(
        "{} photo and video gallery on {}. Browse curated images and clips, updated regularly with new posts and highlights.",
        display_name, cfg.site_name
    );

    let mut keywords: Vec<String> = vec![name.clone()];
    keywords.extend(else_names.iter().cloned());
    keywords.extend(["photos", "videos", "gallery"].map(String::from));
    let keywords = keywords
        .into_iter()
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let mut longtail: Vec<String> = Vec::new();
    if !name.is_empty() {
        longtail.push(format!("{} photos", name));
        longtail.push(format!("{} videos", name));
        longtail.push(format!("{} photo gallery", name));
    }
    for e in &else_names {
        longtail.push(format!("{} photos", e));
        longtail.push(format!("{} videos", e));
    }

    let json_ld = json!({
        "@context": "https://schema.org",
        "@type": "ItemList",
        "itemListElement": entry.pics.iter().take(20).enumerate().map(|(i, pic)| json!({
            "@type": "ImageObject",
            "position": i + 1,
            "contentUrl": format!("{}{}", entry.source, pic),
        })).collect::<Vec<_>>(),
    });

    DetailSeo {
        title,
        description,
        keywords,
        longtail_text: longtail.join(", "),
        json_ld: json_ld.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        let mut cfg = Config::from_env();
        cfg.site_name = "PicGaze".to_string();
        cfg.site_url = "https://picgaze.com".to_string();
        cfg
    }

    #[test]
    fn test_list_meta_page_one() {
        let meta = build_list_meta(
            &cfg(),
            &ListMetaInput { kind: "tag", name: "自拍", page: 1, total_pages: 5, lang: Lang::Tw },
        );
        assert_eq!(meta.title, "自拍相關影片 - PicGaze");
        assert!(meta.prev.is_empty());
        assert!(meta.next.ends_with("/tag/%E8%87%AA%E6%8B%8D/2"));
        assert_eq!(meta.robots, "index,follow,noarchive");
    }

    #[test]
    fn test_list_meta_deep_page_noindex() {
        let meta = build_list_meta(
            &cfg(),
            &ListMetaInput { kind: "cat", name: "x", page: 500, total_pages: 1000, lang: Lang::Tw },
        );
        assert_eq!(meta.robots, "noindex,follow,noarchive");
    }

    #[test]
    fn test_detail_seo_alt_names() {
        let entry = MediaEntry {
            title: "Alice".to_string(),
            else_name: vec!["A-chan".to_string()],
            pics: vec!["/a.jpg".to_string()],
            source: "https://cdn.example.com".to_string(),
            ..Default::default()
        };
        let seo = build_detail_seo(&cfg(), &entry, 1, Lang::Tw);
        assert!(seo.title.starts_with("Alice / A-chan"));
        assert!(seo.json_ld.contains("https://cdn.example.com/a.jpg"));
        assert!(seo.longtail_text.contains("A-chan photos"));
    }
}
