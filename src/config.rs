//! 运行配置
//! 全部来自环境变量，带硬编码默认值；站点身份/SEO 文案都走配置，不写死在路由里

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 4350;
/// 默认监听地址 (一般挂在 Nginx/Cloudflare 后面)
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// 默认 Mongo 连接串
pub const DEFAULT_MONGO_URI: &str = "mongodb://127.0.0.1:27017/media_gallery";
/// 列表页固定每页条数
pub const PAGE_SIZE: i64 = 40;
/// 详情页图片分页条数
pub const PICS_PAGE_SIZE: usize = 20;
/// 搜索词长度上限，超过直接 400 (防 regex 滥用)
pub const MAX_SEARCH_LEN: usize = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    /// 对外站点地址，用于 canonical / sitemap 绝对链接
    pub site_url: String,
    pub site_name: String,
    /// 详情页 URL 前缀，例如 javs -> /javs/{id}.html
    pub detail_prefix: String,
    /// /genre 路由固定过滤的 site 标签
    pub genre_site: String,
    /// sitemap 最新条目数量
    pub sitemap_recent: usize,
    /// sitemap 随机补充条目数量
    pub sitemap_random: usize,
    /// tag sitemap 输出上限
    pub sitemap_tag_max: usize,
    /// sitemap 进程内缓存 TTL (秒)
    pub sitemap_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_str("HOST", DEFAULT_HOST),
            port: env_parse("PORT", DEFAULT_PORT),
            mongo_uri: env_str("MONGO_URI", DEFAULT_MONGO_URI),
            site_url: env_str("SITE_URL", "https://picgaze.com")
                .trim_end_matches('/')
                .to_string(),
            site_name: env_str("SITE_NAME", "PicGaze"),
            detail_prefix: env_str("DETAIL_PREFIX", "javs"),
            genre_site: env_str("GENRE_SITE", "hanime"),
            sitemap_recent: env_parse("SITEMAP_RECENT", 5000),
            sitemap_random: env_parse("SITEMAP_RANDOM", 2000),
            sitemap_tag_max: env_parse("SITEMAP_TAG_MAX", 500),
            sitemap_ttl_secs: env_parse("SITEMAP_TTL_SECS", 600),
        }
    }

    /// 详情页绝对地址
    pub fn detail_url(&self, id: &str) -> String {
        format!("{}/{}/{}.html", self.site_url, self.detail_prefix, id)
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // 不依赖进程环境的键，确保默认值生效
        assert_eq!(env_str("__MG_NO_SUCH_KEY__", "fallback"), "fallback");
        assert_eq!(env_parse::<u16>("__MG_NO_SUCH_KEY__", 4350), 4350);
    }

    #[test]
    fn test_detail_url() {
        let mut cfg = Config::from_env();
        cfg.site_url = "https://example.com".to_string();
        cfg.detail_prefix = "javs".to_string();
        assert_eq!(
            cfg.detail_url("64b000000000000000000000"),
            "https://example.com/javs/64b000000000000000000000.html"
        );
    }
}
