//! 数据模型
//! 单一 media 集合 + 旧链接映射表 + 榜单快照，字段与线上集合保持一致

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

/// 一条媒体记录 (视频/图集)
/// title/desc 为繁体字段，title_cn/desc_cn 为简体字段，按请求 locale 选用
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_cn: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub desc_cn: String,
    /// 来源站标签 (一个库喂多个站点)
    #[serde(default)]
    pub site: String,
    /// 封面图
    #[serde(default)]
    pub img: String,
    /// 源站业务 id，(id, site) 做 upsert 键
    #[serde(default)]
    pub id: String,
    /// 图片 URL 前缀
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    /// 图片路径数组，detail 页分页展示
    #[serde(default)]
    pub pics: Vec<String>,
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default)]
    pub cat: Vec<String>,
    #[serde(default)]
    pub actor: Vec<String>,
    /// 别名，用于 SEO 长尾 (历史数据里叫 elseName)
    #[serde(default, alias = "elseName")]
    pub else_name: Vec<String>,
    /// 毫秒时间戳
    #[serde(default)]
    pub date: i64,
    /// 热度计数，/hot 排序键
    #[serde(default)]
    pub likes: i64,
    /// 1 = 软删除，任何读路径都不可见
    #[serde(default)]
    pub disable: i32,
    /// 旧站遗留路径
    #[serde(default)]
    pub path: String,
}

/// 列表页卡片投影，只取渲染需要的字段
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryCard {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_cn: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default)]
    pub cat: Vec<String>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub source: String,
}

impl EntryCard {
    /// 卡片字段投影
    pub fn projection() -> Document {
        doc! {
            "title": 1, "title_cn": 1, "img": 1, "url": 1, "site": 1,
            "tag": 1, "cat": 1, "date": 1, "id": 1, "path": 1,
            "likes": 1, "source": 1,
        }
    }
}

/// 旧 id -> 现行 ObjectId 的重定向映射
/// old_id 唯一索引 + upsert 保证同一个旧 id 只会有一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyUrlMapping {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,
    pub old_id: String,
    pub new_id: ObjectId,
}

/// 榜单快照，(site, day) 做 upsert 键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSnapshot {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,
    pub site: String,
    /// YYYY-MM-DD
    pub day: String,
    #[serde(default)]
    pub list: Vec<Document>,
}
