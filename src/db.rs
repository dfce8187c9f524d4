//! Mongo 访问层
//! 启动时指数退避重连；所有读路径统一过滤 disable=1

use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::{Config, PAGE_SIZE};
use crate::models::{EntryCard, LegacyUrlMapping, MediaEntry, RankSnapshot};

/// 启动阶段 server selection 超时
const SERVER_SELECTION_TIMEOUT_SECS: u64 = 8;
/// 重连退避上限
const MAX_BACKOFF_MS: u64 = 30_000;

/// 读路径通用过滤：软删除不可见
pub fn alive_filter() -> Document {
    doc! { "disable": { "$ne": 1 } }
}

/// 翻页偏移；页码是外部输入，再大也不回绕
fn skip_of(page: u64) -> u64 {
    (page.max(1) - 1).saturating_mul(PAGE_SIZE as u64)
}

#[derive(Clone)]
pub struct Db {
    pub media: Collection<MediaEntry>,
    pub old_url_map: Collection<LegacyUrlMapping>,
    pub rank_snapshots: Collection<RankSnapshot>,
}

/// 一页查询结果
#[derive(Debug, Clone)]
pub struct ListPage {
    pub docs: Vec<EntryCard>,
    pub total_docs: u64,
    pub total_pages: u64,
    pub page: u64,
}

#[derive(Debug, Deserialize)]
pub struct IdDate {
    #[serde(rename = "_id")]
    pub oid: ObjectId,
    #[serde(default)]
    pub date: i64,
}

/// 带退避的连接：1s,2s,4s... 封顶 30s，成功前不绑定端口
pub async fn connect_with_backoff(cfg: &Config) -> anyhow::Result<Db> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match try_connect(&cfg.mongo_uri).await {
            Ok(db) => {
                info!("[mongo] connected (attempt {})", attempt);
                return Ok(db);
            }
            Err(e) => {
                let wait = MAX_BACKOFF_MS.min(1000u64.saturating_mul(1u64 << attempt.min(5)));
                error!(
                    "[mongo] connect failed (attempt {}): {}. retry in {}ms",
                    attempt, e, wait
                );
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
        }
    }
}

async fn try_connect(uri: &str) -> anyhow::Result<Db> {
    let mut opts = ClientOptions::parse(uri).await?;
    opts.server_selection_timeout = Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));
    let client = Client::with_options(opts)?;

    let database: Database = client
        .default_database()
        .unwrap_or_else(|| client.database("media_gallery"));
    // 先 ping 一下，确认可用再返回
    database.run_command(doc! { "ping": 1 }).await?;

    let db = Db {
        media: database.collection("media"),
        old_url_map: database.collection("old_url_map"),
        rank_snapshots: database.collection("rank_snapshots"),
    };
    if let Err(e) = db.ensure_indexes().await {
        // 索引失败不拦启动，线上集合通常已有索引
        warn!("[mongo] ensure indexes failed: {}", e);
    }
    Ok(db)
}

impl Db {
    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let media_keys = [
            doc! { "date": -1 },
            doc! { "site": -1 },
            doc! { "id": -1, "site": -1 },
            doc! { "tag": -1 },
            doc! { "cat": -1 },
            doc! { "likes": -1 },
            doc! { "disable": -1 },
        ];
        for keys in media_keys {
            self.media
                .create_index(IndexModel::builder().keys(keys).build())
                .await?;
        }
        // old_id 唯一索引是 upsert-once 语义的根基
        self.old_url_map
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "old_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.rank_snapshots
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "site": 1, "day": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        Ok(())
    }

    /// 列表分页查询，固定每页 40 条，卡片投影
    pub async fn list_page(
        &self,
        filter: Document,
        sort: Document,
        page: u64,
    ) -> mongodb::error::Result<ListPage> {
        let page = page.max(1);
        let total_docs = self.media.count_documents(filter.clone()).await?;
        let total_pages = (total_docs.div_ceil(PAGE_SIZE as u64)).max(1);

        let cursor = self
            .media
            .clone_with_type::<EntryCard>()
            .find(filter)
            .projection(EntryCard::projection())
            .sort(sort)
            .skip(skip_of(page))
            .limit(PAGE_SIZE)
            .await?;
        let docs: Vec<EntryCard> = cursor.try_collect().await?;

        Ok(ListPage {
            docs,
            total_docs,
            total_pages,
            page,
        })
    }

    /// 详情：按 ObjectId 查，disable=1 视为不存在
    pub async fn find_by_oid(&self, oid: ObjectId) -> mongodb::error::Result<Option<MediaEntry>> {
        let mut filter = alive_filter();
        filter.insert("_id", oid);
        self.media.find_one(filter).await
    }

    /// 详情：按源站业务 id 查
    pub async fn find_by_legacy_id(&self, id: &str) -> mongodb::error::Result<Option<MediaEntry>> {
        let mut filter = alive_filter();
        filter.insert("id", id);
        self.media.find_one(filter).await
    }

    /// $sample 随机抽卡片，match_extra 合并进 alive 过滤
    pub async fn sample_cards(
        &self,
        match_extra: Document,
        size: i64,
    ) -> mongodb::error::Result<Vec<EntryCard>> {
        let mut m = alive_filter();
        m.extend(match_extra);
        let pipeline = vec![
            doc! { "$match": m },
            doc! { "$sample": { "size": size } },
            doc! { "$project": EntryCard::projection() },
        ];
        let cursor = self.media.aggregate(pipeline).with_type::<EntryCard>().await?;
        cursor.try_collect().await
    }

    /// 随机抽一条可见条目的 _id，作为旧链接映射的落点
    async fn sample_one_oid(&self) -> mongodb::error::Result<Option<ObjectId>> {
        let pipeline = vec![
            doc! { "$match": alive_filter() },
            doc! { "$sample": { "size": 1 } },
            doc! { "$project": { "_id": 1 } },
        ];
        let mut cursor = self.media.aggregate(pipeline).await?;
        if let Some(d) = cursor.try_next().await? {
            return Ok(d.get_object_id("_id").ok());
        }
        Ok(None)
    }

    /// 旧 id 解析：查映射；没有就随机选一条并原子 upsert。
    /// $setOnInsert + old_id 唯一索引保证并发首查收敛到同一个落点，
    /// 撞唯一索引 (两个并发 upsert 同时走 insert 分支) 时重读一次即可。
    pub async fn resolve_legacy(&self, old_id: &str) -> mongodb::error::Result<Option<ObjectId>> {
        if let Some(m) = self.old_url_map.find_one(doc! { "old_id": old_id }).await? {
            return Ok(Some(m.new_id));
        }
        let Some(target) = self.sample_one_oid().await? else {
            return Ok(None); // 空库
        };
        let upserted = self
            .old_url_map
            .find_one_and_update(
                doc! { "old_id": old_id },
                doc! { "$setOnInsert": { "old_id": old_id, "new_id": target } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;
        match upserted {
            Ok(m) => Ok(m.map(|m| m.new_id)),
            Err(e) => {
                // E11000：对手方先插入成功，映射已经存在
                warn!("[legacy] upsert race for {}: {}", old_id, e);
                Ok(self
                    .old_url_map
                    .find_one(doc! { "old_id": old_id })
                    .await?
                    .map(|m| m.new_id))
            }
        }
    }

    /// (id, site) 键控 upsert，返回更新后的文档
    pub async fn upsert_entry(&self, obj: Document) -> mongodb::error::Result<Option<MediaEntry>> {
        let id = obj.get_str("id").unwrap_or_default().to_string();
        let site = obj.get_str("site").unwrap_or_default().to_string();
        self.media
            .clone_with_type::<Document>()
            .find_one_and_update(doc! { "id": &id, "site": &site }, doc! { "$set": obj })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map(|d| d.and_then(|d| mongodb::bson::from_document(d).ok()))
    }

    /// 任意条件的存在性检查 (POST isHave/checkData)
    pub async fn find_one_raw(&self, filter: Document) -> mongodb::error::Result<Option<Document>> {
        self.media.clone_with_type::<Document>().find_one(filter).await
    }

    /// 榜单快照，(site, day) 键控 upsert，重复写无害
    pub async fn save_rank(&self, snap: &RankSnapshot) -> mongodb::error::Result<()> {
        self.rank_snapshots
            .clone_with_type::<Document>()
            .update_one(
                doc! { "site": &snap.site, "day": &snap.day },
                doc! { "$set": {
                    "site": &snap.site,
                    "day": &snap.day,
                    "list": snap.list.clone(),
                } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// sitemap 用：最新 n 条 (_id, date)，可 skip 作为补位池
    pub async fn recent_id_dates(
        &self,
        skip: u64,
        limit: i64,
    ) -> mongodb::error::Result<Vec<IdDate>> {
        let cursor = self
            .media
            .clone_with_type::<IdDate>()
            .find(alive_filter())
            .projection(doc! { "_id": 1, "date": 1 })
            .sort(doc! { "date": -1 })
            .skip(skip)
            .limit(limit)
            .await?;
        cursor.try_collect().await
    }

    /// sitemap 用：全库随机抽 n 条 (_id, date)
    pub async fn sample_id_dates(&self, size: i64) -> mongodb::error::Result<Vec<IdDate>> {
        let pipeline = vec![
            doc! { "$match": alive_filter() },
            doc! { "$sample": { "size": size } },
            doc! { "$project": { "_id": 1, "date": 1 } },
        ];
        let cursor = self.media.aggregate(pipeline).with_type::<IdDate>().await?;
        cursor.try_collect().await
    }

    /// 去重后的 tag / cat 值
    pub async fn distinct_values(&self, field: &str) -> mongodb::error::Result<Vec<String>> {
        let values = self.media.distinct(field, alive_filter()).await?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.trim().is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_filter_shape() {
        assert_eq!(alive_filter(), doc! { "disable": { "$ne": 1 } });
    }

    #[test]
    fn test_skip_no_overflow() {
        assert_eq!(skip_of(0), 0);
        assert_eq!(skip_of(1), 0);
        assert_eq!(skip_of(3), 2 * PAGE_SIZE as u64);
        // 超大页码饱和而不是回绕成小偏移
        assert_eq!(skip_of(u64::MAX), u64::MAX);
    }
}
