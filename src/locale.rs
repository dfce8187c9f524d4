//! 双语 (繁体/简体) 处理
//! 文档两套字段都存；按路由前缀 (/zh-CN) 选字段，缺哪套就退回另一套

use crate::models::{EntryCard, MediaEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    /// 繁体，默认
    #[default]
    Tw,
    /// 简体，/zh-CN 镜像
    Cn,
}

impl Lang {
    /// 路由前缀，生成镜像链接用
    pub fn prefix(self) -> &'static str {
        match self {
            Lang::Tw => "",
            Lang::Cn => "/zh-CN",
        }
    }
}

fn pick<'a>(primary: &'a str, secondary: &'a str) -> &'a str {
    if primary.trim().is_empty() {
        secondary
    } else {
        primary
    }
}

pub fn card_title(card: &EntryCard, lang: Lang) -> String {
    match lang {
        Lang::Tw => pick(&card.title, &card.title_cn),
        Lang::Cn => pick(&card.title_cn, &card.title),
    }
    .to_string()
}

pub fn entry_title(entry: &MediaEntry, lang: Lang) -> String {
    match lang {
        Lang::Tw => pick(&entry.title, &entry.title_cn),
        Lang::Cn => pick(&entry.title_cn, &entry.title),
    }
    .to_string()
}

pub fn entry_desc(entry: &MediaEntry, lang: Lang) -> String {
    match lang {
        Lang::Tw => pick(&entry.desc, &entry.desc_cn),
        Lang::Cn => pick(&entry.desc_cn, &entry.desc),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_falls_back() {
        let card = EntryCard {
            title: "繁體標題".to_string(),
            title_cn: String::new(),
            ..Default::default()
        };
        // 简体缺失时退回繁体
        assert_eq!(card_title(&card, Lang::Cn), "繁體標題");
        assert_eq!(card_title(&card, Lang::Tw), "繁體標題");
    }

    #[test]
    fn test_both_present() {
        let card = EntryCard {
            title: "繁體".to_string(),
            title_cn: "简体".to_string(),
            ..Default::default()
        };
        assert_eq!(card_title(&card, Lang::Tw), "繁體");
        assert_eq!(card_title(&card, Lang::Cn), "简体");
    }

    #[test]
    fn test_prefix() {
        assert_eq!(Lang::Tw.prefix(), "");
        assert_eq!(Lang::Cn.prefix(), "/zh-CN");
    }
}
