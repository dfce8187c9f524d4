//! 分页链接
//! 当前页 + 前后各 3 页 + 首尾页，去重；href 用 pageTpl 占位符替换

use serde::Serialize;

/// 链接模板里的页码占位符
pub const PAGE_TPL: &str = "pageTpl";
/// 当前页前后各展示的页数
const NEIGHBOR_SIZE: u64 = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageLink {
    pub href: String,
    pub text: u64,
    pub class: Option<String>,
}

fn make_href(prelink: &str, num: u64) -> String {
    if prelink.is_empty() {
        String::new()
    } else {
        prelink.replace(PAGE_TPL, &num.to_string())
    }
}

/// 生成页码条。保证 1、尾页、当前页各出现一次
pub fn page_range(page: u64, total_pages: u64, prelink: &str) -> Vec<PageLink> {
    let total_pages = total_pages.max(1);
    // 路径里的页码是任意 u64，先夹进合法区间再做邻页运算
    let page = page.max(1).min(total_pages);

    let mut range = vec![PageLink {
        href: String::new(),
        text: page,
        class: Some("active".to_string()),
    }];

    // 右侧
    for num in page.saturating_add(1)..=page.saturating_add(NEIGHBOR_SIZE).min(total_pages) {
        range.push(PageLink {
            href: make_href(prelink, num),
            text: num,
            class: None,
        });
    }

    // 左侧
    let mut left = Vec::new();
    for num in page.saturating_sub(NEIGHBOR_SIZE).max(1)..page {
        left.push(PageLink {
            href: make_href(prelink, num),
            text: num,
            class: None,
        });
    }
    left.extend(range);
    let mut range = left;

    // 补尾页 / 首页
    if !range.iter().any(|l| l.text == total_pages) {
        range.push(PageLink {
            href: make_href(prelink, total_pages),
            text: total_pages,
            class: None,
        });
    }
    if !range.iter().any(|l| l.text == 1) {
        range.insert(
            0,
            PageLink {
                href: make_href(prelink, 1),
                text: 1,
                class: None,
            },
        );
    }

    // 去重 (page=1 或 page=尾页时会重复)
    let mut seen = std::collections::HashSet::new();
    range.retain(|l| seen.insert(l.text));
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(range: &[PageLink]) -> Vec<u64> {
        range.iter().map(|l| l.text).collect()
    }

    #[test]
    fn test_middle_page() {
        let range = page_range(10, 20, "/tag/x/pageTpl");
        let t = texts(&range);
        assert_eq!(t, vec![1, 7, 8, 9, 10, 11, 12, 13, 20]);
        // 当前页标记 active 且 href 为空
        let cur = range.iter().find(|l| l.text == 10).unwrap();
        assert_eq!(cur.class.as_deref(), Some("active"));
        assert!(cur.href.is_empty());
        assert_eq!(range.iter().find(|l| l.text == 7).unwrap().href, "/tag/x/7");
    }

    #[test]
    fn test_first_last_current_exactly_once() {
        for (page, total) in [(1, 1), (1, 2), (2, 2), (1, 100), (100, 100), (4, 5), (50, 100)] {
            let t = texts(&page_range(page, total, "/p/pageTpl"));
            assert_eq!(t.iter().filter(|&&x| x == 1).count(), 1, "page={page} total={total}");
            assert_eq!(t.iter().filter(|&&x| x == total).count(), 1);
            assert_eq!(t.iter().filter(|&&x| x == page).count(), 1);
            // 去重后整体无重复
            let mut sorted = t.clone();
            sorted.dedup();
            assert_eq!(sorted.len(), t.len());
        }
    }

    #[test]
    fn test_single_page() {
        let range = page_range(1, 1, "");
        assert_eq!(texts(&range), vec![1]);
    }

    #[test]
    fn test_out_of_range_page_clamped() {
        // 页码再离谱也不能把进程带崩，夹到尾页
        let range = page_range(u64::MAX, 5, "/hot/pageTpl");
        assert_eq!(texts(&range), vec![1, 2, 3, 4, 5]);
        let cur = range.iter().find(|l| l.class.is_some()).unwrap();
        assert_eq!(cur.text, 5);

        let range = page_range(0, 3, "/hot/pageTpl");
        assert_eq!(range.iter().find(|l| l.class.is_some()).unwrap().text, 1);
    }

    #[test]
    fn test_href_substitution() {
        let range = page_range(2, 3, "/hot/pageTpl");
        assert_eq!(range.iter().find(|l| l.text == 3).unwrap().href, "/hot/3");
    }
}
