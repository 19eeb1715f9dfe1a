//! Side table mapping dense node ids to external page ids and titles.

use basin_common::{NodeId, PageId};
use hashbrown::HashMap;
use smol_str::SmolStr;

/// Bijection `NodeId ↔ page_id` plus titles, held outside the kernels so the
/// hot arrays stay flat and title strings are touched only at I/O boundaries.
#[derive(Debug)]
pub struct NodeTable {
    /// Ascending page ids; index = NodeId.
    page_ids: Vec<i64>,
    titles: Vec<SmolStr>,
    by_page: HashMap<i64, u32>,
}

impl NodeTable {
    /// Build from `(page_id, title)` pairs already sorted ascending by page id.
    pub fn new(pairs: Vec<(i64, SmolStr)>) -> Self {
        let mut page_ids = Vec::with_capacity(pairs.len());
        let mut titles = Vec::with_capacity(pairs.len());
        let mut by_page = HashMap::with_capacity(pairs.len());
        for (node, (page_id, title)) in pairs.into_iter().enumerate() {
            by_page.insert(page_id, node as u32);
            page_ids.push(page_id);
            titles.push(title);
        }
        Self {
            page_ids,
            titles,
            by_page,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.page_ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_ids.is_empty()
    }

    #[inline]
    pub fn node_for_page(&self, page: PageId) -> Option<NodeId> {
        self.by_page.get(&page.0).map(|&n| NodeId(n))
    }

    #[inline]
    pub fn page_for_node(&self, node: NodeId) -> PageId {
        PageId(self.page_ids[node.index()])
    }

    #[inline]
    pub fn title(&self, node: NodeId) -> &str {
        &self.titles[node.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeTable {
        NodeTable::new(vec![
            (10, SmolStr::new("Alpha")),
            (25, SmolStr::new("Beta")),
            (99, SmolStr::new("Gamma")),
        ])
    }

    #[test]
    fn round_trip() {
        let t = sample();
        assert_eq!(t.len(), 3);
        assert_eq!(t.node_for_page(PageId(25)), Some(NodeId(1)));
        assert_eq!(t.page_for_node(NodeId(1)), PageId(25));
        assert_eq!(t.title(NodeId(2)), "Gamma");
    }

    #[test]
    fn unknown_page() {
        let t = sample();
        assert_eq!(t.node_for_page(PageId(7)), None);
    }

    #[test]
    fn node_ids_follow_sorted_page_ids() {
        let t = sample();
        assert_eq!(t.page_for_node(NodeId(0)), PageId(10));
        assert_eq!(t.page_for_node(NodeId(2)), PageId(99));
    }
}
