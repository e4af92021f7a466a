//! Generic scrollable + filterable list widget.

pub struct ScrollableList<T> {
    pub items: Vec<T>,
    pub filtered_indices: Vec<usize>,
    pub selected: usize,
    pub scroll_offset: usize,
    pub filter: String,
    filter_fn: Box<dyn Fn(&T, &str) -> bool + Send + Sync>,
}

impl<T> ScrollableList<T> {
    pub fn new(filter_fn: impl Fn(&T, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            filtered_indices: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            filter: String::new(),
            filter_fn: Box::new(filter_fn),
        }
    }

    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.rebuild_filter();
    }

    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.to_string();
        let old_idx = self.filtered_indices.get(self.selected).copied();
        self.rebuild_filter();
        // keep the same item selected if it survived the filter
        if let Some(prev) = old_idx {
            self.selected = self
                .filtered_indices
                .iter()
                .position(|&i| i == prev)
                .unwrap_or(0);
        }
        self.scroll_offset = 0;
    }

    pub fn rebuild_filter(&mut self) {
        if self.filter.is_empty() {
            self.filtered_indices = (0..self.items.len()).collect();
        } else {
            self.filtered_indices = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| (self.filter_fn)(item, &self.filter))
                .map(|(i, _)| i)
                .collect();
        }
        if self.selected >= self.filtered_indices.len() {
            self.selected = self.filtered_indices.len().saturating_sub(1);
        }
    }

    pub fn select_up(&mut self, n: usize) {
        if self.filtered_indices.is_empty() {
            return;
        }
        self.selected = self.selected.saturating_sub(n);
    }

    pub fn select_down(&mut self, n: usize) {
        if self.filtered_indices.is_empty() {
            return;
        }
        self.selected = (self.selected + n).min(self.filtered_indices.len().saturating_sub(1));
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.scroll_offset = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.filtered_indices.len().saturating_sub(1);
    }

    pub fn selected_item(&self) -> Option<&T> {
        let idx = self.filtered_indices.get(self.selected)?;
        self.items.get(*idx)
    }

    pub fn selected_original_index(&self) -> Option<usize> {
        self.filtered_indices.get(self.selected).copied()
    }

    /// Returns (original_index, &item) pairs visible in `height` rows.
    /// Call ensure_visible first to update scroll_offset.
    pub fn visible_items(&self, height: usize) -> Vec<(usize, &T)> {
        if height == 0 || self.filtered_indices.is_empty() {
            return Vec::new();
        }
        let end = (self.scroll_offset + height).min(self.filtered_indices.len());
        self.filtered_indices[self.scroll_offset..end]
            .iter()
            .map(|&i| (i, &self.items[i]))
            .collect()
    }

    pub fn ensure_visible(&mut self, height: usize) {
        if height == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected.saturating_sub(height - 1);
        }
    }

    /// Handle a click at `row` within the rendered area.
    /// Returns true if selection changed.
    pub fn handle_click(&mut self, row: usize) -> bool {
        let target = self.scroll_offset + row;
        if target < self.filtered_indices.len() && target != self.selected {
            self.selected = target;
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.filtered_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filtered_indices.is_empty()
    }

    pub fn total_len(&self) -> usize {
        self.items.len()
    }

    pub fn selected_in_view(&self, height: usize) -> usize {
        self.selected
            .saturating_sub(self.scroll_offset)
            .min(height.saturating_sub(1))
    }

    /// Set selection by original item index (not filtered index).
    pub fn set_selected_by_original(&mut self, orig_idx: usize) {
        if let Some(pos) = self.filtered_indices.iter().position(|&i| i == orig_idx) {
            self.selected = pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> ScrollableList<&'static str> {
        let mut list = ScrollableList::new(|s: &&str, q: &str| s.contains(q));
        list.set_items(vec!["alpha", "beta", "gamma", "delta"]);
        list
    }

    #[test]
    fn filter_keeps_selection_when_possible() {
        let mut list = names();
        list.select_down(2);
        assert_eq!(list.selected_item(), Some(&"gamma"));
        list.set_filter("mm");
        assert_eq!(list.selected_item(), Some(&"gamma"));
        list.set_filter("ta");
        assert_eq!(list.len(), 2);
        assert_eq!(list.selected_item(), Some(&"beta"));
        list.set_filter("");
        assert_eq!(list.total_len(), 4);
    }

    #[test]
    fn scrolling_follows_selection() {
        let mut list = names();
        list.select_last();
        list.ensure_visible(2);
        assert_eq!(list.scroll_offset, 2);
        assert_eq!(list.selected_in_view(2), 1);
        let visible: Vec<_> = list.visible_items(2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(visible, vec![2, 3]);
        assert!(list.handle_click(0));
        assert_eq!(list.selected_original_index(), Some(2));
        assert!(!list.handle_click(5));
    }

    #[test]
    fn empty_list_is_inert() {
        let mut list: ScrollableList<&str> = ScrollableList::new(|_, _| true);
        list.select_down(3);
        list.select_up(1);
        assert_eq!(list.selected_item(), None);
        assert!(list.visible_items(10).is_empty());
    }
}
