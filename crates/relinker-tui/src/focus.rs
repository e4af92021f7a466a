//! FocusRing — manages keyboard focus cycling between panes.

use crate::action::ComponentId;

pub struct FocusRing {
    items: Vec<ComponentId>,
    current: usize,
}

impl FocusRing {
    pub fn new(items: Vec<ComponentId>) -> Self {
        Self { items, current: 0 }
    }

    pub fn current(&self) -> Option<ComponentId> {
        self.items.get(self.current).copied()
    }

    pub fn next(&mut self) -> Option<ComponentId> {
        if self.items.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.items.len();
        self.current()
    }

    pub fn prev(&mut self) -> Option<ComponentId> {
        if self.items.is_empty() {
            return None;
        }
        self.current = if self.current == 0 {
            self.items.len() - 1
        } else {
            self.current - 1
        };
        self.current()
    }

    pub fn set(&mut self, id: ComponentId) {
        if let Some(pos) = self.items.iter().position(|&x| x == id) {
            self.current = pos;
        }
    }

    pub fn is_focused(&self, id: ComponentId) -> bool {
        self.current() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_both_ways() {
        let mut ring = FocusRing::new(vec![ComponentId::PlaylistList, ComponentId::TrackList]);
        assert_eq!(ring.current(), Some(ComponentId::PlaylistList));
        assert_eq!(ring.next(), Some(ComponentId::TrackList));
        assert_eq!(ring.next(), Some(ComponentId::PlaylistList));
        assert_eq!(ring.prev(), Some(ComponentId::TrackList));
        ring.set(ComponentId::PlaylistList);
        assert!(ring.is_focused(ComponentId::PlaylistList));
    }

    #[test]
    fn empty_ring_has_no_focus() {
        let mut ring = FocusRing::new(Vec::new());
        assert_eq!(ring.next(), None);
        assert_eq!(ring.current(), None);
    }
}
