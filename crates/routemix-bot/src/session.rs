//! Per-identity sessions.
//!
//! A selection session is an implicit state machine over a flat record: the
//! pending subscription source, the chosen rule-set names, pagination
//! cursors, the active candidate filter, and the awaiting-search flag. The
//! transitions live here as methods so the event table stays in one place;
//! the engine only dispatches.
//!
//! Sessions are held in a process-wide [`SessionStore`] keyed by identity.
//! Selection sessions are created on first touch and reaped by an
//! externally driven idle sweep; edit sessions exist only between an
//! explicit edit request and its save/cancel.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use indexmap::IndexSet;

/// Catalog items shown per page.
pub const PAGE_SIZE: usize = 10;

/// Stored groups shown per group-browsing page.
pub const GROUP_PAGE_SIZE: usize = 5;

/// Default idle lifetime of a selection session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Identity of one chat peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Case-insensitive candidate filtering.
///
/// Prefix match when the filter came from a letter shortcut, substring
/// match otherwise. Used by pagination, view building, and the bulk-toggle
/// check alike so they always agree on the candidate list.
pub fn filter_candidates<'a>(
    catalog: &'a [String],
    filter: Option<&str>,
    prefix: bool,
) -> Vec<&'a str> {
    match filter {
        None => catalog.iter().map(String::as_str).collect(),
        Some(f) => {
            let needle = f.to_lowercase();
            catalog
                .iter()
                .map(String::as_str)
                .filter(|candidate| {
                    let hay = candidate.to_lowercase();
                    if prefix {
                        hay.starts_with(&needle)
                    } else {
                        hay.contains(&needle)
                    }
                })
                .collect()
        }
    }
}

/// In-progress rule-set selection for one identity.
#[derive(Debug)]
pub struct SelectionSession {
    /// Pending subscription link, from the last recognized source message.
    pub source: Option<String>,
    /// Chosen rule-set names, unique, in insertion order.
    pub chosen: IndexSet<String>,
    /// Catalog page cursor.
    pub page: usize,
    /// Active candidate filter, if any.
    pub filter: Option<String>,
    /// Whether the filter is a one-letter prefix shortcut.
    pub prefix_filter: bool,
    /// The next free-text message is consumed as a search query.
    pub awaiting_search: bool,
    /// Group-browsing page cursor.
    pub group_page: usize,
    /// A generate run is in flight for this session.
    pub generating: bool,
    /// Last time an event touched this session.
    pub last_active: Instant,
}

impl Default for SelectionSession {
    fn default() -> Self {
        Self {
            source: None,
            chosen: IndexSet::new(),
            page: 0,
            filter: None,
            prefix_filter: false,
            awaiting_search: false,
            group_page: 0,
            generating: false,
            last_active: Instant::now(),
        }
    }
}

impl SelectionSession {
    /// Installs a new subscription source, clearing the chosen set and
    /// resetting pagination, filter, and the search flag.
    pub fn set_source(&mut self, url: impl Into<String>) {
        self.source = Some(url.into());
        self.chosen.clear();
        self.page = 0;
        self.group_page = 0;
        self.filter = None;
        self.prefix_filter = false;
        self.awaiting_search = false;
    }

    /// Adds the rule-set if absent, removes it otherwise.
    pub fn toggle(&mut self, name: &str) {
        if !self.chosen.shift_remove(name) {
            self.chosen.insert(name.to_string());
        }
    }

    /// All-or-nothing bulk toggle over a stored group's members.
    ///
    /// If every member is already chosen the whole group is deselected;
    /// otherwise every member becomes chosen.
    pub fn toggle_group(&mut self, members: &[String]) {
        let all_selected = members.iter().all(|m| self.chosen.contains(m));
        for member in members {
            if all_selected {
                self.chosen.shift_remove(member.as_str());
            } else {
                self.chosen.insert(member.clone());
            }
        }
    }

    /// Applies this session's filter to the catalog.
    pub fn filtered<'a>(&self, catalog: &'a [String]) -> Vec<&'a str> {
        filter_candidates(catalog, self.filter.as_deref(), self.prefix_filter)
    }

    /// Advances the catalog page unless the current page already covers the
    /// tail of the filtered list. Returns whether the cursor moved.
    pub fn next_page(&mut self, filtered_len: usize) -> bool {
        if (self.page + 1) * PAGE_SIZE < filtered_len {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Steps the catalog page back; no-op at page 0.
    pub fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Advances the group page over `group_count` stored names.
    pub fn next_group_page(&mut self, group_count: usize) -> bool {
        if (self.group_page + 1) * GROUP_PAGE_SIZE < group_count {
            self.group_page += 1;
            true
        } else {
            false
        }
    }

    /// Steps the group page back; no-op at page 0.
    pub fn prev_group_page(&mut self) -> bool {
        if self.group_page > 0 {
            self.group_page -= 1;
            true
        } else {
            false
        }
    }

    /// Letter shortcut: prefix filter, both cursors reset.
    pub fn set_letter(&mut self, letter: char) {
        self.filter = Some(letter.to_string());
        self.prefix_filter = true;
        self.page = 0;
        self.group_page = 0;
    }

    /// Consumes free text as the search filter (substring mode), clearing
    /// the awaiting flag and resetting both cursors.
    pub fn set_search(&mut self, text: &str) {
        self.filter = Some(text.to_string());
        self.prefix_filter = false;
        self.page = 0;
        self.group_page = 0;
        self.awaiting_search = false;
    }

    /// Clears the filter and resets the cursors. Returns `false` (no-op)
    /// when no filter is set.
    pub fn clear_filter(&mut self) -> bool {
        if self.filter.is_none() {
            return false;
        }
        self.filter = None;
        self.prefix_filter = false;
        self.page = 0;
        self.group_page = 0;
        true
    }
}

/// Working state for editing one stored group.
#[derive(Debug)]
pub struct EditSession {
    /// Name of the group being edited.
    pub group: String,
    /// Working member set, unique, in insertion order.
    pub working: IndexSet<String>,
    /// Catalog page cursor.
    pub page: usize,
    /// Active candidate filter (substring only, no prefix mode).
    pub filter: Option<String>,
    /// The next free-text message is consumed as a search query.
    pub awaiting_search: bool,
}

impl EditSession {
    /// Starts editing `group` from its current member list.
    pub fn new(group: impl Into<String>, members: &[String]) -> Self {
        Self {
            group: group.into(),
            working: members.iter().cloned().collect(),
            page: 0,
            filter: None,
            awaiting_search: false,
        }
    }

    /// Adds the rule-set to the working set if absent, removes it otherwise.
    pub fn toggle(&mut self, name: &str) {
        if !self.working.shift_remove(name) {
            self.working.insert(name.to_string());
        }
    }

    /// Applies this session's substring filter to the catalog.
    pub fn filtered<'a>(&self, catalog: &'a [String]) -> Vec<&'a str> {
        filter_candidates(catalog, self.filter.as_deref(), false)
    }

    /// Advances the page unless it already covers the filtered tail.
    pub fn next_page(&mut self, filtered_len: usize) -> bool {
        if (self.page + 1) * PAGE_SIZE < filtered_len {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Steps the page back; no-op at page 0.
    pub fn prev_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Consumes free text as the search filter.
    pub fn set_search(&mut self, text: &str) {
        self.filter = Some(text.to_string());
        self.page = 0;
        self.awaiting_search = false;
    }

    /// Clears the filter. Returns `false` (no-op) when none is set.
    pub fn clear_filter(&mut self) -> bool {
        if self.filter.is_none() {
            return false;
        }
        self.filter = None;
        self.page = 0;
        true
    }
}

/// Process-wide session state keyed by identity.
///
/// Each identity's sessions are private to it; across identities there is
/// no shared state here, so different identities can be served in parallel.
#[derive(Debug, Default)]
pub struct SessionStore {
    selections: RwLock<HashMap<ChatId, SelectionSession>>,
    edits: RwLock<HashMap<ChatId, EditSession>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the identity's selection session, creating it on
    /// first touch and stamping the activity time.
    pub fn with_selection<R>(&self, id: ChatId, f: impl FnOnce(&mut SelectionSession) -> R) -> R {
        let mut sessions = self.selections.write().unwrap();
        let session = sessions.entry(id).or_default();
        session.last_active = Instant::now();
        f(session)
    }

    /// Runs `f` against the identity's edit session, if one is active.
    pub fn with_edit<R>(&self, id: ChatId, f: impl FnOnce(&mut EditSession) -> R) -> Option<R> {
        let mut sessions = self.edits.write().unwrap();
        sessions.get_mut(&id).map(f)
    }

    /// Starts an edit session, replacing any previous one for `id`.
    pub fn begin_edit(&self, id: ChatId, session: EditSession) {
        self.edits.write().unwrap().insert(id, session);
    }

    /// Ends and returns the identity's edit session, if any.
    pub fn take_edit(&self, id: ChatId) -> Option<EditSession> {
        self.edits.write().unwrap().remove(&id)
    }

    /// Number of live selection sessions.
    pub fn selection_count(&self) -> usize {
        self.selections.read().unwrap().len()
    }

    /// Removes selection sessions idle longer than `ttl`. Returns how many
    /// were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.selections.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active.elapsed() <= ttl);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // ==================== Toggle Tests ====================

    #[test]
    fn test_toggle_twice_restores_original_set() {
        let mut s = SelectionSession::default();
        s.toggle("Netflix");
        assert!(s.chosen.contains("Netflix"));
        s.toggle("Netflix");
        assert!(s.chosen.is_empty());
    }

    #[test]
    fn test_toggle_preserves_insertion_order() {
        let mut s = SelectionSession::default();
        s.toggle("B");
        s.toggle("A");
        s.toggle("C");
        s.toggle("A");
        let order: Vec<&str> = s.chosen.iter().map(String::as_str).collect();
        assert_eq!(order, ["B", "C"]);
    }

    #[test]
    fn test_group_toggle_selects_all_when_any_missing() {
        let mut s = SelectionSession::default();
        s.toggle("A");
        let members = catalog(&["A", "B", "C"]);
        s.toggle_group(&members);
        assert!(members.iter().all(|m| s.chosen.contains(m.as_str())));
    }

    #[test]
    fn test_group_toggle_deselects_all_when_all_present() {
        let mut s = SelectionSession::default();
        let members = catalog(&["A", "B"]);
        s.toggle_group(&members);
        s.toggle("C");
        s.toggle_group(&members);
        let order: Vec<&str> = s.chosen.iter().map(String::as_str).collect();
        assert_eq!(order, ["C"]);
    }

    // ==================== Filter Tests ====================

    #[test]
    fn test_filter_substring_case_insensitive() {
        let catalog = catalog(&["Netflix", "NetEaseMusic", "OpenAI"]);
        let hits = filter_candidates(&catalog, Some("net"), false);
        assert_eq!(hits, ["Netflix", "NetEaseMusic"]);
    }

    #[test]
    fn test_filter_prefix_mode() {
        let catalog = catalog(&["Netflix", "TelegramNet", "OpenAI"]);
        let hits = filter_candidates(&catalog, Some("n"), true);
        assert_eq!(hits, ["Netflix"]);
    }

    #[test]
    fn test_filter_none_passes_everything() {
        let catalog = catalog(&["A", "B"]);
        assert_eq!(filter_candidates(&catalog, None, false).len(), 2);
    }

    #[test]
    fn test_letter_shortcut_sets_prefix_filter_and_resets_cursors() {
        let mut s = SelectionSession::default();
        s.page = 3;
        s.group_page = 2;
        s.set_letter('N');
        assert_eq!(s.filter.as_deref(), Some("N"));
        assert!(s.prefix_filter);
        assert_eq!(s.page, 0);
        assert_eq!(s.group_page, 0);
    }

    #[test]
    fn test_search_clears_prefix_mode_and_awaiting_flag() {
        let mut s = SelectionSession::default();
        s.set_letter('N');
        s.awaiting_search = true;
        s.set_search("music");
        assert_eq!(s.filter.as_deref(), Some("music"));
        assert!(!s.prefix_filter);
        assert!(!s.awaiting_search);
    }

    #[test]
    fn test_clear_filter_is_noop_without_filter() {
        let mut s = SelectionSession::default();
        assert!(!s.clear_filter());
        s.set_letter('N');
        assert!(s.clear_filter());
        assert_eq!(s.filter, None);
        assert!(!s.prefix_filter);
    }

    // ==================== Pagination Tests ====================

    #[test]
    fn test_next_page_bounded_by_filtered_length() {
        let mut s = SelectionSession::default();
        assert!(s.next_page(PAGE_SIZE + 1));
        assert_eq!(s.page, 1);
        // Page 1 already covers items 10..=10.
        assert!(!s.next_page(PAGE_SIZE + 1));
        assert_eq!(s.page, 1);
    }

    #[test]
    fn test_next_page_noop_when_single_page() {
        let mut s = SelectionSession::default();
        assert!(!s.next_page(PAGE_SIZE));
        assert_eq!(s.page, 0);
    }

    #[test]
    fn test_prev_page_noop_at_zero() {
        let mut s = SelectionSession::default();
        assert!(!s.prev_page());
        s.next_page(25);
        assert!(s.prev_page());
        assert_eq!(s.page, 0);
    }

    #[test]
    fn test_group_pagination_independent_cursor() {
        let mut s = SelectionSession::default();
        assert!(s.next_group_page(GROUP_PAGE_SIZE + 1));
        assert_eq!(s.group_page, 1);
        assert_eq!(s.page, 0);
        assert!(!s.next_group_page(GROUP_PAGE_SIZE + 1));
        assert!(s.prev_group_page());
        assert!(!s.prev_group_page());
    }

    // ==================== Source Tests ====================

    #[test]
    fn test_set_source_resets_session() {
        let mut s = SelectionSession::default();
        s.toggle("Netflix");
        s.set_letter('N');
        s.awaiting_search = true;
        s.next_page(100);
        s.set_source("https://gist.github.com/u/abc");
        assert_eq!(s.source.as_deref(), Some("https://gist.github.com/u/abc"));
        assert!(s.chosen.is_empty());
        assert_eq!(s.page, 0);
        assert_eq!(s.group_page, 0);
        assert_eq!(s.filter, None);
        assert!(!s.prefix_filter);
        assert!(!s.awaiting_search);
    }

    // ==================== Edit Session Tests ====================

    #[test]
    fn test_edit_session_starts_from_members() {
        let members = catalog(&["A", "B"]);
        let es = EditSession::new("g", &members);
        assert_eq!(es.group, "g");
        assert!(es.working.contains("A"));
        assert!(es.working.contains("B"));
    }

    #[test]
    fn test_edit_toggle_and_working_order() {
        let es_members = catalog(&["A", "B"]);
        let mut es = EditSession::new("g", &es_members);
        es.toggle("A");
        es.toggle("C");
        let order: Vec<&str> = es.working.iter().map(String::as_str).collect();
        assert_eq!(order, ["B", "C"]);
    }

    // ==================== Store Tests ====================

    #[test]
    fn test_store_creates_selection_on_first_touch() {
        let store = SessionStore::new();
        let chosen = store.with_selection(ChatId(1), |s| {
            s.toggle("Netflix");
            s.chosen.len()
        });
        assert_eq!(chosen, 1);
        assert_eq!(store.selection_count(), 1);
    }

    #[test]
    fn test_store_sessions_are_per_identity() {
        let store = SessionStore::new();
        store.with_selection(ChatId(1), |s| s.toggle("Netflix"));
        let other = store.with_selection(ChatId(2), |s| s.chosen.len());
        assert_eq!(other, 0);
    }

    #[test]
    fn test_with_edit_without_session_is_none() {
        let store = SessionStore::new();
        assert!(store.with_edit(ChatId(1), |_| ()).is_none());
        assert!(store.take_edit(ChatId(1)).is_none());
    }

    #[test]
    fn test_take_edit_ends_session() {
        let store = SessionStore::new();
        store.begin_edit(ChatId(1), EditSession::new("g", &[]));
        assert!(store.take_edit(ChatId(1)).is_some());
        assert!(store.take_edit(ChatId(1)).is_none());
    }

    #[test]
    fn test_evict_idle_drops_stale_sessions() {
        let store = SessionStore::new();
        store.with_selection(ChatId(1), |_| ());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.evict_idle(Duration::from_millis(1)), 1);
        assert_eq!(store.selection_count(), 0);
    }

    #[test]
    fn test_evict_idle_keeps_active_sessions() {
        let store = SessionStore::new();
        store.with_selection(ChatId(1), |_| ());
        assert_eq!(store.evict_idle(Duration::from_secs(60)), 0);
        assert_eq!(store.selection_count(), 1);
    }
}
