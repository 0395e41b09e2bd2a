//! Per-player search task groups
//!
//! Every queued player owns three scheduled units: the periodic poll, the
//! one-shot range expansion and the one-shot timeout. They live and die as
//! one group: cancelling a player's search aborts all three, and whichever
//! unit ends the search aborts its two siblings. Group ids keep a unit that
//! outlived a re-enqueue from touching the replacement group.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

/// One of the three scheduled units of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMember {
    Poll,
    Expand,
    Timeout,
}

/// The three join handles of one player's search, aborted together
#[derive(Debug)]
pub struct SearchTaskGroup {
    group_id: u64,
    poll: JoinHandle<()>,
    expand: JoinHandle<()>,
    timeout: JoinHandle<()>,
}

impl SearchTaskGroup {
    pub fn new(
        group_id: u64,
        poll: JoinHandle<()>,
        expand: JoinHandle<()>,
        timeout: JoinHandle<()>,
    ) -> Self {
        Self {
            group_id,
            poll,
            expand,
            timeout,
        }
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    fn abort_all(&self) {
        self.poll.abort();
        self.expand.abort();
        self.timeout.abort();
    }

    /// Abort every unit except the one currently running to completion
    fn abort_others(&self, survivor: GroupMember) {
        if survivor != GroupMember::Poll {
            self.poll.abort();
        }
        if survivor != GroupMember::Expand {
            self.expand.abort();
        }
        if survivor != GroupMember::Timeout {
            self.timeout.abort();
        }
    }
}

/// Registry of live search task groups keyed by player id
#[derive(Debug, Default)]
pub struct SearchTaskRegistry {
    groups: std::sync::Mutex<HashMap<String, SearchTaskGroup>>,
    next_group_id: AtomicU64,
}

impl SearchTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a group about to be spawned
    pub fn next_group_id(&self) -> u64 {
        self.next_group_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a player's group, aborting any previous group for the player
    pub fn insert(&self, player_id: &str, group: SearchTaskGroup) {
        let mut groups = match self.groups.lock() {
            Ok(groups) => groups,
            Err(_) => return,
        };
        if let Some(old) = groups.insert(player_id.to_string(), group) {
            debug!("Replacing search task group for {}", player_id);
            old.abort_all();
        }
    }

    /// Abort and remove a player's whole group; true when one existed
    pub fn cancel(&self, player_id: &str) -> bool {
        let mut groups = match self.groups.lock() {
            Ok(groups) => groups,
            Err(_) => return false,
        };
        match groups.remove(player_id) {
            Some(group) => {
                group.abort_all();
                true
            }
            None => false,
        }
    }

    /// Called by the unit that ended the search from inside its own task:
    /// removes the group and aborts the two sibling units. A stale `group_id`
    /// (the player re-enqueued and owns a fresh group) leaves the current
    /// group untouched.
    pub fn finish(&self, player_id: &str, group_id: u64, survivor: GroupMember) -> bool {
        let mut groups = match self.groups.lock() {
            Ok(groups) => groups,
            Err(_) => return false,
        };
        let owns_current = groups
            .get(player_id)
            .map(|group| group.group_id() == group_id)
            .unwrap_or(false);
        if !owns_current {
            return false;
        }
        if let Some(group) = groups.remove(player_id) {
            group.abort_others(survivor);
        }
        true
    }

    /// Whether a player currently has a live group
    pub fn contains(&self, player_id: &str) -> bool {
        self.groups
            .lock()
            .map(|groups| groups.contains_key(player_id))
            .unwrap_or(false)
    }

    /// Number of live groups
    pub fn len(&self) -> usize {
        self.groups.lock().map(|groups| groups.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every group (service shutdown); returns how many were aborted
    pub fn cancel_all(&self) -> usize {
        let mut groups = match self.groups.lock() {
            Ok(groups) => groups,
            Err(_) => return 0,
        };
        let count = groups.len();
        for (_, group) in groups.drain() {
            group.abort_all();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn_group(registry: &SearchTaskRegistry) -> SearchTaskGroup {
        let group_id = registry.next_group_id();
        SearchTaskGroup::new(
            group_id,
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
        )
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = SearchTaskRegistry::new();
        assert!(registry.is_empty());

        registry.insert("alice", spawn_group(&registry));
        registry.insert("bob", spawn_group(&registry));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("alice"));

        assert!(registry.cancel("alice"));
        assert!(!registry.cancel("alice"));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.cancel_all(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_all_members() {
        let registry = SearchTaskRegistry::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let poll = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let flag = fired.clone();
        let expand = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let flag = fired.clone();
        let timeout = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let group_id = registry.next_group_id();
        registry.insert(
            "alice",
            SearchTaskGroup::new(group_id, poll, expand, timeout),
        );
        registry.cancel("alice");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finish_ignores_stale_group_id() {
        let registry = SearchTaskRegistry::new();

        let old_group = spawn_group(&registry);
        let old_id = old_group.group_id();
        registry.insert("alice", old_group);

        // the player re-enqueued; a fresh group replaced the old one
        let new_group = spawn_group(&registry);
        let new_id = new_group.group_id();
        registry.insert("alice", new_group);

        assert!(!registry.finish("alice", old_id, GroupMember::Poll));
        assert!(registry.contains("alice"));

        assert!(registry.finish("alice", new_id, GroupMember::Timeout));
        assert!(!registry.contains("alice"));
    }
}
