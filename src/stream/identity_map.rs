//! Identity map: one canonical in-memory post per id.
//!
//! The map is the single owner of every materialized [`Post`]. The window
//! and the tracker store ids only and read through the map, so "at most one
//! live instance per id" holds by construction. Re-inserting a known id
//! merges the incoming fields into the stored entry in place; it never
//! creates a second instance or blindly overwrites the canonical one.

use crate::stream::Post;
use std::collections::HashMap;

/// Keyed store of materialized posts.
#[derive(Debug, Default)]
pub struct IdentityMap {
    posts: HashMap<i64, Post>,
}

impl IdentityMap {
    /// Creates an empty identity map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a post, merging in place if the id is already known.
    ///
    /// Returns `true` if the id was new, `false` if an existing entry was
    /// updated instead.
    pub fn insert(&mut self, post: Post) -> bool {
        match self.posts.get_mut(&post.id) {
            Some(existing) => {
                existing.merge_from(&post);
                false
            }
            None => {
                self.posts.insert(post.id, post);
                true
            }
        }
    }

    /// Gets the canonical post for an id.
    pub fn get(&self, id: i64) -> Option<&Post> {
        self.posts.get(&id)
    }

    /// Gets a mutable handle to the canonical post for an id.
    pub fn get_mut(&mut self, id: i64) -> Option<&mut Post> {
        self.posts.get_mut(&id)
    }

    /// Returns true if the id is materialized.
    pub fn contains(&self, id: i64) -> bool {
        self.posts.contains_key(&id)
    }

    /// Evicts a post. Returns the removed entry if it existed.
    pub fn remove(&mut self, id: i64) -> Option<Post> {
        self.posts.remove(&id)
    }

    /// Number of materialized posts.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Returns true if no posts are materialized.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Iterates over all materialized posts in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_new() {
        let mut map = IdentityMap::new();
        assert!(map.insert(Post::new(1, 1, 9, "sam", "a")));
        assert_eq!(map.len(), 1);
        assert!(map.contains(1));
    }

    #[test]
    fn test_duplicate_insert_merges_in_place() {
        let mut map = IdentityMap::new();
        map.insert(Post::new(1, 1, 9, "sam", "original"));

        let mut updated = Post::new(1, 1, 9, "sam", "revised");
        updated.version = 2;
        let was_new = map.insert(updated);

        assert!(!was_new);
        assert_eq!(map.len(), 1);
        let stored = map.get(1).unwrap();
        assert_eq!(stored.raw, "revised");
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_remove() {
        let mut map = IdentityMap::new();
        map.insert(Post::new(1, 1, 9, "sam", "a"));
        assert!(map.remove(1).is_some());
        assert!(map.remove(1).is_none());
        assert!(map.is_empty());
    }
}
