/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Maps between local bookmark ids and bridge-visible managed keys.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The reserved key for the gateway root folder.
pub const ROOT_KEY: &str = "__root__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Bookmark,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManagedNodeIndex {
    pub folders: HashMap<String, String>,
    pub bookmarks: HashMap<String, String>,
    pub id_to_key: HashMap<String, String>,
}

impl ManagedNodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `id` is reachable under `key`, in the map matching
    /// `kind`. Repairs `id_to_key` for this id unconditionally, since an
    /// earlier apply cycle may have left it stale.
    pub fn record_mapping(&mut self, id: &str, key: &str, kind: NodeKind) {
        match kind {
            NodeKind::Folder => {
                self.folders.insert(key.to_string(), id.to_string());
            }
            NodeKind::Bookmark => {
                self.bookmarks.insert(key.to_string(), id.to_string());
            }
        }
        self.id_to_key.insert(id.to_string(), key.to_string());
    }

    /// O(1) if `id_to_key` already has an entry for `id`; otherwise scans
    /// both maps once and repairs `id_to_key` on a hit.
    pub fn key_for_id(&mut self, id: &str) -> Option<String> {
        if let Some(key) = self.id_to_key.get(id) {
            return Some(key.clone());
        }
        for (key, mapped_id) in self.folders.iter().chain(self.bookmarks.iter()) {
            if mapped_id == id {
                let key = key.clone();
                self.id_to_key.insert(id.to_string(), key.clone());
                return Some(key);
            }
        }
        None
    }

    /// Like [`Self::key_for_id`] but only returns a hit if the node is a
    /// managed folder (and is the special root entry when `id` resolves to
    /// [`ROOT_KEY`]).
    pub fn folder_key_for_id(&mut self, id: &str) -> Option<String> {
        let key = self.key_for_id(id)?;
        if self.folders.contains_key(&key) {
            Some(key)
        } else {
            None
        }
    }

    pub fn is_managed_folder(&mut self, id: &str) -> bool {
        self.folder_key_for_id(id).is_some()
    }

    pub fn is_managed_bookmark(&mut self, id: &str) -> bool {
        match self.key_for_id(id) {
            Some(key) => self.bookmarks.contains_key(&key),
            None => false,
        }
    }

    /// Rebuild `id_to_key` from scratch. Called after a full (snapshot)
    /// apply, since a wholesale re-apply is the one point where the
    /// forward maps can shift out from under the cached inverse.
    pub fn rebuild_inverse(&mut self) {
        self.id_to_key.clear();
        for (key, id) in self.folders.iter() {
            self.id_to_key.insert(id.clone(), key.clone());
        }
        for (key, id) in self.bookmarks.iter() {
            self.id_to_key.insert(id.clone(), key.clone());
        }
    }
}

/// Inputs needed to derive a managed key for a newly observed bookmark
/// creation, gathered by the caller from the bookmark store.
pub struct KeyDerivationInput<'a> {
    pub bookmark_id: &'a str,
    pub parent_folder_key: Option<&'a str>,
    pub parent_title: Option<&'a str>,
    pub index_among_children: u32,
}

/// Pure, deterministic key derivation for an outbound bookmark creation.
/// The caller is responsible for recording the result back
/// into the index before enqueueing, so later events for the same id
/// coalesce against a stable key.
pub fn derive_managed_key(index: &ManagedNodeIndex, input: &KeyDerivationInput<'_>) -> String {
    if let Some(existing) = index.id_to_key.get(input.bookmark_id) {
        return existing.clone();
    }
    if let Some(parent_key) = input.parent_folder_key {
        if let Some(path) = parent_key.strip_prefix("note:") {
            return format!("{path}|{}", input.index_among_children);
        }
        if parent_key.starts_with("folder:") {
            return parent_key.to_string();
        }
    }
    if let Some(title) = input.parent_title.filter(|t| !t.is_empty()) {
        return format!("folder:{title}");
    }
    format!("bookmark:{}", input.bookmark_id)
}
