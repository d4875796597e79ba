/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Capability: the local bookmark store. The host application supplies the
//! real implementation (a browser's bookmark tree, a `places`-backed store,
//! or similar); this crate only ever reads/writes single nodes by id and
//! observes a flat event stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Folder,
    Bookmark,
}

/// A single node as returned by `get`/`get_children`/`get_tree`. `children`
/// is always empty outside of `get_tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: NodeType,
    pub title: Option<String>,
    pub url: Option<String>,
    pub index: u32,
    pub children: Vec<BookmarkNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInput {
    pub parent_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateInput {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveInput {
    pub parent_id: String,
    pub index: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookmarkStoreError {
    #[error("no such node `{0}`")]
    NotFound(String),
    #[error("bookmark store rejected the operation: {0}")]
    Rejected(String),
}

/// Local events the capture handlers (§4.J) subscribe to. `index` on
/// `Moved` is the new position among the destination's children.
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkEvent {
    Created(BookmarkNode),
    Changed {
        id: String,
        title: Option<String>,
        url: Option<String>,
    },
    Removed {
        id: String,
        parent_id: Option<String>,
    },
    Moved {
        id: String,
        old_parent_id: Option<String>,
        parent_id: String,
        index: u32,
    },
    ImportBegan,
    ImportEnded,
}

#[async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<BookmarkNode, BookmarkStoreError>;
    async fn get_children(&self, parent_id: &str) -> Result<Vec<BookmarkNode>, BookmarkStoreError>;
    async fn get_tree(&self) -> Result<BookmarkNode, BookmarkStoreError>;
    async fn create(&self, input: CreateInput) -> Result<BookmarkNode, BookmarkStoreError>;
    async fn update(&self, id: &str, input: UpdateInput) -> Result<BookmarkNode, BookmarkStoreError>;
    async fn move_node(&self, id: &str, input: MoveInput) -> Result<BookmarkNode, BookmarkStoreError>;
    async fn remove(&self, id: &str) -> Result<(), BookmarkStoreError>;
    async fn remove_tree(&self, id: &str) -> Result<(), BookmarkStoreError>;

    /// Subscribes to the flat local-mutation event stream. Each call gets
    /// its own receiver; events broadcast to every subscriber.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BookmarkEvent>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod mem {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::{broadcast, Mutex};

    /// An in-memory [`BookmarkStore`], for tests and examples. Folders and
    /// bookmarks share one flat id space; `get_tree` walks from `"root"`.
    pub struct MemoryBookmarks {
        nodes: Mutex<HashMap<String, BookmarkNode>>,
        next_id: Mutex<u64>,
        events: broadcast::Sender<BookmarkEvent>,
    }

    impl MemoryBookmarks {
        pub fn new() -> Self {
            let (events, _) = broadcast::channel(256);
            let mut nodes = HashMap::new();
            nodes.insert(
                "root".to_string(),
                BookmarkNode {
                    id: "root".to_string(),
                    parent_id: None,
                    kind: NodeType::Folder,
                    title: Some("root".to_string()),
                    url: None,
                    index: 0,
                    children: Vec::new(),
                },
            );
            Self {
                nodes: Mutex::new(nodes),
                next_id: Mutex::new(1),
                events,
            }
        }

        async fn fresh_id(&self) -> String {
            let mut next = self.next_id.lock().await;
            let id = next.to_string();
            *next += 1;
            id
        }

        async fn children_of(&self, parent_id: &str) -> Vec<BookmarkNode> {
            self.nodes
                .lock()
                .await
                .values()
                .filter(|n| n.parent_id.as_deref() == Some(parent_id))
                .cloned()
                .collect()
        }
    }

    impl Default for MemoryBookmarks {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl BookmarkStore for MemoryBookmarks {
        async fn get(&self, id: &str) -> Result<BookmarkNode, BookmarkStoreError> {
            self.nodes
                .lock()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| BookmarkStoreError::NotFound(id.to_string()))
        }

        async fn get_children(&self, parent_id: &str) -> Result<Vec<BookmarkNode>, BookmarkStoreError> {
            Ok(self.children_of(parent_id).await)
        }

        async fn get_tree(&self) -> Result<BookmarkNode, BookmarkStoreError> {
            fn build(nodes: &HashMap<String, BookmarkNode>, id: &str) -> BookmarkNode {
                let mut node = nodes.get(id).cloned().expect("node exists");
                node.children = nodes
                    .values()
                    .filter(|n| n.parent_id.as_deref() == Some(id))
                    .map(|child| build(nodes, &child.id))
                    .collect();
                node
            }
            let nodes = self.nodes.lock().await;
            Ok(build(&nodes, "root"))
        }

        async fn create(&self, input: CreateInput) -> Result<BookmarkNode, BookmarkStoreError> {
            let id = self.fresh_id().await;
            let index = self.children_of(&input.parent_id).await.len() as u32;
            let kind = if input.url.is_some() {
                NodeType::Bookmark
            } else {
                NodeType::Folder
            };
            let node = BookmarkNode {
                id: id.clone(),
                parent_id: Some(input.parent_id.clone()),
                kind,
                title: input.title.clone(),
                url: input.url.clone(),
                index,
                children: Vec::new(),
            };
            self.nodes.lock().await.insert(id, node.clone());
            let _ = self.events.send(BookmarkEvent::Created(node.clone()));
            Ok(node)
        }

        async fn update(&self, id: &str, input: UpdateInput) -> Result<BookmarkNode, BookmarkStoreError> {
            let mut nodes = self.nodes.lock().await;
            let node = nodes
                .get_mut(id)
                .ok_or_else(|| BookmarkStoreError::NotFound(id.to_string()))?;
            if input.title.is_some() {
                node.title = input.title.clone();
            }
            if input.url.is_some() {
                node.url = input.url.clone();
            }
            let out = node.clone();
            drop(nodes);
            let _ = self.events.send(BookmarkEvent::Changed {
                id: id.to_string(),
                title: out.title.clone(),
                url: out.url.clone(),
            });
            Ok(out)
        }

        async fn move_node(&self, id: &str, input: MoveInput) -> Result<BookmarkNode, BookmarkStoreError> {
            let old_parent_id = {
                let nodes = self.nodes.lock().await;
                nodes
                    .get(id)
                    .ok_or_else(|| BookmarkStoreError::NotFound(id.to_string()))?
                    .parent_id
                    .clone()
            };
            let index = input.index.unwrap_or(self.children_of(&input.parent_id).await.len() as u32);
            let node = {
                let mut nodes = self.nodes.lock().await;
                let node = nodes
                    .get_mut(id)
                    .ok_or_else(|| BookmarkStoreError::NotFound(id.to_string()))?;
                node.parent_id = Some(input.parent_id.clone());
                node.index = index;
                node.clone()
            };
            let _ = self.events.send(BookmarkEvent::Moved {
                id: id.to_string(),
                old_parent_id,
                parent_id: input.parent_id,
                index,
            });
            Ok(node)
        }

        async fn remove(&self, id: &str) -> Result<(), BookmarkStoreError> {
            let removed = self
                .nodes
                .lock()
                .await
                .remove(id)
                .ok_or_else(|| BookmarkStoreError::NotFound(id.to_string()))?;
            let _ = self.events.send(BookmarkEvent::Removed {
                id: id.to_string(),
                parent_id: removed.parent_id,
            });
            Ok(())
        }

        async fn remove_tree(&self, id: &str) -> Result<(), BookmarkStoreError> {
            let descendants: Vec<String> = {
                let nodes = self.nodes.lock().await;
                let mut stack = vec![id.to_string()];
                let mut out = Vec::new();
                while let Some(cur) = stack.pop() {
                    for n in nodes.values() {
                        if n.parent_id.as_deref() == Some(cur.as_str()) {
                            stack.push(n.id.clone());
                        }
                    }
                    out.push(cur);
                }
                out
            };
            for descendant in descendants {
                let _ = self.remove(&descendant).await;
            }
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent> {
            self.events.subscribe()
        }
    }
}
