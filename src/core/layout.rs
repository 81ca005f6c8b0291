//! Filepath: src/core/layout.rs
//! User-editable container tree that source manifests are assigned into.
//!
//! Nodes reference manifests by opaque id only. A manifest id sits in at most
//! one node; ids that sit nowhere form the implicit unassigned pool. Every
//! mutation either succeeds completely or leaves the layout untouched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::manifest::SourceManifests;

/// Id of the layout root
pub const ROOT_ID: &str = "root";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError
{
    #[error("no collection with id '{0}'")]
    UnknownCollection(String),

    #[error("the root collection cannot be {0}")]
    RootImmutable(&'static str),

    #[error("moving '{id}' under '{parent}' would create a cycle")]
    Cycle
    {
        id: String, parent: String
    },

    #[error("cannot merge collection '{0}' into itself")]
    SelfMerge(String),

    #[error("collection name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveNode
{
    pub id: String,
    pub name: String,
    pub children: Vec<ArchiveNode>,
    pub manifest_ids: Vec<String>,
}

impl ArchiveNode
{
    fn new(
        id: String,
        name: String,
    ) -> Self
    {
        Self { id, name, children: Vec::new(), manifest_ids: Vec::new() }
    }

    fn find(
        &self,
        id: &str,
    ) -> Option<&ArchiveNode>
    {
        if self.id == id
        {
            return Some(self);
        }

        self.children
            .iter()
            .find_map(|c| c.find(id))
    }

    fn find_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut ArchiveNode>
    {
        if self.id == id
        {
            return Some(self);
        }

        self.children
            .iter_mut()
            .find_map(|c| c.find_mut(id))
    }

    /// Detach the descendant `id` from wherever it hangs
    fn take(
        &mut self,
        id: &str,
    ) -> Option<ArchiveNode>
    {
        if let Some(pos) = self
            .children
            .iter()
            .position(|c| c.id == id)
        {
            return Some(self.children.remove(pos));
        }

        self.children
            .iter_mut()
            .find_map(|c| c.take(id))
    }

    fn parent_of(
        &self,
        id: &str,
    ) -> Option<&ArchiveNode>
    {
        if self
            .children
            .iter()
            .any(|c| c.id == id)
        {
            return Some(self);
        }

        self.children
            .iter()
            .find_map(|c| c.parent_of(id))
    }

    /// Remove `ids` from this node and every descendant
    fn strip(
        &mut self,
        ids: &HashSet<&str>,
    )
    {
        self.manifest_ids
            .retain(|m| !ids.contains(m.as_str()));

        for child in &mut self.children
        {
            child.strip(ids);
        }
    }

    fn collect_manifests<'a>(
        &'a self,
        out: &mut Vec<&'a str>,
    )
    {
        out.extend(
            self.manifest_ids
                .iter()
                .map(String::as_str),
        );

        for child in &self.children
        {
            child.collect_manifests(out);
        }
    }

    fn collect_ids<'a>(
        &'a self,
        out: &mut Vec<&'a str>,
    )
    {
        out.push(&self.id);

        for child in &self.children
        {
            child.collect_ids(out);
        }
    }

    /// Number of collections below this node
    pub fn collection_count(&self) -> usize
    {
        self.children.len()
            + self
                .children
                .iter()
                .map(ArchiveNode::collection_count)
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLayout
{
    pub root: ArchiveNode,
    next_id: u64,
}

impl Default for ArchiveLayout
{
    fn default() -> Self
    {
        Self::new("Archive")
    }
}

impl ArchiveLayout
{
    pub fn new(root_name: &str) -> Self
    {
        Self { root: ArchiveNode::new(ROOT_ID.to_string(), root_name.to_string()), next_id: 1 }
    }

    pub fn find(
        &self,
        id: &str,
    ) -> Option<&ArchiveNode>
    {
        self.root.find(id)
    }

    fn find_mut(
        &mut self,
        id: &str,
    ) -> Result<&mut ArchiveNode, LayoutError>
    {
        self.root
            .find_mut(id)
            .ok_or_else(|| LayoutError::UnknownCollection(id.to_string()))
    }

    fn ensure_exists(
        &self,
        id: &str,
    ) -> Result<(), LayoutError>
    {
        match self.find(id)
        {
            Some(_) => Ok(()),
            None => Err(LayoutError::UnknownCollection(id.to_string())),
        }
    }

    /// Create an empty collection under `parent` (the root when `None`)
    /// and return its id.
    pub fn create_collection(
        &mut self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, LayoutError>
    {
        let name = name.trim();
        if name.is_empty()
        {
            return Err(LayoutError::EmptyName);
        }

        let id = format!("col-{}", self.next_id);
        let parent = self.find_mut(parent.unwrap_or(ROOT_ID))?;
        parent
            .children
            .push(ArchiveNode::new(id.clone(), name.to_string()));

        self.next_id += 1;
        debug!(%id, name, "collection created");
        Ok(id)
    }

    /// Change the display name only; the id stays stable
    pub fn rename_collection(
        &mut self,
        id: &str,
        name: &str,
    ) -> Result<(), LayoutError>
    {
        let name = name.trim();
        if name.is_empty()
        {
            return Err(LayoutError::EmptyName);
        }

        self.find_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// Delete a collection. Its own manifest ids are detached into the
    /// unassigned pool and returned; sub-collections (with their manifests)
    /// are lifted into the deleted node's parent.
    pub fn delete_collection(
        &mut self,
        id: &str,
    ) -> Result<Vec<String>, LayoutError>
    {
        if id == ROOT_ID
        {
            return Err(LayoutError::RootImmutable("deleted"));
        }

        let parent_id = self
            .root
            .parent_of(id)
            .map(|p| p.id.clone())
            .ok_or_else(|| LayoutError::UnknownCollection(id.to_string()))?;

        let node = self
            .root
            .take(id)
            .ok_or_else(|| LayoutError::UnknownCollection(id.to_string()))?;

        let parent = self.find_mut(&parent_id)?;
        parent
            .children
            .extend(node.children);

        info!(%id, detached = node.manifest_ids.len(), "collection deleted");
        Ok(node.manifest_ids)
    }

    /// Assign manifests to `id`. Ids already there are left alone; ids held
    /// by another collection move here.
    pub fn add_to_collection(
        &mut self,
        id: &str,
        manifest_ids: &[String],
    ) -> Result<(), LayoutError>
    {
        self.ensure_exists(id)?;

        let target_has: HashSet<String> = self
            .find(id)
            .map(|n| {
                n.manifest_ids
                    .iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let incoming: Vec<&String> = {
            let mut seen = HashSet::new();
            manifest_ids
                .iter()
                .filter(|m| !target_has.contains(*m) && seen.insert(m.as_str()))
                .collect()
        };

        if incoming.is_empty()
        {
            return Ok(());
        }

        let moving: HashSet<&str> = incoming
            .iter()
            .map(|m| m.as_str())
            .collect();
        self.root.strip(&moving);

        let target = self.find_mut(id)?;
        target
            .manifest_ids
            .extend(incoming.into_iter().cloned());

        Ok(())
    }

    /// Detach manifests from `id` into the unassigned pool
    pub fn remove_from_collection(
        &mut self,
        id: &str,
        manifest_ids: &[String],
    ) -> Result<(), LayoutError>
    {
        let node = self.find_mut(id)?;
        node.manifest_ids
            .retain(|m| !manifest_ids.contains(m));
        Ok(())
    }

    /// Re-parent `id` under `new_parent`, refusing moves into its own subtree
    pub fn move_collection(
        &mut self,
        id: &str,
        new_parent: &str,
    ) -> Result<(), LayoutError>
    {
        if id == ROOT_ID
        {
            return Err(LayoutError::RootImmutable("moved"));
        }

        let node = self
            .find(id)
            .ok_or_else(|| LayoutError::UnknownCollection(id.to_string()))?;

        if node
            .find(new_parent)
            .is_some()
        {
            return Err(LayoutError::Cycle { id: id.to_string(), parent: new_parent.to_string() });
        }

        self.ensure_exists(new_parent)?;

        let node = self
            .root
            .take(id)
            .ok_or_else(|| LayoutError::UnknownCollection(id.to_string()))?;
        self.find_mut(new_parent)?
            .children
            .push(node);

        Ok(())
    }

    /// Move every manifest and sub-collection of `source` into `target`,
    /// then drop `source`. Validated up front so it is all-or-nothing.
    pub fn merge_collections(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<(), LayoutError>
    {
        if source == target
        {
            return Err(LayoutError::SelfMerge(source.to_string()));
        }

        if source == ROOT_ID
        {
            return Err(LayoutError::RootImmutable("merged away"));
        }

        let src = self
            .find(source)
            .ok_or_else(|| LayoutError::UnknownCollection(source.to_string()))?;

        if src
            .find(target)
            .is_some()
        {
            return Err(LayoutError::Cycle { id: source.to_string(), parent: target.to_string() });
        }

        self.ensure_exists(target)?;

        let node = self
            .root
            .take(source)
            .ok_or_else(|| LayoutError::UnknownCollection(source.to_string()))?;

        let dest = self.find_mut(target)?;
        for m in node.manifest_ids
        {
            if !dest.manifest_ids.contains(&m)
            {
                dest.manifest_ids.push(m);
            }
        }
        dest.children
            .extend(node.children);

        debug!(source, target, "collections merged");
        Ok(())
    }

    /// Collection currently holding `manifest_id`
    pub fn collection_of(
        &self,
        manifest_id: &str,
    ) -> Option<&ArchiveNode>
    {
        fn walk<'a>(
            node: &'a ArchiveNode,
            id: &str,
        ) -> Option<&'a ArchiveNode>
        {
            if node
                .manifest_ids
                .iter()
                .any(|m| m == id)
            {
                return Some(node);
            }

            node.children
                .iter()
                .find_map(|c| walk(c, id))
        }

        walk(&self.root, manifest_id)
    }

    /// Every assigned manifest id in layout order
    pub fn assigned_ids(&self) -> Vec<&str>
    {
        let mut out = Vec::new();
        self.root.collect_manifests(&mut out);
        out
    }

    /// Manifest ids from `collection` that no node holds, in collection order
    pub fn unassigned(
        &self,
        collection: &SourceManifests,
    ) -> Vec<String>
    {
        let assigned: HashSet<&str> = self
            .assigned_ids()
            .into_iter()
            .collect();

        collection
            .ids()
            .iter()
            .filter(|id| !assigned.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Drop references to manifests missing from `collection`; returns them
    pub fn reconcile(
        &mut self,
        collection: &SourceManifests,
    ) -> Vec<String>
    {
        let dangling: Vec<String> = self
            .assigned_ids()
            .into_iter()
            .filter(|id| !collection.contains(id))
            .map(str::to_string)
            .collect();

        if !dangling.is_empty()
        {
            let ids: HashSet<&str> = dangling
                .iter()
                .map(String::as_str)
                .collect();
            self.root.strip(&ids);
            info!(count = dangling.len(), "dropped dangling manifest references");
        }

        dangling
    }

    /// Describe every invariant violation against `collection`
    pub fn validate(
        &self,
        collection: &SourceManifests,
    ) -> Vec<String>
    {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for id in self.assigned_ids()
        {
            if !collection.contains(id)
            {
                problems.push(format!("manifest '{id}' does not exist"));
            }

            if !seen.insert(id)
            {
                problems.push(format!("manifest '{id}' is assigned more than once"));
            }
        }

        let mut ids = Vec::new();
        self.root.collect_ids(&mut ids);
        let mut seen = HashSet::new();
        for id in ids
        {
            if !seen.insert(id)
            {
                problems.push(format!("collection id '{id}' is not unique"));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::manifest::SourceManifest;

    fn ids(v: &[&str]) -> Vec<String>
    {
        v.iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn manifests(v: &[&str]) -> SourceManifests
    {
        v.iter()
            .map(|id| SourceManifest::new(*id, *id))
            .collect()
    }

    #[test]
    fn add_is_idempotent_and_moves_between_collections()
    {
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        let b = layout.create_collection("B", None).unwrap();

        layout.add_to_collection(&a, &ids(&["m1", "m2"])).unwrap();
        layout.add_to_collection(&a, &ids(&["m1", "m1"])).unwrap();
        assert_eq!(layout.find(&a).unwrap().manifest_ids, ids(&["m1", "m2"]));

        layout.add_to_collection(&b, &ids(&["m2"])).unwrap();
        assert_eq!(layout.find(&a).unwrap().manifest_ids, ids(&["m1"]));
        assert_eq!(layout.collection_of("m2").unwrap().id, b);
    }

    #[test]
    fn delete_detaches_manifests_and_lifts_children()
    {
        let coll = manifests(&["m1", "m2", "m3"]);
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        let inner = layout.create_collection("Inner", Some(&a)).unwrap();
        layout.add_to_collection(&a, &ids(&["m1"])).unwrap();
        layout.add_to_collection(&inner, &ids(&["m2"])).unwrap();

        let detached = layout.delete_collection(&a).unwrap();
        assert_eq!(detached, ids(&["m1"]));
        assert!(layout.find(&a).is_none());
        assert_eq!(layout.root.children[0].id, inner);
        assert_eq!(layout.unassigned(&coll), ids(&["m1", "m3"]));

        assert_eq!(
            layout.delete_collection(ROOT_ID),
            Err(LayoutError::RootImmutable("deleted"))
        );
    }

    #[test]
    fn rename_keeps_identity()
    {
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        layout.rename_collection(&a, "Letters").unwrap();

        assert_eq!(layout.find(&a).unwrap().name, "Letters");
        assert_eq!(layout.rename_collection(&a, "  "), Err(LayoutError::EmptyName));
    }

    #[test]
    fn move_rejects_cycles()
    {
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        let b = layout.create_collection("B", Some(&a)).unwrap();

        assert!(matches!(layout.move_collection(&a, &b), Err(LayoutError::Cycle { .. })));
        assert!(matches!(layout.move_collection(&a, &a), Err(LayoutError::Cycle { .. })));

        layout.move_collection(&b, ROOT_ID).unwrap();
        assert_eq!(layout.root.children.len(), 2);
    }

    #[test]
    fn merge_is_atomic()
    {
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        let b = layout.create_collection("B", None).unwrap();
        layout.add_to_collection(&a, &ids(&["m1"])).unwrap();
        layout.add_to_collection(&b, &ids(&["m2"])).unwrap();

        let before = layout.clone();
        assert!(layout.merge_collections(&a, "ghost").is_err());
        assert_eq!(layout, before);

        layout.merge_collections(&a, &b).unwrap();
        assert!(layout.find(&a).is_none());
        assert_eq!(layout.find(&b).unwrap().manifest_ids, ids(&["m2", "m1"]));
    }

    #[test]
    fn reconcile_drops_dangling_references()
    {
        let mut layout = ArchiveLayout::default();
        let a = layout.create_collection("A", None).unwrap();
        layout.add_to_collection(&a, &ids(&["m1", "gone"])).unwrap();

        let coll = manifests(&["m1"]);
        assert_eq!(layout.validate(&coll).len(), 1);
        assert_eq!(layout.reconcile(&coll), ids(&["gone"]));
        assert!(layout.validate(&coll).is_empty());
    }
}
