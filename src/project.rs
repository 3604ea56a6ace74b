//! Project hierarchy (§4 data model's `CONTAINS` link type): memories typed
//! `project`/`phase`/`epic`/`task`/`step`/`milestone` grouped via
//! `memory_links` edges into a tree.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{MementoError, Result};
use crate::storage::queries::{
    create_memory_link, get_contained_memories, get_memory, list_memories, store_memory,
};
use crate::types::{CreateMemoryInput, ListOptions, Memory, MemoryType, LINK_TYPE_CONTAINS};

/// Bound on traversal depth; guards against a cycle slipping past
/// `CONTAINS` edges being created some other way than through this module.
const MAX_TREE_DEPTH: u32 = 16;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectNode {
    pub memory: Memory,
    pub children: Vec<ProjectNode>,
}

/// `create_project` — store a top-level memory typed `project`.
pub fn create_project(conn: &Connection, mut input: CreateMemoryInput) -> Result<Memory> {
    input.memory_type = MemoryType::Project;
    Ok(store_memory(conn, &input)?.memory)
}

/// `add_project_item` — store `input` as a new memory and link it under
/// `parent_id` via `CONTAINS`. `parent_id` must already exist.
pub fn add_project_item(
    conn: &Connection,
    parent_id: &str,
    input: CreateMemoryInput,
) -> Result<Memory> {
    if get_memory(conn, parent_id)?.is_none() {
        return Err(MementoError::NotFound(parent_id.to_string()));
    }
    let item = store_memory(conn, &input)?.memory;
    create_memory_link(conn, parent_id, &item.id, LINK_TYPE_CONTAINS)?;
    Ok(item)
}

/// `get_project_tree` — the project memory plus its `CONTAINS` descendants,
/// recursively, bounded by [`MAX_TREE_DEPTH`].
pub fn get_project_tree(conn: &Connection, project_id: &str) -> Result<ProjectNode> {
    let memory = get_memory(conn, project_id)?
        .ok_or_else(|| MementoError::NotFound(project_id.to_string()))?;
    build_tree(conn, memory, 0)
}

fn build_tree(conn: &Connection, memory: Memory, depth: u32) -> Result<ProjectNode> {
    if depth >= MAX_TREE_DEPTH {
        return Ok(ProjectNode {
            memory,
            children: Vec::new(),
        });
    }
    let mut children = Vec::new();
    for child in get_contained_memories(conn, &memory.id)? {
        children.push(build_tree(conn, child, depth + 1)?);
    }
    Ok(ProjectNode { memory, children })
}

/// `list_projects` — top-level memories typed `project`.
pub fn list_projects(conn: &Connection) -> Result<Vec<Memory>> {
    list_memories(
        conn,
        &ListOptions {
            memory_type: Some(MemoryType::Project.as_str().to_string()),
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn input(content: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            content: content.to_string(),
            domain: Some("general".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn builds_multi_level_tree_under_a_project() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let project = create_project(conn, input("launch memento"))?;
                let phase = add_project_item(conn, &project.id, input("phase one"))?;
                add_project_item(conn, &phase.id, input("task one"))?;

                let tree = get_project_tree(conn, &project.id)?;
                assert_eq!(tree.memory.id, project.id);
                assert_eq!(tree.children.len(), 1);
                assert_eq!(tree.children[0].children.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn list_projects_excludes_non_project_items() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let project = create_project(conn, input("a project"))?;
                add_project_item(conn, &project.id, input("an item"))?;
                let projects = list_projects(conn)?;
                assert_eq!(projects.len(), 1);
                assert_eq!(projects[0].id, project.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn adding_item_under_missing_parent_fails() {
        let storage = Storage::open_in_memory().unwrap();
        let err = storage
            .with_connection(|conn| {
                add_project_item(conn, "mem:general:deadbeefdeadbeef", input("orphan"))
            })
            .unwrap_err();
        assert!(matches!(err, MementoError::NotFound(_)));
    }
}
