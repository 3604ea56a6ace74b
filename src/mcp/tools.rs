//! MCP tool definitions: the domain methods exposed by `tools/list`/`tools/call`.

use serde_json::json;

use super::protocol::ToolDefinition;

/// All tool definitions, as `(name, description, input_schema_json)`.
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "store_memory",
        "Store a new memory, deriving a deterministic content-addressed id. Calling twice with identical content+domain returns the same id and marks the second call as a duplicate.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The content to remember"},
                "domain": {"type": "string", "description": "Connection/domain name; defaults to the server's primary connection"},
                "source": {"type": "string", "description": "Provenance tag, e.g. the tool or agent that produced this memory"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "metadata": {"type": "object"},
                "keywords": {"type": "array", "items": {"type": "string"}},
                "type": {"type": "string", "enum": ["", "project", "phase", "epic", "task", "step", "milestone"]},
                "created_by": {"type": "string"},
                "session_id": {"type": "string"},
                "source_context": {"type": "object", "description": "Serialized form must be at most 4096 bytes"}
            },
            "required": ["content"]
        }"#,
    ),
    (
        "recall_memory",
        "Fetch a memory by id. Soft-deleted memories are not found unless restored.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "find_related",
        "Hybrid full-text + vector search over memories in a connection.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "query_vector": {"type": "array", "items": {"type": "number"}, "description": "Optional embedding; omit to search full-text only"},
                "connection_id": {"type": "string"},
                "limit": {"type": "integer", "default": 10},
                "offset": {"type": "integer", "default": 0}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "retry_enrichment",
        "Re-offer a memory's content to the enrichment queue after a prior failure.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "explain_reasoning",
        "Return a memory's evolution chain and related memories, for inspecting why the current content looks the way it does.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "update_memory_state",
        "Transition a memory's lifecycle state. Rejected if the transition is not in the allowed table.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "state": {"type": "string", "enum": ["", "planning", "active", "paused", "blocked", "completed", "cancelled", "archived", "superseded"]}
            },
            "required": ["id", "state"]
        }"#,
    ),
    (
        "forget_memory",
        "Soft-delete a memory. Visible again via restore_memory.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "evolve_memory",
        "Create a new memory version superseding an existing one.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["id", "content"]
        }"#,
    ),
    (
        "consolidate_memories",
        "Merge two or more memories into a single consolidated memory, soft-deleting the sources.",
        r#"{
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "string"}},
                "query": {"type": "string", "description": "Used to resolve candidates when ids is omitted"},
                "title": {"type": "string"}
            }
        }"#,
    ),
    (
        "detect_contradictions",
        "Scan for conflicting relationships, active references to superseded memories, and temporal-ordering violations.",
        r#"{
            "type": "object",
            "properties": {"memory_id": {"type": "string", "description": "Optional focus id restricting the scan"}}
        }"#,
    ),
    (
        "update_memory",
        "Patch a memory's fields. Fields omitted from the input are left unchanged.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "content": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "metadata": {"type": "object"},
                "keywords": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "get_session_context",
        "List memories created during a given session id.",
        r#"{
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "connection_id": {"type": "string"},
                "limit": {"type": "integer", "default": 20}
            },
            "required": ["session_id"]
        }"#,
    ),
    (
        "traverse_memory_graph",
        "Bounded breadth-first traversal from a memory, through its shared-entity relationship graph.",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "max_hops": {"type": "integer", "default": 2, "minimum": 1, "maximum": 4},
                "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 50}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "restore_memory",
        "Undo a soft-delete, making the memory visible again.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "list_deleted_memories",
        "List soft-deleted memories.",
        r#"{
            "type": "object",
            "properties": {
                "connection_id": {"type": "string"},
                "page": {"type": "integer", "default": 1},
                "limit": {"type": "integer", "default": 20}
            }
        }"#,
    ),
    (
        "get_evolution_chain",
        "Return the full ancestor-to-descendant chain of versions for a memory.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "create_project",
        "Store a top-level memory typed `project`.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string"},
                "domain": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["content"]
        }"#,
    ),
    (
        "add_project_item",
        "Store a new memory and link it under a project (or any other memory) via a CONTAINS edge.",
        r#"{
            "type": "object",
            "properties": {
                "parent_id": {"type": "string"},
                "content": {"type": "string"},
                "type": {"type": "string", "enum": ["phase", "epic", "task", "step", "milestone"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["parent_id", "content"]
        }"#,
    ),
    (
        "get_project_tree",
        "Return a project memory and its CONTAINS descendants as a tree.",
        r#"{
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        }"#,
    ),
    (
        "list_projects",
        "List top-level project memories.",
        r#"{
            "type": "object",
            "properties": {"connection_id": {"type": "string"}}
        }"#,
    ),
];

/// Get all tool definitions as `ToolDefinition` structs, parsing each
/// embedded schema string.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}
