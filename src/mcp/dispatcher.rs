//! Command dispatcher (§4.9): parses envelopes, validates protocol version,
//! looks up methods, unmarshals params, maps domain errors to JSON-RPC-ish
//! error codes, and replies exactly once per request.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::contradiction::detect_contradictions;
use crate::enrichment::EnrichmentQueue;
use crate::error::{MementoError, Result};
use crate::graph::traverse_memory_graph;
use crate::intelligence::consolidation::consolidate;
use crate::lifecycle::evolve;
use crate::mcp::protocol::{
    InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult, ToolDefinition,
};
use crate::mcp::tools::get_tool_definitions;
use crate::project::{add_project_item, create_project, get_project_tree, list_projects};
use crate::registry::ConnectionRegistry;
use crate::search::hybrid_search;
use crate::storage::queries::{
    get_evolution_chain, get_memory, get_related_memories, list_memories, restore_memory,
    store_memory, update_memory, update_state,
};
use crate::types::{CreateMemoryInput, ListOptions, MemoryState, UpdateMemoryInput};

pub struct Dispatcher {
    registry: ConnectionRegistry,
    enrichment: EnrichmentQueue,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry, enrichment: EnrichmentQueue) -> Self {
        Self {
            registry,
            enrichment,
        }
    }

    fn dispatch_domain(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "store_memory" => self.store_memory(params),
            "recall_memory" => self.recall_memory(params),
            "find_related" => self.find_related(params),
            "retry_enrichment" => self.retry_enrichment(params),
            "explain_reasoning" => self.explain_reasoning(params),
            "update_memory_state" => self.update_memory_state(params),
            "forget_memory" => self.forget_memory(params),
            "evolve_memory" => self.evolve_memory(params),
            "consolidate_memories" => self.consolidate_memories(params),
            "detect_contradictions" => self.detect_contradictions(params),
            "update_memory" => self.update_memory(params),
            "get_session_context" => self.get_session_context(params),
            "traverse_memory_graph" => self.traverse_memory_graph(params),
            "restore_memory" => self.restore_memory(params),
            "list_deleted_memories" => self.list_deleted_memories(params),
            "get_evolution_chain" => self.get_evolution_chain(params),
            "create_project" => self.create_project(params),
            "add_project_item" => self.add_project_item(params),
            "get_project_tree" => self.get_project_tree(params),
            "list_projects" => self.list_projects(params),
            other => Err(MementoError::InvalidInput(format!(
                "unknown method: {other}"
            ))),
        }
    }

    fn store_memory(&self, params: Value) -> Result<Value> {
        let input: CreateMemoryInput = from_params(params)?;
        let storage = self.registry.resolve_scope(input.domain.as_deref())?;
        storage.with_connection(|conn| {
            let outcome = store_memory(conn, &input)?;
            self.enrichment
                .offer(outcome.memory.id.clone(), outcome.memory.content.clone());
            Ok(json!({
                "memory": outcome.memory,
                "duplicate": outcome.duplicate,
                "existing_id": outcome.existing_id,
            }))
        })
    }

    fn recall_memory(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let memory = get_memory(conn, &args.id)?;
            Ok(json!({ "found": memory.is_some(), "memory": memory }))
        })
    }

    fn find_related(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            query: String,
            #[serde(default)]
            query_vector: Vec<f64>,
            connection_id: Option<String>,
            #[serde(default = "default_limit")]
            limit: u32,
            #[serde(default)]
            offset: u32,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_scope(args.connection_id.as_deref())?;
        storage.with_connection(|conn| {
            let results = hybrid_search(
                conn,
                &args.query,
                &args.query_vector,
                args.limit,
                args.offset,
            )?;
            Ok(json!({ "results": results }))
        })
    }

    fn retry_enrichment(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let memory = get_memory(conn, &args.id)?
                .ok_or_else(|| MementoError::NotFound(args.id.clone()))?;
            let offered = self
                .enrichment
                .offer(memory.id.clone(), memory.content.clone());
            Ok(json!({ "offered": offered }))
        })
    }

    fn explain_reasoning(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let chain = get_evolution_chain(conn, &args.id)?;
            let related = get_related_memories(conn, &args.id)?;
            Ok(json!({ "evolution_chain": chain, "related": related }))
        })
    }

    fn update_memory_state(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            id: String,
            state: MemoryState,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let memory = update_state(conn, &args.id, args.state)?;
            Ok(json!({ "memory": memory }))
        })
    }

    fn forget_memory(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            crate::storage::queries::delete_memory(conn, &args.id)?;
            Ok(json!({ "ok": true }))
        })
    }

    fn evolve_memory(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            id: String,
            content: String,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let memory = evolve(conn, &self.enrichment, &args.id, &args.content)?;
            Ok(json!({ "memory": memory }))
        })
    }

    fn consolidate_memories(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            ids: Option<Vec<String>>,
            query: Option<String>,
            title: Option<String>,
            connection_id: Option<String>,
        }
        let args: Args = from_params(params)?;
        let scope = args.ids.as_ref().and_then(|ids| ids.first()).cloned();
        let storage = match (&scope, &args.connection_id) {
            (Some(id), _) => self.registry.resolve_for_id(id)?,
            (None, conn_id) => self.registry.resolve_scope(conn_id.as_deref())?,
        };
        storage.with_connection(|conn| {
            let result = consolidate(
                conn,
                &self.enrichment,
                args.ids.as_deref(),
                args.query.as_deref(),
                args.title.as_deref(),
            )?;
            Ok(json!({ "result": result }))
        })
    }

    fn detect_contradictions(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            memory_id: Option<String>,
            connection_id: Option<String>,
        }
        let args: Args = from_params(params)?;
        let storage = match &args.memory_id {
            Some(id) => self.registry.resolve_for_id(id)?,
            None => self.registry.resolve_scope(args.connection_id.as_deref())?,
        };
        storage.with_connection(|conn| {
            let findings = detect_contradictions(conn, args.memory_id.as_deref())?;
            Ok(json!({ "contradictions": findings }))
        })
    }

    fn update_memory(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            id: String,
            #[serde(flatten)]
            input: UpdateMemoryInput,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let memory = update_memory(conn, &args.id, &args.input)?;
            Ok(json!({ "memory": memory }))
        })
    }

    fn get_session_context(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            session_id: String,
            connection_id: Option<String>,
            #[serde(default = "default_limit")]
            limit: u32,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_scope(args.connection_id.as_deref())?;
        storage.with_connection(|conn| {
            let memories = list_memories(
                conn,
                &ListOptions {
                    session_id: Some(args.session_id.clone()),
                    limit: args.limit,
                    ..Default::default()
                },
            )?;
            Ok(json!({ "memories": memories }))
        })
    }

    fn traverse_memory_graph(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            memory_id: String,
            #[serde(default = "default_max_hops")]
            max_hops: u32,
            #[serde(default = "default_limit")]
            limit: u32,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.memory_id)?;
        storage.with_connection(|conn| {
            let results = traverse_memory_graph(conn, &args.memory_id, args.max_hops, args.limit)?;
            Ok(json!({ "results": results }))
        })
    }

    fn restore_memory(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            restore_memory(conn, &args.id)?;
            Ok(json!({ "ok": true }))
        })
    }

    fn list_deleted_memories(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            connection_id: Option<String>,
            #[serde(default = "default_page")]
            page: u32,
            #[serde(default = "default_limit")]
            limit: u32,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_scope(args.connection_id.as_deref())?;
        storage.with_connection(|conn| {
            let memories = list_memories(
                conn,
                &ListOptions {
                    only_deleted: true,
                    page: args.page,
                    limit: args.limit,
                    ..Default::default()
                },
            )?;
            Ok(json!({ "memories": memories }))
        })
    }

    fn get_evolution_chain(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let chain = get_evolution_chain(conn, &args.id)?;
            Ok(json!({ "chain": chain }))
        })
    }

    fn create_project(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            content: String,
            domain: Option<String>,
            #[serde(default)]
            tags: Vec<String>,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_scope(args.domain.as_deref())?;
        storage.with_connection(|conn| {
            let memory = create_project(
                conn,
                CreateMemoryInput {
                    content: args.content.clone(),
                    domain: args.domain.clone(),
                    tags: args.tags.clone(),
                    ..Default::default()
                },
            )?;
            Ok(json!({ "memory": memory }))
        })
    }

    fn add_project_item(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            parent_id: String,
            content: String,
            #[serde(rename = "type", default)]
            memory_type: crate::types::MemoryType,
            #[serde(default)]
            tags: Vec<String>,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.parent_id)?;
        storage.with_connection(|conn| {
            let memory = add_project_item(
                conn,
                &args.parent_id,
                CreateMemoryInput {
                    content: args.content.clone(),
                    memory_type: args.memory_type,
                    tags: args.tags.clone(),
                    ..Default::default()
                },
            )?;
            Ok(json!({ "memory": memory }))
        })
    }

    fn get_project_tree(&self, params: Value) -> Result<Value> {
        let args: IdArgs = from_params(params)?;
        let storage = self.registry.resolve_for_id(&args.id)?;
        storage.with_connection(|conn| {
            let tree = get_project_tree(conn, &args.id)?;
            Ok(json!({ "tree": tree }))
        })
    }

    fn list_projects(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize, Default)]
        struct Args {
            connection_id: Option<String>,
        }
        let args: Args = from_params(params)?;
        let storage = self.registry.resolve_scope(args.connection_id.as_deref())?;
        storage.with_connection(|conn| {
            let projects = list_projects(conn)?;
            Ok(json!({ "projects": projects }))
        })
    }
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

fn default_limit() -> u32 {
    20
}

fn default_page() -> u32 {
    1
}

fn default_max_hops() -> u32 {
    crate::graph::DEFAULT_MAX_HOPS
}

fn from_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| MementoError::InvalidInput(e.to_string()))
}

impl McpHandler for Dispatcher {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        if request.jsonrpc != "2.0" {
            return McpResponse::error(
                request.id,
                -32600,
                "invalid request: unsupported jsonrpc version".to_string(),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "notifications/initialized" | "initialized" => {
                McpResponse::success(request.id, Value::Null)
            }
            "tools/list" => {
                let tools: Vec<ToolDefinition> = get_tool_definitions();
                McpResponse::success(request.id, json!({ "tools": tools }))
            }
            "tools/call" => self.handle_tool_call(request),
            method => match self.dispatch_domain(method, request.params) {
                Ok(value) => McpResponse::success(request.id, value),
                Err(err) if err.code() == -32602 && method_unknown(&err) => {
                    McpResponse::error(request.id, -32601, format!("method not found: {method}"))
                }
                Err(err) => McpResponse::from_error(request.id, err),
            },
        }
    }
}

impl Dispatcher {
    /// `initialize` (spec §4.9 step 2): a client-supplied `protocolVersion`
    /// that doesn't match the server's supported version is an
    /// invalid-request reply, not a silent downgrade/upgrade.
    fn handle_initialize(&self, request: McpRequest) -> McpResponse {
        #[derive(Deserialize, Default)]
        struct InitializeParams {
            #[serde(rename = "protocolVersion", default)]
            protocol_version: Option<String>,
        }
        let params: InitializeParams = if request.params.is_null() {
            InitializeParams::default()
        } else {
            match from_params(request.params) {
                Ok(p) => p,
                Err(err) => return McpResponse::from_error(request.id, err),
            }
        };

        let result = InitializeResult::default();
        if let Some(requested) = &params.protocol_version {
            if requested != &result.protocol_version {
                return McpResponse::error(
                    request.id,
                    -32600,
                    format!(
                        "invalid request: unsupported protocolVersion {requested} (server supports {})",
                        result.protocol_version
                    ),
                );
            }
        }

        McpResponse::success(
            request.id,
            serde_json::to_value(result).unwrap_or(Value::Null),
        )
    }

    fn handle_tool_call(&self, request: McpRequest) -> McpResponse {
        #[derive(Deserialize)]
        struct ToolCallParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }
        let params: ToolCallParams = match from_params(request.params) {
            Ok(p) => p,
            Err(err) => return McpResponse::from_error(request.id, err),
        };
        match self.dispatch_domain(&params.name, params.arguments) {
            Ok(value) => McpResponse::success(
                request.id,
                serde_json::to_value(ToolCallResult::json(&value)).unwrap_or(Value::Null),
            ),
            Err(err) => McpResponse::success(
                request.id,
                serde_json::to_value(ToolCallResult::error(err.to_string())).unwrap_or(Value::Null),
            ),
        }
    }
}

fn method_unknown(err: &MementoError) -> bool {
    matches!(err, MementoError::InvalidInput(msg) if msg.starts_with("unknown method:"))
}
