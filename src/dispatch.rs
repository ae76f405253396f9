//! Tool-call dispatch.
//!
//! Agents drive the index through named tools with JSON arguments. The set of
//! tools is fixed: [`ToolRegistry::global`] builds it once and hands out a
//! shared reference from then on.

use crate::config::ConfigOverrides;
use crate::error::IndexError;
use crate::state::IndexState;
use crate::types::{DeletionCandidate, StaleFilesReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Every tool the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Scan,
    DeadCodeAnalyze,
    StaleFilesAnalyze,
    SessionOpen,
    SessionAddFile,
    SessionAddQuery,
    SessionAddEdit,
    SessionBoost,
    SessionEvictExpired,
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub tool: Tool,
    pub description: &'static str,
}

/// Immutable name -> tool table.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static ToolRegistry {
        static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::build)
    }

    fn build() -> Self {
        let specs = [
            (
                "scan",
                Tool::Scan,
                "Scan the workspace and publish a new graph. Options: stale_days, ambiguity",
            ),
            (
                "dead_code_analyze",
                Tool::DeadCodeAnalyze,
                "Report symbols unreachable from exported, test and entry-file roots",
            ),
            (
                "stale_files_analyze",
                Tool::StaleFilesAnalyze,
                "Report files without commits for stale_days days, plus untracked files",
            ),
            ("session_open", Tool::SessionOpen, "Create or resume a session"),
            ("session_add_file", Tool::SessionAddFile, "Record a viewed file"),
            ("session_add_query", Tool::SessionAddQuery, "Record a search query"),
            ("session_add_edit", Tool::SessionAddEdit, "Record an edited file"),
            (
                "session_boost",
                Tool::SessionBoost,
                "Ranking boost of a path for a session (1.0 is neutral)",
            ),
            (
                "session_evict_expired",
                Tool::SessionEvictExpired,
                "Drop sessions idle past the expiry window",
            ),
        ];
        let tools = specs
            .into_iter()
            .map(|(name, tool, description)| {
                (
                    name,
                    ToolSpec {
                        name,
                        tool,
                        description,
                    },
                )
            })
            .collect();
        Self { tools }
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }
}

/// A tool invocation as sent by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

// ============================================================================
// Tool Argument Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScanRequest {
    #[serde(flatten)]
    overrides: ConfigOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeadCodeRequest {
    /// Scan again before analyzing
    rescan: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StaleFilesRequest {
    #[serde(flatten)]
    overrides: ConfigOverrides,
    /// Also cross-reference the dead code report
    candidates: bool,
}

#[derive(Debug, Deserialize)]
struct SessionRequest {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionPathRequest {
    session_id: String,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SessionQueryRequest {
    session_id: String,
    query: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EvictRequest {
    /// Evaluate expiry this many seconds in the future
    after_secs: u64,
}

#[derive(Debug, Serialize)]
struct StaleFilesResponse {
    #[serde(flatten)]
    report: StaleFilesReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletion_candidates: Option<Vec<DeletionCandidate>>,
}

#[derive(Debug, Serialize)]
struct BoostResponse {
    session_id: String,
    path: PathBuf,
    score: f64,
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run one tool call against `state` and return its JSON result.
pub async fn dispatch(state: &IndexState, call: &ToolCall) -> Result<Value, IndexError> {
    let spec = ToolRegistry::global()
        .lookup(&call.name)
        .ok_or_else(|| IndexError::UnknownTool(call.name.clone()))?;
    debug!(tool = spec.name, "dispatching tool call");

    let arguments = match &call.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };

    match spec.tool {
        Tool::Scan => {
            let req: ScanRequest = serde_json::from_value(arguments)?;
            let summary = state.rescan_with(&req.overrides).await?;
            Ok(serde_json::to_value(summary)?)
        }
        Tool::DeadCodeAnalyze => {
            let req: DeadCodeRequest = serde_json::from_value(arguments)?;
            if req.rescan {
                state.rescan().await?;
            } else {
                state.ensure_scanned().await?;
            }
            Ok(serde_json::to_value(state.dead_code())?)
        }
        Tool::StaleFilesAnalyze => {
            let req: StaleFilesRequest = serde_json::from_value(arguments)?;
            // Reject bad options before scanning
            state.config().with_overrides(&req.overrides)?;
            state.ensure_scanned().await?;
            let report = state.stale_files(&req.overrides).await?;
            let deletion_candidates = req
                .candidates
                .then(|| crate::analysis::deletion_candidates(&report, &state.dead_code()));
            Ok(serde_json::to_value(StaleFilesResponse {
                report,
                deletion_candidates,
            })?)
        }
        Tool::SessionOpen => {
            let req: SessionRequest = serde_json::from_value(arguments)?;
            Ok(serde_json::to_value(state.sessions().open(&req.session_id))?)
        }
        Tool::SessionAddFile => {
            let req: SessionPathRequest = serde_json::from_value(arguments)?;
            state.sessions().add_file(&req.session_id, &req.path)?;
            Ok(serde_json::json!({ "ok": true }))
        }
        Tool::SessionAddQuery => {
            let req: SessionQueryRequest = serde_json::from_value(arguments)?;
            state.sessions().add_query(&req.session_id, &req.query)?;
            Ok(serde_json::json!({ "ok": true }))
        }
        Tool::SessionAddEdit => {
            let req: SessionPathRequest = serde_json::from_value(arguments)?;
            state.sessions().add_edit(&req.session_id, &req.path)?;
            Ok(serde_json::json!({ "ok": true }))
        }
        Tool::SessionBoost => {
            let req: SessionPathRequest = serde_json::from_value(arguments)?;
            let score = state.sessions().boost_score(&req.session_id, &req.path);
            Ok(serde_json::to_value(BoostResponse {
                session_id: req.session_id,
                path: req.path,
                score,
            })?)
        }
        Tool::SessionEvictExpired => {
            let req: EvictRequest = serde_json::from_value(arguments)?;
            let now = Instant::now() + Duration::from_secs(req.after_secs);
            let evicted = state.sessions().evict_expired(now);
            Ok(serde_json::json!({ "evicted": evicted }))
        }
    }
}
