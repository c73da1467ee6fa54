//! Security module for Kestrel: danger detection, permission gate, path
//! resolution, safety limits and audit logging.
//!
//! Provides:
//! - **Danger detection**: an ordered deny-list of destructive shell patterns
//! - **Permission gate**: scoped allow/deny decisions for writes and shell commands
//! - **Path resolution**: absolute, normalized paths for permission keys
//! - **Limits**: file size, iteration and per-turn tool budgets
//! - **Audit logging**: a structured record of every decision

pub mod audit;
pub mod danger;
pub mod limits;
pub mod path;
pub mod permission;

pub use audit::{
    AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink, DEFAULT_AUDIT_RETENTION,
};
pub use danger::{is_dangerous, DangerPattern, DANGER_PATTERNS};
pub use limits::SafetyLimits;
pub use path::resolve_path;
pub use permission::{
    FilePolicyStore, MemoryPolicyStore, Operation, PermissionChoice, PermissionDenied,
    PermissionGate, PermissionPrompt, PermissionRequest, PolicyStore,
};
