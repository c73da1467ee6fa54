//! Scoped permission gate for file mutations and shell commands.
//!
//! Every mutating tool call asks the gate before touching anything. A check
//! resolves in this order:
//!
//! 1. Session blanket grant (`allow all writes` / `allow all bash`)
//! 2. Session cache for the exact resource (absolute path or command string)
//! 3. Persistent policy for (working directory, operation)
//! 4. Ask the operator through the [`PermissionPrompt`] port
//!
//! Dangerous shell commands additionally require a fresh confirmation on
//! every call. That confirmation is never cached and no grant skips it.

use async_trait::async_trait;
use kestrel_config::{ConfigError, PermissionPolicies, PolicyDecision};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::danger::is_dangerous;

/// Operations the gate knows about. The string form is the tool name and
/// is what persistent policies are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    WriteFile,
    EditFile,
    CreateDirectory,
    RunBash,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::WriteFile => "write_file",
            Operation::EditFile => "edit_file",
            Operation::CreateDirectory => "create_directory",
            Operation::RunBash => "run_bash",
        }
    }

    fn is_file_operation(&self) -> bool {
        !matches!(self, Operation::RunBash)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five answers an operator can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChoice {
    AllowOnce,
    AllowSession,
    AllowAlwaysInDirectory,
    DenyOnce,
    DenyAlwaysInDirectory,
}

impl PermissionChoice {
    /// All choices in the order they are offered.
    pub const ALL: [PermissionChoice; 5] = [
        PermissionChoice::AllowOnce,
        PermissionChoice::AllowSession,
        PermissionChoice::AllowAlwaysInDirectory,
        PermissionChoice::DenyOnce,
        PermissionChoice::DenyAlwaysInDirectory,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PermissionChoice::AllowOnce => "Yes, just this once",
            PermissionChoice::AllowSession => "Yes, for this conversation",
            PermissionChoice::AllowAlwaysInDirectory => "Yes, always in this directory",
            PermissionChoice::DenyOnce => "No, not this time",
            PermissionChoice::DenyAlwaysInDirectory => "No, never in this directory",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(
            self,
            PermissionChoice::AllowOnce
                | PermissionChoice::AllowSession
                | PermissionChoice::AllowAlwaysInDirectory
        )
    }

    fn source(&self) -> &'static str {
        match self {
            PermissionChoice::AllowOnce | PermissionChoice::DenyOnce => "once",
            PermissionChoice::AllowSession => "session",
            PermissionChoice::AllowAlwaysInDirectory => "persistent_allow",
            PermissionChoice::DenyAlwaysInDirectory => "persistent_deny",
        }
    }
}

/// What the operator is being asked about.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub operation: Operation,
    /// Absolute path, or the command string for `run_bash`
    pub resource: String,
    pub directory: PathBuf,
}

/// The interactive port. The gate blocks on these calls.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask which of [`PermissionChoice::ALL`] applies. `None` means the
    /// operator cancelled, which counts as a one-off denial.
    async fn choose(&self, request: &PermissionRequest) -> Option<PermissionChoice>;

    /// Yes/no confirmation for a command that matched the danger table.
    async fn confirm_dangerous(&self, command: &str, description: &str) -> bool;
}

/// Where "always"/"never" decisions are kept between sessions.
pub trait PolicyStore: Send + Sync {
    fn get(&self, directory: &Path, operation: Operation) -> Option<PolicyDecision>;
    fn set(
        &self,
        directory: &Path,
        operation: Operation,
        decision: PolicyDecision,
    ) -> Result<(), ConfigError>;
}

/// A [`PolicyStore`] backed by `permissions.toml`. Re-read on every lookup.
pub struct FilePolicyStore {
    path: PathBuf,
}

impl FilePolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicyStore for FilePolicyStore {
    fn get(&self, directory: &Path, operation: Operation) -> Option<PolicyDecision> {
        match PermissionPolicies::load_from(&self.path) {
            Ok(policies) => policies.lookup(&directory.to_string_lossy(), operation.as_str()),
            Err(e) => {
                warn!(error = %e, "Failed to read permission policies");
                None
            }
        }
    }

    fn set(
        &self,
        directory: &Path,
        operation: Operation,
        decision: PolicyDecision,
    ) -> Result<(), ConfigError> {
        let mut policies = PermissionPolicies::load_from(&self.path)?;
        policies.set(&directory.to_string_lossy(), operation.as_str(), decision);
        policies.save_to(&self.path)
    }
}

/// An in-process [`PolicyStore`].
#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: Mutex<PermissionPolicies>,
}

impl PolicyStore for MemoryPolicyStore {
    fn get(&self, directory: &Path, operation: Operation) -> Option<PolicyDecision> {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(&directory.to_string_lossy(), operation.as_str())
    }

    fn set(
        &self,
        directory: &Path,
        operation: Operation,
        decision: PolicyDecision,
    ) -> Result<(), ConfigError> {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(&directory.to_string_lossy(), operation.as_str(), decision);
        Ok(())
    }
}

/// Why a check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionDenied {
    #[error("{operation} denied for {resource}")]
    Denied { operation: Operation, resource: String },

    #[error("{operation} denied by directory rule for {directory}")]
    DirectoryRule { operation: Operation, directory: String },

    #[error("dangerous command not confirmed ({description})")]
    DangerNotConfirmed { description: String },
}

#[derive(Debug, Default)]
struct SessionGrants {
    allow_all_writes: bool,
    allow_all_bash: bool,
    files: HashSet<PathBuf>,
    commands: HashSet<String>,
}

/// The permission gate for one session.
pub struct PermissionGate {
    working_dir: PathBuf,
    session: Mutex<SessionGrants>,
    store: Option<Arc<dyn PolicyStore>>,
    prompt: Option<Arc<dyn PermissionPrompt>>,
    audit: Arc<AuditLogger>,
    confirm_dangerous: bool,
}

impl PermissionGate {
    /// A gate with no prompt and no persistent store: anything not granted
    /// for the session is denied.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            session: Mutex::new(SessionGrants::default()),
            store: None,
            prompt: None,
            audit: Arc::new(AuditLogger::new()),
            confirm_dangerous: true,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PermissionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Turn off danger confirmation entirely (operator opt-out in config).
    pub fn with_danger_confirmation(mut self, enabled: bool) -> Self {
        self.confirm_dangerous = enabled;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Allow every file write, edit and directory creation for this session.
    pub fn grant_all_writes(&self) {
        self.lock().allow_all_writes = true;
    }

    /// Allow every shell command for this session. Dangerous commands still
    /// need confirmation.
    pub fn grant_all_bash(&self) {
        self.lock().allow_all_bash = true;
    }

    /// Check a file operation on an already-resolved absolute path.
    pub async fn check_file(&self, path: &Path, operation: Operation) -> Result<(), PermissionDenied> {
        debug_assert!(operation.is_file_operation());
        let resource = path.to_string_lossy().into_owned();
        self.check(operation, resource, SessionKey::File(path.to_path_buf()))
            .await
    }

    /// Check a shell command: danger confirmation first, then the gate.
    pub async fn check_bash(&self, command: &str) -> Result<(), PermissionDenied> {
        if let Some(description) = is_dangerous(command) {
            self.confirm_danger(command, description).await?;
        }
        self.check(
            Operation::RunBash,
            command.to_string(),
            SessionKey::Command(command.to_string()),
        )
        .await
    }

    async fn confirm_danger(&self, command: &str, description: &str) -> Result<(), PermissionDenied> {
        let event = AuditEvent::DangerousCommand {
            description: description.to_string(),
        };
        if !self.confirm_dangerous {
            warn!(command, description, "Dangerous command allowed without confirmation");
            self.audit.log(event, command, AuditOutcome::Allowed, "config");
            return Ok(());
        }

        let confirmed = match &self.prompt {
            Some(prompt) => prompt.confirm_dangerous(command, description).await,
            None => false,
        };
        let outcome = if confirmed {
            AuditOutcome::Allowed
        } else {
            AuditOutcome::Denied
        };
        self.audit.log(event, command, outcome, "prompt");

        if confirmed {
            Ok(())
        } else {
            warn!(command, description, "Dangerous command declined");
            Err(PermissionDenied::DangerNotConfirmed {
                description: description.to_string(),
            })
        }
    }

    async fn check(
        &self,
        operation: Operation,
        resource: String,
        key: SessionKey,
    ) -> Result<(), PermissionDenied> {
        if let Some(source) = self.session_grant(operation, &key) {
            self.record(operation, &resource, AuditOutcome::Allowed, source);
            return Ok(());
        }

        if let Some(store) = &self.store {
            match store.get(&self.working_dir, operation) {
                Some(PolicyDecision::Allow) => {
                    self.record(operation, &resource, AuditOutcome::Allowed, "policy");
                    return Ok(());
                }
                Some(PolicyDecision::Deny) => {
                    self.record(operation, &resource, AuditOutcome::Denied, "policy");
                    return Err(PermissionDenied::DirectoryRule {
                        operation,
                        directory: self.working_dir.display().to_string(),
                    });
                }
                None => {}
            }
        }

        let request = PermissionRequest {
            operation,
            resource: resource.clone(),
            directory: self.working_dir.clone(),
        };
        let choice = match &self.prompt {
            Some(prompt) => prompt.choose(&request).await,
            None => None,
        };
        let Some(choice) = choice else {
            self.record(operation, &resource, AuditOutcome::Denied, "no_answer");
            return Err(PermissionDenied::Denied { operation, resource });
        };

        self.apply_choice(operation, key, choice);
        let outcome = if choice.is_allow() {
            AuditOutcome::Allowed
        } else {
            AuditOutcome::Denied
        };
        self.record(operation, &resource, outcome, choice.source());

        if choice.is_allow() {
            Ok(())
        } else {
            Err(PermissionDenied::Denied { operation, resource })
        }
    }

    fn session_grant(&self, operation: Operation, key: &SessionKey) -> Option<&'static str> {
        let session = self.lock();
        let blanket = if operation.is_file_operation() {
            session.allow_all_writes
        } else {
            session.allow_all_bash
        };
        if blanket {
            return Some("session_all");
        }
        let cached = match key {
            SessionKey::File(path) => session.files.contains(path),
            SessionKey::Command(cmd) => session.commands.contains(cmd),
        };
        cached.then_some("session")
    }

    fn apply_choice(&self, operation: Operation, key: SessionKey, choice: PermissionChoice) {
        let persist = |decision| {
            let Some(store) = &self.store else {
                return false;
            };
            match store.set(&self.working_dir, operation, decision) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, %operation, "Failed to persist permission decision");
                    false
                }
            }
        };

        match choice {
            PermissionChoice::AllowSession => self.remember(key),
            PermissionChoice::AllowAlwaysInDirectory => {
                if !persist(PolicyDecision::Allow) {
                    // Without a store the grant lasts for the session
                    self.remember(key);
                }
            }
            PermissionChoice::DenyAlwaysInDirectory => {
                persist(PolicyDecision::Deny);
            }
            PermissionChoice::AllowOnce | PermissionChoice::DenyOnce => {}
        }
    }

    fn remember(&self, key: SessionKey) {
        let mut session = self.lock();
        match key {
            SessionKey::File(path) => {
                session.files.insert(path);
            }
            SessionKey::Command(cmd) => {
                session.commands.insert(cmd);
            }
        }
    }

    fn record(&self, operation: Operation, resource: &str, outcome: AuditOutcome, source: &str) {
        debug!(%operation, resource, ?outcome, source, "Permission decision");
        self.audit.log(
            AuditEvent::PermissionCheck {
                operation: operation.to_string(),
            },
            resource,
            outcome,
            source,
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionGrants> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum SessionKey {
    File(PathBuf),
    Command(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted answers and counts how often it was asked.
    #[derive(Default)]
    struct ScriptedPrompt {
        choices: Mutex<VecDeque<PermissionChoice>>,
        confirmations: Mutex<VecDeque<bool>>,
        asked: Mutex<usize>,
        danger_asked: Mutex<usize>,
    }

    impl ScriptedPrompt {
        fn choosing(choices: &[PermissionChoice]) -> Self {
            Self {
                choices: Mutex::new(choices.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn confirming(mut self, answers: &[bool]) -> Self {
            self.confirmations = Mutex::new(answers.iter().copied().collect());
            self
        }

        fn asked(&self) -> usize {
            *self.asked.lock().unwrap()
        }

        fn danger_asked(&self) -> usize {
            *self.danger_asked.lock().unwrap()
        }
    }

    #[async_trait]
    impl PermissionPrompt for ScriptedPrompt {
        async fn choose(&self, _request: &PermissionRequest) -> Option<PermissionChoice> {
            *self.asked.lock().unwrap() += 1;
            self.choices.lock().unwrap().pop_front()
        }

        async fn confirm_dangerous(&self, _command: &str, _description: &str) -> bool {
            *self.danger_asked.lock().unwrap() += 1;
            self.confirmations.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    fn gate(prompt: Arc<ScriptedPrompt>) -> PermissionGate {
        PermissionGate::new("/work").with_prompt(prompt)
    }

    #[tokio::test]
    async fn no_prompt_means_denied() {
        let gate = PermissionGate::new("/work");
        let err = gate
            .check_file(Path::new("/work/a.txt"), Operation::WriteFile)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionDenied::Denied { .. }));
    }

    #[tokio::test]
    async fn allow_once_asks_again() {
        let prompt = Arc::new(ScriptedPrompt::choosing(&[
            PermissionChoice::AllowOnce,
            PermissionChoice::DenyOnce,
        ]));
        let gate = gate(prompt.clone());
        let path = Path::new("/work/a.txt");
        assert!(gate.check_file(path, Operation::WriteFile).await.is_ok());
        assert!(gate.check_file(path, Operation::WriteFile).await.is_err());
        assert_eq!(prompt.asked(), 2);
    }

    #[tokio::test]
    async fn session_grant_is_per_path() {
        let prompt = Arc::new(ScriptedPrompt::choosing(&[
            PermissionChoice::AllowSession,
            PermissionChoice::DenyOnce,
        ]));
        let gate = gate(prompt.clone());
        let a = Path::new("/work/a.txt");
        assert!(gate.check_file(a, Operation::WriteFile).await.is_ok());
        assert!(gate.check_file(a, Operation::EditFile).await.is_ok());
        assert_eq!(prompt.asked(), 1);

        assert!(gate
            .check_file(Path::new("/work/b.txt"), Operation::WriteFile)
            .await
            .is_err());
        assert_eq!(prompt.asked(), 2);
    }

    #[tokio::test]
    async fn blanket_write_grant_skips_prompt() {
        let prompt = Arc::new(ScriptedPrompt::default());
        let gate = gate(prompt.clone());
        gate.grant_all_writes();
        assert!(gate
            .check_file(Path::new("/work/x"), Operation::CreateDirectory)
            .await
            .is_ok());
        assert_eq!(prompt.asked(), 0);
        // Writes grant does not cover bash
        assert!(gate.check_bash("ls").await.is_err());
    }

    #[tokio::test]
    async fn persistent_policy_is_consulted() {
        let store = Arc::new(MemoryPolicyStore::default());
        store
            .set(Path::new("/work"), Operation::RunBash, PolicyDecision::Allow)
            .unwrap();
        store
            .set(Path::new("/work"), Operation::WriteFile, PolicyDecision::Deny)
            .unwrap();
        let prompt = Arc::new(ScriptedPrompt::default());
        let gate = gate(prompt.clone()).with_store(store);

        assert!(gate.check_bash("cargo build").await.is_ok());
        let err = gate
            .check_file(Path::new("/work/a"), Operation::WriteFile)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionDenied::DirectoryRule { .. }));
        assert_eq!(prompt.asked(), 0);
    }

    #[tokio::test]
    async fn always_choices_persist() {
        let store = Arc::new(MemoryPolicyStore::default());
        let prompt = Arc::new(ScriptedPrompt::choosing(&[
            PermissionChoice::AllowAlwaysInDirectory,
            PermissionChoice::DenyAlwaysInDirectory,
        ]));
        let gate = gate(prompt.clone()).with_store(store.clone());

        assert!(gate
            .check_file(Path::new("/work/a"), Operation::EditFile)
            .await
            .is_ok());
        assert!(gate.check_bash("make").await.is_err());
        assert_eq!(
            store.get(Path::new("/work"), Operation::EditFile),
            Some(PolicyDecision::Allow)
        );
        assert_eq!(
            store.get(Path::new("/work"), Operation::RunBash),
            Some(PolicyDecision::Deny)
        );

        // Both now resolve from the store without asking
        assert!(gate
            .check_file(Path::new("/work/other"), Operation::EditFile)
            .await
            .is_ok());
        assert!(gate.check_bash("make test").await.is_err());
        assert_eq!(prompt.asked(), 2);
    }

    #[tokio::test]
    async fn bash_session_cache_keyed_by_command() {
        let prompt = Arc::new(ScriptedPrompt::choosing(&[PermissionChoice::AllowSession]));
        let gate = gate(prompt.clone());
        assert!(gate.check_bash("cargo test").await.is_ok());
        assert!(gate.check_bash("cargo test").await.is_ok());
        assert!(gate.check_bash("cargo test --release").await.is_err());
        assert_eq!(prompt.asked(), 2);
    }

    #[tokio::test]
    async fn dangerous_command_always_reconfirmed() {
        let prompt = Arc::new(
            ScriptedPrompt::choosing(&[PermissionChoice::AllowSession]).confirming(&[true, false]),
        );
        let gate = gate(prompt.clone());
        gate.grant_all_bash();

        assert!(gate.check_bash("sudo ls").await.is_ok());
        let err = gate.check_bash("sudo ls").await.unwrap_err();
        assert_eq!(
            err,
            PermissionDenied::DangerNotConfirmed {
                description: "Elevated privileges".into()
            }
        );
        assert_eq!(prompt.danger_asked(), 2);
    }

    #[tokio::test]
    async fn persistent_allow_does_not_skip_danger_confirmation() {
        let store = Arc::new(MemoryPolicyStore::default());
        store
            .set(Path::new("/work"), Operation::RunBash, PolicyDecision::Allow)
            .unwrap();
        let prompt = Arc::new(ScriptedPrompt::default().confirming(&[false]));
        let gate = gate(prompt.clone()).with_store(store);

        assert!(gate.check_bash("rm -rf /").await.is_err());
        assert_eq!(prompt.danger_asked(), 1);
        assert_eq!(gate.audit().entries_by_outcome(AuditOutcome::Denied).len(), 1);
    }

    #[tokio::test]
    async fn danger_confirmation_can_be_disabled() {
        let gate = PermissionGate::new("/work").with_danger_confirmation(false);
        gate.grant_all_bash();
        assert!(gate.check_bash("sudo true").await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_prompt_denies() {
        let prompt = Arc::new(ScriptedPrompt::default());
        let gate = gate(prompt);
        assert!(gate
            .check_file(Path::new("/work/a"), Operation::WriteFile)
            .await
            .is_err());
    }

    #[test]
    fn file_policy_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePolicyStore::new(dir.path().join("permissions.toml"));
        assert_eq!(store.get(Path::new("/w"), Operation::WriteFile), None);
        store
            .set(Path::new("/w"), Operation::WriteFile, PolicyDecision::Allow)
            .unwrap();
        assert_eq!(
            store.get(Path::new("/w"), Operation::WriteFile),
            Some(PolicyDecision::Allow)
        );
    }

    #[test]
    fn choices_in_prompt_order() {
        let labels: Vec<_> = PermissionChoice::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels[0], "Yes, just this once");
        assert_eq!(labels[4], "No, never in this directory");
    }
}
