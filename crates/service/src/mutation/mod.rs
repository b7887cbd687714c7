//! The shared mutation pipeline: options, the per-operation context that owns
//! the transaction, and the helpers every write goes through.

use std::fmt;
use std::sync::Arc;

use models::PrimaryKey;

use crate::errors::ServiceError;
use crate::events::{ActionCollector, EventSink};

pub mod context;
pub mod integrity;
pub mod revisions;
pub mod tracker;

pub use context::MutationContext;
pub use integrity::{UserIntegrityCheckFlag, UserIntegrityChecker};
pub use revisions::{RevisionAction, RevisionRecorder};
pub use tracker::MutationTracker;

/// Called once per mutated key, after the write.
pub type RevisionCallback = Arc<dyn Fn(&PrimaryKey) + Send + Sync>;
/// Notified with the combined flags when an integrity check becomes due.
pub type IntegrityObserver = Arc<dyn Fn(UserIntegrityCheckFlag) + Send + Sync>;

/// Per-call mutation switches. Everything is enabled by default; bypasses are off.
#[derive(Clone)]
pub struct MutationOptions {
    pub on_revision_create: Option<RevisionCallback>,
    pub auto_purge_cache: bool,
    /// Also purge the system cache when a system collection changes.
    pub auto_purge_system_cache: bool,
    /// `false` suppresses action events entirely, collector included.
    pub emit_events: bool,
    pub event_sink: EventSink,
    pub bypass_limits: bool,
    /// Tracker to count against instead of a fresh one.
    pub mutation_tracker: Option<MutationTracker>,
    /// Raised before anything is written.
    pub pre_mutation_error: Option<ServiceError>,
    pub bypass_auto_increment_sequence_reset: bool,
    pub user_integrity_check_flags: UserIntegrityCheckFlag,
    pub on_require_user_integrity_check: Option<IntegrityObserver>,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            on_revision_create: None,
            auto_purge_cache: true,
            auto_purge_system_cache: true,
            emit_events: true,
            event_sink: EventSink::Emit,
            bypass_limits: false,
            mutation_tracker: None,
            pre_mutation_error: None,
            bypass_auto_increment_sequence_reset: false,
            user_integrity_check_flags: UserIntegrityCheckFlag::empty(),
            on_require_user_integrity_check: None,
        }
    }
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("on_revision_create", &self.on_revision_create.is_some())
            .field("auto_purge_cache", &self.auto_purge_cache)
            .field("auto_purge_system_cache", &self.auto_purge_system_cache)
            .field("emit_events", &self.emit_events)
            .field("event_sink", &self.event_sink)
            .field("bypass_limits", &self.bypass_limits)
            .field("mutation_tracker", &self.mutation_tracker)
            .field("pre_mutation_error", &self.pre_mutation_error)
            .field("bypass_auto_increment_sequence_reset", &self.bypass_auto_increment_sequence_reset)
            .field("user_integrity_check_flags", &self.user_integrity_check_flags)
            .field("on_require_user_integrity_check", &self.on_require_user_integrity_check.is_some())
            .finish()
    }
}

impl MutationOptions {
    pub fn new() -> Self { Self::default() }

    pub fn without_events(mut self) -> Self {
        self.emit_events = false;
        self
    }

    pub fn without_cache_purge(mut self) -> Self {
        self.auto_purge_cache = false;
        self.auto_purge_system_cache = false;
        self
    }

    pub fn collect_actions(mut self, collector: ActionCollector) -> Self {
        self.event_sink = EventSink::Collect(collector);
        self
    }

    pub fn with_tracker(mut self, tracker: MutationTracker) -> Self {
        self.mutation_tracker = Some(tracker);
        self
    }

    pub fn bypass_limits(mut self) -> Self {
        self.bypass_limits = true;
        self
    }

    pub fn on_revision(mut self, callback: impl Fn(&PrimaryKey) + Send + Sync + 'static) -> Self {
        self.on_revision_create = Some(Arc::new(callback));
        self
    }

    pub fn fail_with(mut self, error: ServiceError) -> Self {
        self.pre_mutation_error = Some(error);
        self
    }

    pub fn request_integrity_check(mut self, flags: UserIntegrityCheckFlag) -> Self {
        self.user_integrity_check_flags |= flags;
        self
    }

    pub fn on_integrity_check(mut self, observer: impl Fn(UserIntegrityCheckFlag) + Send + Sync + 'static) -> Self {
        self.on_require_user_integrity_check = Some(Arc::new(observer));
        self
    }

    /// Options for a call made on behalf of this one: same switches, but the
    /// revision callback and pre-mutation error stay with the outer call.
    pub fn for_nested(&self) -> Self {
        Self { on_revision_create: None, pre_mutation_error: None, ..self.clone() }
    }
}
