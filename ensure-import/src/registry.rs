//! Handler registry and the recovery context that owns it.
//!
//! Callers rebuild their handler on every loop iteration, so handlers are
//! memoized by their construction arguments: the same [`ConfigArgs`] always
//! yields the same handler and its attempt history.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::core::config::{ConfigArgs, ResolvedConfig};
use crate::core::search_path::SearchPath;
use crate::handler::RecoveryHandler;
use crate::io::config::RecoveryConfig;
use crate::io::environment::Environment;
use crate::remediate::TargetCache;

/// Memoized handlers keyed by their construction arguments.
#[derive(Debug, Default)]
pub struct Registry {
    handlers: HashMap<ConfigArgs, RecoveryHandler>,
}

impl Registry {
    /// Existing handler for `args`, or a new one stored for later calls.
    pub fn get_or_create(
        &mut self,
        args: &ConfigArgs,
        max_attempts: u32,
        package_defaults: &BTreeMap<String, String>,
    ) -> &mut RecoveryHandler {
        self.handlers.entry(args.clone()).or_insert_with(|| {
            debug!(?args, "creating recovery handler");
            RecoveryHandler::new(args.clone(), max_attempts, package_defaults)
        })
    }

    pub fn get(&self, args: &ConfigArgs) -> Option<&RecoveryHandler> {
        self.handlers.get(args)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every handler and its attempt history.
    pub fn reset(&mut self) {
        self.handlers.clear();
    }
}

/// Recovery context: environment, policy, handlers and the shared search path.
///
/// One context drives one logical import-recovery flow. It is not meant to
/// be shared across threads.
#[derive(Debug)]
pub struct Recovery<E: Environment> {
    env: E,
    policy: RecoveryConfig,
    package_defaults: BTreeMap<String, String>,
    registry: Registry,
    search_path: SearchPath,
    targets: TargetCache,
}

impl<E: Environment> Recovery<E> {
    pub fn new(env: E, policy: RecoveryConfig) -> Self {
        let package_defaults = policy.package_defaults();
        Self {
            env,
            policy,
            package_defaults,
            registry: Registry::default(),
            search_path: SearchPath::new(),
            targets: TargetCache::default(),
        }
    }

    /// Start from an existing search path (e.g. the inherited `PYTHONPATH`).
    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Handler for `args`, created on first use.
    pub fn handler(&mut self, args: &ConfigArgs) -> Handle<'_, E> {
        let handler =
            self.registry
                .get_or_create(args, self.policy.max_attempts, &self.package_defaults);
        Handle {
            handler,
            search_path: &mut self.search_path,
            targets: &mut self.targets,
            env: &self.env,
            policy: &self.policy,
        }
    }

    /// Forget all handlers and ensured install targets.
    ///
    /// The search path keeps its entries: it is only ever appended to.
    pub fn reset(&mut self) {
        debug!(handlers = self.registry.len(), "resetting recovery context");
        self.registry.reset();
        self.targets.clear();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn policy(&self) -> &RecoveryConfig {
        &self.policy
    }
}

/// A handler borrowed together with the context state its guard needs.
pub struct Handle<'a, E: Environment> {
    pub(crate) handler: &'a mut RecoveryHandler,
    pub(crate) search_path: &'a mut SearchPath,
    pub(crate) targets: &'a mut TargetCache,
    pub(crate) env: &'a E,
    pub(crate) policy: &'a RecoveryConfig,
}

impl<E: Environment> Handle<'_, E> {
    /// Loop predicate: whether another guarded cycle should run.
    pub fn should_retry(&mut self) -> bool {
        let retry = self.handler.retry_mut().should_retry();
        debug!(
            retry,
            attempt = self.handler.retry().attempt_count(),
            "retry predicate read"
        );
        retry
    }

    pub fn attempt_count(&self) -> u32 {
        self.handler.retry().attempt_count()
    }

    pub fn max_attempts(&self) -> u32 {
        self.handler.retry().max_attempts()
    }

    /// Whether the most recently completed block finished without an import failure.
    pub fn succeeded(&self) -> bool {
        self.handler.retry().succeeded()
    }

    /// Raw "still trying" flag, read without side effects.
    pub fn is_trying(&self) -> bool {
        self.handler.retry().still_trying()
    }

    pub fn key(&self) -> &ConfigArgs {
        self.handler.key()
    }

    pub fn config(&self) -> &ResolvedConfig {
        self.handler.config()
    }

    pub fn search_path(&self) -> &SearchPath {
        self.search_path
    }

    pub fn working_directory(&mut self) -> Result<PathBuf> {
        self.handler.working_directory(self.env)
    }
}
