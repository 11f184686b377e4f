//! Per-tenant import exclusivity and cooldown.
//!
//! Import state is process-wide: one record per tenant, created lazily
//! on first access and never torn down. A second import attempt while
//! one runs fails immediately with a busy condition - it does not
//! queue - and after a completed run (success or failure alike) a
//! cooldown window rejects new attempts with the remaining wait.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Cooldown applied after every completed import.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Why an import could not start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// An import is already running for this tenant
    #[error("an import is already running for this tenant")]
    Busy,

    /// The post-import cooldown has not elapsed
    #[error("import cooldown active, retry in {}s", remaining.as_secs())]
    Cooldown { remaining: Duration },
}

#[derive(Debug, Clone, Copy)]
enum TenantState {
    Busy,
    CoolingDown { until: Instant },
}

/// Process-wide import session registry.
#[derive(Debug)]
pub struct SessionService {
    sessions: DashMap<String, TenantState>,
    cooldown: Duration,
}

impl SessionService {
    /// Creates a registry with the default 5-minute cooldown.
    pub fn new() -> Arc<Self> {
        Self::with_cooldown(DEFAULT_COOLDOWN)
    }

    /// Creates a registry with a custom cooldown window.
    pub fn with_cooldown(cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            cooldown,
        })
    }

    /// Claims the tenant's import slot.
    ///
    /// The returned guard releases the slot into cooldown when dropped,
    /// whether the import succeeded or failed.
    pub fn begin(self: &Arc<Self>, tenant: &str) -> Result<SessionGuard, SessionError> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(tenant.to_string()) {
            Entry::Occupied(mut occupied) => match *occupied.get() {
                TenantState::Busy => Err(SessionError::Busy),
                TenantState::CoolingDown { until } => {
                    let now = Instant::now();
                    if now < until {
                        Err(SessionError::Cooldown {
                            remaining: until - now,
                        })
                    } else {
                        occupied.insert(TenantState::Busy);
                        Ok(SessionGuard::new(Arc::clone(self), tenant))
                    }
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(TenantState::Busy);
                Ok(SessionGuard::new(Arc::clone(self), tenant))
            }
        }
    }

    fn finish(&self, tenant: &str) {
        let until = Instant::now() + self.cooldown;
        self.sessions
            .insert(tenant.to_string(), TenantState::CoolingDown { until });
        debug!(tenant, cooldown_secs = self.cooldown.as_secs(), "import slot released");
    }
}

/// Holds a tenant's import slot; dropping it starts the cooldown.
#[derive(Debug)]
pub struct SessionGuard {
    service: Arc<SessionService>,
    tenant: String,
}

impl SessionGuard {
    fn new(service: Arc<SessionService>, tenant: &str) -> Self {
        Self {
            service,
            tenant: tenant.to_string(),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.service.finish(&self.tenant);
    }
}
