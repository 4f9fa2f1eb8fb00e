//! SyncScheduler - Per-role forced resync cadence
//!
//! Each role moves `Idle → Evaluating → Idle` on every heartbeat, passing
//! through `Invalidating` when at least one watched domain is due. A
//! missed heartbeat is never replayed: the next tick sees a larger elapsed
//! time and resyncs once.

use cache::{CacheTag, TagInvalidator};
use shared::{DataDomain, Millis, Role, SyncConfig, TimeSource};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Evaluating,
    Invalidating,
}

/// Scheduling state for one role
#[derive(Debug, Clone)]
pub struct SyncState {
    pub role: Role,
    pub interval_ms: u64,
    pub watched: Vec<DataDomain>,
    /// Last forced sync per watched domain; never decreases
    pub last_sync_at: BTreeMap<DataDomain, Millis>,
    pub phase: SyncPhase,
    pub forced_syncs: u64,
}

impl SyncState {
    fn new(role: Role, interval_ms: u64, now: Millis) -> Self {
        let watched = DataDomain::watched().to_vec();
        let last_sync_at = watched.iter().map(|d| (*d, now)).collect();
        Self {
            role,
            interval_ms,
            watched,
            last_sync_at,
            phase: SyncPhase::Idle,
            forced_syncs: 0,
        }
    }

    fn is_due(&self, domain: DataDomain, now: Millis) -> bool {
        match self.last_sync_at.get(&domain) {
            Some(last) => now.saturating_sub(*last) >= self.interval_ms,
            None => false,
        }
    }

    /// Most recent forced sync across all watched domains
    pub fn latest_sync(&self) -> Millis {
        self.last_sync_at.values().copied().max().unwrap_or(0)
    }
}

/// What one heartbeat did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub at: Millis,
    pub synced: Vec<(Role, DataDomain)>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty()
    }

    /// Roles that were resynced, in tick order
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.synced.iter().map(|(r, _)| *r).collect();
        roles.dedup();
        roles
    }
}

pub struct SyncScheduler {
    states: RwLock<BTreeMap<Role, SyncState>>,
    time: Arc<dyn TimeSource>,
}

impl SyncScheduler {
    /// Scheduler for the given role intervals. Roles without an interval
    /// are never force-synced.
    pub fn new(intervals: impl IntoIterator<Item = (Role, u64)>, time: Arc<dyn TimeSource>) -> Self {
        let now = time.now_millis();
        let states = intervals
            .into_iter()
            .map(|(role, interval)| (role, SyncState::new(role, interval, now)))
            .collect();
        Self {
            states: RwLock::new(states),
            time,
        }
    }

    pub fn from_config(config: &SyncConfig, time: Arc<dyn TimeSource>) -> Self {
        Self::new(
            config.roles.iter().map(|(r, c)| (*r, c.sync_interval_ms)),
            time,
        )
    }

    /// True once the role's interval has elapsed since its last forced
    /// sync of `domain`. Unwatched domains and unknown roles are never due.
    pub fn should_sync(&self, domain: DataDomain, role: Role) -> bool {
        let now = self.time.now_millis();
        self.read_states()
            .get(&role)
            .is_some_and(|s| s.is_due(domain, now))
    }

    /// Run one heartbeat: invalidate every due (role, domain) view.
    ///
    /// Holds the state lock for the whole tick, so interval updates wait
    /// for an in-flight tick and apply from the next one.
    pub fn tick(&self, invalidator: &dyn TagInvalidator) -> TickReport {
        let now = self.time.now_millis();
        let mut report = TickReport {
            at: now,
            synced: Vec::new(),
        };

        let mut states = self.write_states();
        for state in states.values_mut() {
            state.phase = SyncPhase::Evaluating;

            let due: Vec<DataDomain> = state
                .watched
                .iter()
                .copied()
                .filter(|d| state.is_due(*d, now))
                .collect();

            if !due.is_empty() {
                state.phase = SyncPhase::Invalidating;
                for domain in due {
                    invalidator.invalidate(CacheTag::RoleDomain(state.role, domain));
                    let last = state.last_sync_at.entry(domain).or_insert(now);
                    *last = (*last).max(now);
                    report.synced.push((state.role, domain));
                }
                state.forced_syncs += 1;
                debug!(role = %state.role, at = now, "forced resync");
            }

            state.phase = SyncPhase::Idle;
        }

        report
    }

    /// Apply new intervals from configuration to subsequent ticks.
    /// Last-sync timestamps are preserved.
    pub fn update_intervals(&self, config: &SyncConfig) {
        let now = self.time.now_millis();
        let mut states = self.write_states();
        for (role, role_config) in &config.roles {
            states
                .entry(*role)
                .and_modify(|s| s.interval_ms = role_config.sync_interval_ms)
                .or_insert_with(|| SyncState::new(*role, role_config.sync_interval_ms, now));
        }
        info!(roles = states.len(), "sync intervals updated");
    }

    pub fn state(&self, role: Role) -> Option<SyncState> {
        self.read_states().get(&role).cloned()
    }

    pub fn phase(&self, role: Role) -> Option<SyncPhase> {
        self.read_states().get(&role).map(|s| s.phase)
    }

    pub fn interval_ms(&self, role: Role) -> Option<u64> {
        self.read_states().get(&role).map(|s| s.interval_ms)
    }

    fn read_states(&self) -> RwLockReadGuard<'_, BTreeMap<Role, SyncState>> {
        self.states.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_states(&self) -> RwLockWriteGuard<'_, BTreeMap<Role, SyncState>> {
        self.states.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("states", &*self.read_states())
            .finish_non_exhaustive()
    }
}
