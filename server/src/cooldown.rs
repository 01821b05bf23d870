use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use storewatch_common::{AlertKind, StoreId};

/// Tracks the last time each (store, alert kind) pair fired, so repeat
/// alerts of the same kind can be suppressed within a cooldown window.
/// Cooldown entries live for the process lifetime only — they are not
/// persisted (see DESIGN.md).
pub struct CooldownTable {
    offline: DashMap<StoreId, DateTime<Utc>>,
    recovery: DashMap<StoreId, DateTime<Utc>>,
    startup: DashMap<StoreId, DateTime<Utc>>,
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTable {
    pub fn new() -> Self {
        Self {
            offline: DashMap::new(),
            recovery: DashMap::new(),
            startup: DashMap::new(),
        }
    }

    fn table_for(&self, kind: AlertKind) -> &DashMap<StoreId, DateTime<Utc>> {
        match kind {
            AlertKind::Offline => &self.offline,
            AlertKind::Recovery => &self.recovery,
            AlertKind::Startup => &self.startup,
            // Other kinds don't participate in cooldown tracking; callers
            // are expected not to route them through `try_fire`.
            _ => &self.offline,
        }
    }

    /// Atomically checks whether an alert of `kind` for `store_id` may
    /// fire given `cooldown`, and if so records `now` as the new
    /// last-fired instant. `force = true` bypasses the check (the first
    /// `Online -> Offline` transition always fires) but still records
    /// `now`, so a subsequent repeat respects the cooldown from here.
    pub fn try_fire(
        &self,
        kind: AlertKind,
        store_id: &StoreId,
        cooldown: Duration,
        now: DateTime<Utc>,
        force: bool,
    ) -> bool {
        let table = self.table_for(kind);

        match table.entry(store_id.clone()) {
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let last = *entry.get();
                if force || now - last >= cooldown {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_alert_for_a_store_always_fires() {
        let table = CooldownTable::new();
        let fired = table.try_fire(
            AlertKind::Offline,
            &StoreId::new("A"),
            Duration::minutes(5),
            Utc::now(),
            false,
        );
        assert!(fired);
    }

    #[test]
    fn repeat_alert_within_cooldown_is_suppressed() {
        let table = CooldownTable::new();
        let t0 = Utc::now();
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t0, false));

        let t1 = t0 + Duration::minutes(2);
        assert!(!table.try_fire(
            AlertKind::Offline,
            &StoreId::new("A"),
            Duration::minutes(5),
            t1,
            false
        ));
    }

    #[test]
    fn repeat_alert_after_cooldown_elapses_fires() {
        let table = CooldownTable::new();
        let t0 = Utc::now();
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t0, false));

        let t1 = t0 + Duration::minutes(6);
        assert!(table.try_fire(
            AlertKind::Offline,
            &StoreId::new("A"),
            Duration::minutes(5),
            t1,
            false
        ));
    }

    #[test]
    fn force_bypasses_cooldown_but_still_resets_it() {
        let table = CooldownTable::new();
        let t0 = Utc::now();
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t0, false));

        let t1 = t0 + Duration::seconds(1);
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t1, true));

        let t2 = t1 + Duration::seconds(1);
        assert!(!table.try_fire(
            AlertKind::Offline,
            &StoreId::new("A"),
            Duration::minutes(5),
            t2,
            false
        ));
    }

    #[test]
    fn different_kinds_have_independent_cooldowns() {
        let table = CooldownTable::new();
        let t0 = Utc::now();
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t0, false));
        assert!(table.try_fire(AlertKind::Recovery, &StoreId::new("A"), Duration::minutes(5), t0, false));
    }

    #[test]
    fn different_stores_have_independent_cooldowns() {
        let table = CooldownTable::new();
        let t0 = Utc::now();
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("A"), Duration::minutes(5), t0, false));
        assert!(table.try_fire(AlertKind::Offline, &StoreId::new("B"), Duration::minutes(5), t0, false));
    }
}
