use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, error, trace, warn};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Map, Value};

use crate::core::metrics::{CommonMetricData, Lifetime};
use crate::core::storage;
use crate::core::storage::{InMemoryPersistence, Persistence, ScopeEntries};
use crate::core::timespan::{decode, to_nanos, Decoded, TimeUnit, TimespanValue};

/// The default prefix of the persistence scope names.
pub const DEFAULT_SCOPE_PREFIX: &str = "timespan";
const PING_LIFETIME_SUFFIX: &str = "PingLifetime";
const STORE_SEPARATOR: char = '#';

/// A point-in-time extraction of the timespans of a store, keyed by metric identifier.
pub type Snapshot = BTreeMap<String, TimespanValue>;

/// The state guarded by the lock of a single lifetime scope.
#[derive(Debug, Default)]
struct ScopeState {
    /// The nanoseconds which didn't fit the declared unit yet, per storage key.
    carry: HashMap<String, u64>,
}

/// The storage engine of timespan metrics.
///
/// It accumulates elapsed nanoseconds into a running total per metric, persists the total
/// within the scope of the metric lifetime and produces snapshots per store.
///
/// Within every lifetime scope, a value is stored per store under `<store>#<identifier>`,
/// so each store only reports the time recorded since it was last cleared.
/// For the [Lifetime::Ping] scope, the `<scope>.PingLifetime` scope additionally records
/// the stores each identifier belongs to.
///
/// Every operation on a scope is serialized by the lock of that scope.
#[derive(Debug)]
pub struct TimespanStorageEngine {
    persistence: Arc<dyn Persistence>,
    scope_prefix: String,
    ping: Mutex<ScopeState>,
    application: Mutex<ScopeState>,
    user: Mutex<ScopeState>,
}

impl TimespanStorageEngine {
    /// Create a new engine which persists its values within the given persistence.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self::builder().persistence(persistence).build()
    }

    pub fn builder() -> TimespanStorageEngineBuilder {
        TimespanStorageEngineBuilder::default()
    }

    /// Returns the persistence scope name of the given lifetime.
    pub fn scope_name(&self, lifetime: Lifetime) -> String {
        format!("{}.{}", self.scope_prefix, lifetime)
    }

    /// Returns the name of the scope which records the stores of ping lifetime values.
    pub fn membership_scope_name(&self) -> String {
        format!("{}.{}", self.scope_name(Lifetime::Ping), PING_LIFETIME_SUFFIX)
    }

    /// Add the elapsed nanoseconds to the running total of the metric within each of its stores.
    ///
    /// A metric which has never been recorded starts at zero.
    /// The total is stored in the given unit, the part which doesn't fit the unit is carried
    /// over in memory to the next accumulation.
    pub fn accumulate(
        &self,
        metric: &CommonMetricData,
        unit: TimeUnit,
        elapsed_nanos: u64,
    ) -> storage::Result<()> {
        let identifier = metric.identifier();
        if metric.stores().is_empty() {
            debug!("Metric {} has no stores, ignoring accumulation", identifier);
            return Ok(());
        }

        let mut state = self.lock(metric.lifetime);
        let scope = self.scope_name(metric.lifetime);
        let entries = self.persistence.get_all(&scope)?;
        trace!(
            "Accumulating {}ns into {} of {} lifetime",
            elapsed_nanos,
            identifier,
            metric.lifetime
        );

        let stores: BTreeSet<&String> = metric.stores().iter().collect();
        for store in stores {
            let key = Self::store_key(store, &identifier);
            self.add_to_key(&mut state, &scope, &entries, &key, unit, elapsed_nanos)?;
        }

        match metric.lifetime {
            Lifetime::Ping => self.add_membership(&identifier, metric.stores()),
            Lifetime::Application | Lifetime::User => Ok(()),
        }
    }

    /// Retrieve the current value of the metric within the given store, without clearing it.
    pub fn value_of(&self, metric: &CommonMetricData, store: &str) -> Option<TimespanValue> {
        let identifier = metric.identifier();
        let _state = self.lock(metric.lifetime);

        let result = match metric.lifetime {
            Lifetime::Ping => self.persistence.get_all(&self.membership_scope_name()).and_then(
                |memberships| {
                    let is_member = memberships
                        .get(&identifier)
                        .map(|stores| Self::decode_membership(stores).contains(store))
                        .unwrap_or(false);
                    if !is_member {
                        return Ok(None);
                    }

                    self.read_value(Lifetime::Ping, &Self::store_key(store, &identifier))
                },
            ),
            _ => self.read_value(metric.lifetime, &Self::store_key(store, &identifier)),
        };

        result.unwrap_or_else(|e| {
            error!("Failed to read {} of store {}, {}", identifier, store, e);
            None
        })
    }

    /// Take a snapshot of all valid timespans reachable from the given store.
    ///
    /// Entries which can't be decoded are skipped.
    /// When `clear_store` is set, the included entries are retired from the store,
    /// values of the same metric within other stores remain available to those stores.
    ///
    /// An identifier is expected to be recorded with a single lifetime, when it isn't,
    /// the value of the last lifetime in [Lifetime::ALL] is reported.
    ///
    /// It returns [None] when the store has no valid timespans.
    pub fn snapshot_with_time_unit(&self, store: &str, clear_store: bool) -> Option<Snapshot> {
        let mut snapshot = Snapshot::new();

        for lifetime in Lifetime::ALL {
            let mut state = self.lock(lifetime);
            let result = match lifetime {
                Lifetime::Ping => self.snapshot_ping(&mut state, store, clear_store, &mut snapshot),
                _ => self.snapshot_scope(&mut state, lifetime, store, clear_store, &mut snapshot),
            };

            if let Err(e) = result {
                error!(
                    "Failed to snapshot the {} lifetime of store {}, {}",
                    lifetime, store, e
                );
            }
        }

        if snapshot.is_empty() {
            trace!("Store {} has no timespans", store);
            None
        } else {
            debug!("Store {} snapshot contains {} timespans", store, snapshot.len());
            Some(snapshot)
        }
    }

    /// Take a snapshot of the given store and render it as a json object.
    ///
    /// It returns [Value::Null] when the store has no valid timespans.
    pub fn snapshot_as_json(&self, store: &str, clear_store: bool) -> Value {
        match self.snapshot_with_time_unit(store, clear_store) {
            Some(snapshot) => Value::Object(
                snapshot
                    .into_iter()
                    .map(|(identifier, value)| {
                        let mut entry = Map::new();
                        entry.insert(value.unit.name().to_string(), Value::from(value.amount));
                        (identifier, Value::Object(entry))
                    })
                    .collect(),
            ),
            None => Value::Null,
        }
    }

    /// Remove every stored timespan of every lifetime.
    ///
    /// All scopes are cleared, even when one of them fails.
    /// It returns the first error which occurred.
    pub fn clear_all_stores(&self) -> storage::Result<()> {
        let mut states: Vec<MutexGuard<ScopeState>> =
            Lifetime::ALL.iter().map(|lifetime| self.lock(*lifetime)).collect();
        let mut scopes: Vec<String> = Lifetime::ALL
            .iter()
            .map(|lifetime| self.scope_name(*lifetime))
            .collect();
        scopes.push(self.membership_scope_name());

        debug!("Clearing all timespan scopes {:?}", scopes);
        let mut result = Ok(());
        for scope in scopes {
            if let Err(e) = self.persistence.clear_scope(&scope) {
                error!("Failed to clear scope {}, {}", scope, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        for state in states.iter_mut() {
            state.carry.clear();
        }

        result
    }

    fn add_to_key(
        &self,
        state: &mut ScopeState,
        scope: &str,
        entries: &ScopeEntries,
        key: &str,
        unit: TimeUnit,
        elapsed_nanos: u64,
    ) -> storage::Result<()> {
        let existing = match entries.get(key).map(decode) {
            Some(Decoded::Valid(value)) => Some(value),
            Some(Decoded::Skip(reason)) => {
                warn!("Replacing invalid timespan {} in {}, {}", key, scope, reason);
                None
            }
            None => None,
        };
        let existing_nanos = existing
            .map(|value| to_nanos(value.unit, value.amount))
            .unwrap_or(0);
        let carry = state.carry.get(key).copied().unwrap_or(0);

        let total_nanos = existing_nanos + carry as u128 + elapsed_nanos as u128;
        let factor = unit.factor() as u128;
        let amount = u64::try_from(total_nanos / factor).unwrap_or(u64::MAX);
        let remainder = (total_nanos % factor) as u64;

        if remainder == 0 {
            state.carry.remove(key);
        } else {
            state.carry.insert(key.to_string(), remainder);
        }

        if amount == 0 && existing.is_none() {
            trace!("Timespan {} is below one {} and carried over", key, unit);
            return Ok(());
        }

        let value = TimespanValue::new(unit, amount);
        trace!("Storing timespan {} of {} in {}", value, key, scope);
        self.persistence.put(scope, key, value.to_raw())
    }

    fn add_membership(&self, identifier: &str, stores: &[String]) -> storage::Result<()> {
        let scope = self.membership_scope_name();
        let memberships = self.persistence.get_all(&scope)?;
        let mut members = memberships
            .get(identifier)
            .map(Self::decode_membership)
            .unwrap_or_default();

        let before = members.len();
        members.extend(stores.iter().cloned());
        if members.len() == before && memberships.contains_key(identifier) {
            return Ok(());
        }

        trace!("Updating stores of {} to {:?}", identifier, members);
        self.persistence
            .put(&scope, identifier, Self::encode_membership(&members))
    }

    fn snapshot_ping(
        &self,
        state: &mut ScopeState,
        store: &str,
        clear_store: bool,
        snapshot: &mut Snapshot,
    ) -> storage::Result<()> {
        let scope = self.scope_name(Lifetime::Ping);
        let membership_scope = self.membership_scope_name();
        let memberships = self.persistence.get_all(&membership_scope)?;
        let values = self.persistence.get_all(&scope)?;

        for (identifier, raw_stores) in memberships {
            let mut members = Self::decode_membership(&raw_stores);
            if !members.contains(store) {
                continue;
            }

            let key = Self::store_key(store, &identifier);
            match values.get(&key).map(decode) {
                Some(Decoded::Valid(value)) => {
                    Self::insert_snapshot(snapshot, identifier.clone(), value, Lifetime::Ping);
                }
                Some(Decoded::Skip(reason)) => {
                    warn!("Skipping invalid timespan {} in {}, {}", key, scope, reason);
                    continue;
                }
                None => {
                    trace!("Timespan {} has no stored value", key);
                    continue;
                }
            }

            if clear_store {
                trace!("Removing timespan {} from {}", key, scope);
                self.persistence.remove(&scope, &key)?;
                state.carry.remove(&key);

                members.remove(store);
                if members.is_empty() {
                    debug!("Removing timespan {}, it's no longer part of any store", identifier);
                    self.persistence.remove(&membership_scope, &identifier)?;
                } else {
                    trace!("Removing store {} from timespan {}", store, identifier);
                    self.persistence.put(
                        &membership_scope,
                        &identifier,
                        Self::encode_membership(&members),
                    )?;
                }
            }
        }

        Ok(())
    }

    fn snapshot_scope(
        &self,
        state: &mut ScopeState,
        lifetime: Lifetime,
        store: &str,
        clear_store: bool,
        snapshot: &mut Snapshot,
    ) -> storage::Result<()> {
        let scope = self.scope_name(lifetime);
        let prefix = format!("{}{}", store, STORE_SEPARATOR);

        for (key, raw) in self.persistence.get_all(&scope)? {
            let Some(identifier) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };

            match decode(&raw) {
                Decoded::Valid(value) => {
                    Self::insert_snapshot(snapshot, identifier.to_string(), value, lifetime);
                    if clear_store {
                        trace!("Removing timespan {} from {}", key, scope);
                        self.persistence.remove(&scope, &key)?;
                        state.carry.remove(&key);
                    }
                }
                Decoded::Skip(reason) => {
                    warn!("Skipping invalid timespan {} in {}, {}", key, scope, reason)
                }
            }
        }

        Ok(())
    }

    fn insert_snapshot(
        snapshot: &mut Snapshot,
        identifier: String,
        value: TimespanValue,
        lifetime: Lifetime,
    ) {
        if let Some(previous) = snapshot.insert(identifier.clone(), value) {
            warn!(
                "Timespan {} is recorded with multiple lifetimes, replacing {} with the {} value {}",
                identifier, previous, lifetime, value
            );
        }
    }

    fn read_value(&self, lifetime: Lifetime, key: &str) -> storage::Result<Option<TimespanValue>> {
        let entries = self.persistence.get_all(&self.scope_name(lifetime))?;
        Ok(entries.get(key).and_then(|raw| decode(raw).valid()))
    }

    fn lock(&self, lifetime: Lifetime) -> MutexGuard<ScopeState> {
        match lifetime {
            Lifetime::Ping => self.ping.lock(),
            Lifetime::Application => self.application.lock(),
            Lifetime::User => self.user.lock(),
        }
    }

    fn store_key(store: &str, identifier: &str) -> String {
        format!("{}{}{}", store, STORE_SEPARATOR, identifier)
    }

    fn decode_membership(raw: &Value) -> BTreeSet<String> {
        match raw {
            Value::Array(stores) => stores
                .iter()
                .filter_map(|store| store.as_str().map(|e| e.to_string()))
                .collect(),
            _ => {
                warn!("Ignoring invalid ping lifetime membership {}", raw);
                BTreeSet::new()
            }
        }
    }

    fn encode_membership(stores: &BTreeSet<String>) -> Value {
        Value::Array(stores.iter().map(|store| Value::from(store.as_str())).collect())
    }
}

/// Builder for the [TimespanStorageEngine].
#[derive(Debug, Default)]
pub struct TimespanStorageEngineBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    scope_prefix: Option<String>,
}

impl TimespanStorageEngineBuilder {
    /// Set the persistence of the engine.
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the prefix of the persistence scope names.
    pub fn scope_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.scope_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the engine.
    /// It uses an [InMemoryPersistence] when no persistence has been set.
    pub fn build(self) -> TimespanStorageEngine {
        TimespanStorageEngine {
            persistence: self
                .persistence
                .unwrap_or_else(|| Arc::new(InMemoryPersistence::new())),
            scope_prefix: self
                .scope_prefix
                .unwrap_or_else(|| DEFAULT_SCOPE_PREFIX.to_string()),
            ping: Default::default(),
            application: Default::default(),
            user: Default::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::tempdir;

    use crate::core::storage::{FilePersistence, MockPersistence, StorageError};
    use crate::init_logger;

    use super::*;

    fn metric(name: &str, stores: &[&str], lifetime: Lifetime) -> CommonMetricData {
        CommonMetricData {
            category: "telemetry".to_string(),
            name: name.to_string(),
            send_in_pings: stores.iter().map(|e| e.to_string()).collect(),
            lifetime,
            disabled: false,
        }
    }

    fn engine() -> (Arc<InMemoryPersistence>, TimespanStorageEngine) {
        let persistence = Arc::new(InMemoryPersistence::new());
        let engine = TimespanStorageEngine::new(persistence.clone());
        (persistence, engine)
    }

    #[test]
    fn test_scope_names() {
        let engine = TimespanStorageEngine::builder().scope_prefix("lorem").build();

        assert_eq!("lorem.ping", engine.scope_name(Lifetime::Ping));
        assert_eq!("lorem.user", engine.scope_name(Lifetime::User));
        assert_eq!("lorem.ping.PingLifetime", engine.membership_scope_name());
    }

    #[test]
    fn test_accumulate_absent_metric() {
        init_logger!();
        let (persistence, engine) = engine();
        let metric = metric("single_elapsed_test", &["store1"], Lifetime::Ping);

        engine.accumulate(&metric, TimeUnit::Nanosecond, 37).unwrap();

        assert_eq!(
            Some(&json!([0, 37])),
            persistence
                .get_all("timespan.ping")
                .unwrap()
                .get("store1#telemetry.single_elapsed_test")
        );
        assert_eq!(
            Some(&json!(["store1"])),
            persistence
                .get_all("timespan.ping.PingLifetime")
                .unwrap()
                .get("telemetry.single_elapsed_test")
        );
    }

    #[test]
    fn test_accumulate_sums_chunks() {
        init_logger!();
        let (_, engine) = engine();
        let metric = metric("chunks", &["store1"], Lifetime::Ping);

        engine.accumulate(&metric, TimeUnit::Nanosecond, 37).unwrap();
        engine.accumulate(&metric, TimeUnit::Nanosecond, 74).unwrap();

        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Nanosecond, 111)),
            engine.value_of(&metric, "store1")
        );
    }

    #[test]
    fn test_accumulate_carries_sub_unit_nanos() {
        init_logger!();
        let (_, engine) = engine();
        let metric = metric("sub_resolution", &["store1"], Lifetime::Ping);

        for _ in 0..10 {
            engine
                .accumulate(&metric, TimeUnit::Second, 100_000_000)
                .unwrap();
        }

        let result = engine.snapshot_as_json("store1", false);
        assert_eq!(json!({"telemetry.sub_resolution": {"second": 1}}), result);
    }

    #[test]
    fn test_accumulate_existing_value_in_other_unit() {
        init_logger!();
        let (persistence, engine) = engine();
        let metric = metric("changed_unit", &["store1"], Lifetime::User);
        persistence
            .put("timespan.user", "store1#telemetry.changed_unit", json!([3, 2]))
            .unwrap();

        engine
            .accumulate(&metric, TimeUnit::Millisecond, 500_000_000)
            .unwrap();

        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Millisecond, 2_500)),
            engine.value_of(&metric, "store1")
        );
    }

    #[test]
    fn test_accumulate_replaces_invalid_value() {
        init_logger!();
        let (persistence, engine) = engine();
        let metric = metric("corrupt", &["store1"], Lifetime::Application);
        persistence
            .put("timespan.application", "store1#telemetry.corrupt", json!("c4ff33"))
            .unwrap();

        engine.accumulate(&metric, TimeUnit::Nanosecond, 5).unwrap();

        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Nanosecond, 5)),
            engine.value_of(&metric, "store1")
        );
    }

    #[test]
    fn test_accumulate_without_stores() {
        init_logger!();
        let mut persistence = MockPersistence::new();
        persistence.expect_get_all().times(0);
        persistence.expect_put().times(0);
        let engine = TimespanStorageEngine::new(Arc::new(persistence));

        let result = engine.accumulate(&metric("lorem", &[], Lifetime::Ping), TimeUnit::Second, 1);

        assert_eq!(Ok(()), result);
    }

    #[test]
    fn test_accumulate_persistence_failure() {
        init_logger!();
        let mut persistence = MockPersistence::new();
        persistence
            .expect_get_all()
            .returning(|_| Ok(ScopeEntries::new()));
        persistence
            .expect_put()
            .returning(|scope, _, _| Err(StorageError::WritingFailed(scope.to_string(), "disk full".to_string())));
        let engine = TimespanStorageEngine::new(Arc::new(persistence));

        let result = engine.accumulate(&metric("lorem", &["store1"], Lifetime::User), TimeUnit::Nanosecond, 1);

        assert_eq!(
            Err(StorageError::WritingFailed("timespan.user".to_string(), "disk full".to_string())),
            result
        );
    }

    #[test]
    fn test_snapshot_skips_invalid_entries() {
        init_logger!();
        let (persistence, engine) = engine();
        persistence
            .put("timespan.application", "store1#telemetry.invalid_bool", json!(false))
            .unwrap();
        persistence
            .put("timespan.application", "store1#telemetry.invalid_string", json!("c4ff33"))
            .unwrap();
        persistence
            .put("timespan.application", "store1#telemetry.valid", json!("[0, 37]"))
            .unwrap();

        let result = engine
            .snapshot_with_time_unit("store1", false)
            .expect("expected a snapshot");

        assert_eq!(1, result.len());
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 37)),
            result.get("telemetry.valid")
        );
    }

    #[test]
    fn test_snapshot_skips_invalid_ping_entries() {
        init_logger!();
        let (persistence, engine) = engine();
        for (key, value) in [
            ("telemetry.invalid_bool", json!(false)),
            ("telemetry.invalid_string", json!("c4ff33")),
            ("telemetry.valid", json!("[0, 37]")),
        ] {
            persistence
                .put("timespan.ping", format!("store1#{}", key).as_str(), value)
                .unwrap();
            persistence
                .put("timespan.ping.PingLifetime", key, json!(["store1"]))
                .unwrap();
        }
        persistence
            .put("timespan.ping.PingLifetime", "telemetry.unknown", json!({"store1": true}))
            .unwrap();

        let result = engine
            .snapshot_with_time_unit("store1", false)
            .expect("expected a snapshot");

        let mut expected = Snapshot::new();
        expected.insert("telemetry.valid".to_string(), TimespanValue::new(TimeUnit::Nanosecond, 37));
        assert_eq!(expected, result);
    }

    #[test]
    fn test_snapshot_unknown_store() {
        init_logger!();
        let (_, engine) = engine();
        engine
            .accumulate(&metric("lorem", &["store1"], Lifetime::Ping), TimeUnit::Nanosecond, 1)
            .unwrap();

        assert_eq!(None, engine.snapshot_with_time_unit("store2", false));
        assert_eq!(Value::Null, engine.snapshot_as_json("store2", false));
    }

    #[test]
    fn test_snapshot_without_clear_keeps_values() {
        init_logger!();
        let (_, engine) = engine();
        engine
            .accumulate(&metric("lorem", &["store1"], Lifetime::Application), TimeUnit::Millisecond, 3_000_000)
            .unwrap();

        let first = engine.snapshot_with_time_unit("store1", false);
        let second = engine.snapshot_with_time_unit("store1", false);

        assert!(first.is_some(), "expected a snapshot");
        assert_eq!(first, second);
    }

    #[test]
    fn test_snapshot_clear_ping_store_independence() {
        init_logger!();
        let (persistence, engine) = engine();
        let metric = metric("shared", &["storeA", "storeB"], Lifetime::Ping);
        engine.accumulate(&metric, TimeUnit::Nanosecond, 42).unwrap();

        let result = engine.snapshot_with_time_unit("storeA", true);
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 42)),
            result.as_ref().and_then(|e| e.get("telemetry.shared"))
        );
        assert_eq!(None, engine.snapshot_with_time_unit("storeA", false));
        assert_eq!(
            Some(&json!(["storeB"])),
            persistence
                .get_all("timespan.ping.PingLifetime")
                .unwrap()
                .get("telemetry.shared")
        );

        let result = engine.snapshot_with_time_unit("storeB", true);
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 42)),
            result.as_ref().and_then(|e| e.get("telemetry.shared"))
        );
        assert!(persistence.get_all("timespan.ping").unwrap().is_empty());
        assert!(persistence
            .get_all("timespan.ping.PingLifetime")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_accumulate_after_clearing_one_ping_store() {
        init_logger!();
        let (_, engine) = engine();
        let metric = metric("shared", &["storeA", "storeB"], Lifetime::Ping);
        engine.accumulate(&metric, TimeUnit::Nanosecond, 42).unwrap();
        let _ = engine.snapshot_with_time_unit("storeA", true);

        engine.accumulate(&metric, TimeUnit::Nanosecond, 5).unwrap();

        let result = engine.snapshot_with_time_unit("storeA", true);
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 5)),
            result.as_ref().and_then(|e| e.get("telemetry.shared"))
        );
        let result = engine.snapshot_with_time_unit("storeB", false);
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 47)),
            result.as_ref().and_then(|e| e.get("telemetry.shared"))
        );
    }

    #[test]
    fn test_snapshot_identifier_within_multiple_lifetimes() {
        init_logger!();
        let (_, engine) = engine();
        engine
            .accumulate(&metric("twice", &["store1"], Lifetime::Ping), TimeUnit::Nanosecond, 3)
            .unwrap();
        engine
            .accumulate(&metric("twice", &["store1"], Lifetime::User), TimeUnit::Nanosecond, 8)
            .unwrap();

        let result = engine
            .snapshot_with_time_unit("store1", false)
            .expect("expected a snapshot");

        assert_eq!(1, result.len());
        assert_eq!(
            Some(&TimespanValue::new(TimeUnit::Nanosecond, 8)),
            result.get("telemetry.twice")
        );
    }

    #[test]
    fn test_snapshot_clear_scoped_lifetime_store_independence() {
        init_logger!();
        let (_, engine) = engine();
        let metric = metric("shared", &["storeA", "storeB"], Lifetime::User);
        engine.accumulate(&metric, TimeUnit::Microsecond, 7_000).unwrap();

        let result = engine.snapshot_as_json("storeA", true);

        assert_eq!(json!({"telemetry.shared": {"microsecond": 7}}), result);
        assert_eq!(None, engine.value_of(&metric, "storeA"));
        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Microsecond, 7)),
            engine.value_of(&metric, "storeB")
        );
    }

    #[test]
    fn test_snapshot_clear_drops_carry() {
        init_logger!();
        let (_, engine) = engine();
        let metric = metric("carry", &["store1"], Lifetime::Ping);
        engine.accumulate(&metric, TimeUnit::Second, 1_500_000_000).unwrap();

        let _ = engine.snapshot_with_time_unit("store1", true);
        engine.accumulate(&metric, TimeUnit::Second, 600_000_000).unwrap();

        assert_eq!(None, engine.snapshot_with_time_unit("store1", false));
    }

    #[test]
    fn test_snapshot_persistence_failure_continues_other_lifetimes() {
        init_logger!();
        let mut persistence = MockPersistence::new();
        persistence.expect_get_all().returning(|scope| match scope {
            "timespan.ping.PingLifetime" => Err(StorageError::ReadingFailed(scope.to_string(), "lorem".to_string())),
            "timespan.user" => {
                let mut entries = ScopeEntries::new();
                entries.insert("store1#telemetry.user_metric".to_string(), json!([2, 12]));
                Ok(entries)
            }
            _ => Ok(ScopeEntries::new()),
        });
        let engine = TimespanStorageEngine::new(Arc::new(persistence));

        let result = engine.snapshot_as_json("store1", false);

        assert_eq!(json!({"telemetry.user_metric": {"millisecond": 12}}), result);
    }

    #[test]
    fn test_unit_fidelity_for_three_days() {
        init_logger!();
        let (_, engine) = engine();
        let three_days = Duration::from_secs(3 * 24 * 60 * 60).as_nanos() as u64;
        let expected = [
            (TimeUnit::Nanosecond, 259_200_000_000_000u64),
            (TimeUnit::Microsecond, 259_200_000_000),
            (TimeUnit::Millisecond, 259_200_000),
            (TimeUnit::Second, 259_200),
            (TimeUnit::Minute, 4_320),
            (TimeUnit::Hour, 72),
            (TimeUnit::Day, 3),
        ];

        for (unit, amount) in expected {
            let metric = metric(unit.name(), &["store1"], Lifetime::Ping);
            engine.accumulate(&metric, unit, three_days).unwrap();

            assert_eq!(
                Some(TimespanValue::new(unit, amount)),
                engine.value_of(&metric, "store1")
            );
        }
    }

    #[test]
    fn test_clear_all_stores() {
        init_logger!();
        let (_, engine) = engine();
        for lifetime in Lifetime::ALL {
            engine
                .accumulate(&metric("lorem", &["store1", "store2"], lifetime), TimeUnit::Nanosecond, 10)
                .unwrap();
        }

        engine.clear_all_stores().unwrap();

        assert_eq!(None, engine.snapshot_with_time_unit("store1", false));
        assert_eq!(None, engine.snapshot_with_time_unit("store2", false));
    }

    #[test]
    fn test_clear_all_stores_clears_every_scope_on_failure() {
        init_logger!();
        let mut persistence = MockPersistence::new();
        persistence
            .expect_clear_scope()
            .times(4)
            .returning(|scope| match scope {
                "timespan.application" => Err(StorageError::IO(scope.to_string(), "lorem".to_string())),
                _ => Ok(()),
            });
        let engine = TimespanStorageEngine::new(Arc::new(persistence));

        let result = engine.clear_all_stores();

        assert_eq!(
            Err(StorageError::IO("timespan.application".to_string(), "lorem".to_string())),
            result
        );
    }

    #[test]
    fn test_concurrent_accumulate() {
        init_logger!();
        let (_, engine) = engine();
        let engine = Arc::new(engine);
        let metric = metric("concurrent", &["store1", "store2"], Lifetime::Ping);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let metric = metric.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        engine.accumulate(&metric, TimeUnit::Nanosecond, 3).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Nanosecond, 8 * 50 * 3)),
            engine.value_of(&metric, "store2")
        );
    }

    #[test]
    fn test_concurrent_accumulate_and_clearing_snapshot_loses_nothing() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let engine = Arc::new(TimespanStorageEngine::new(Arc::new(FilePersistence::new(
            temp_dir.path(),
        ))));
        let metric = metric("race", &["store1"], Lifetime::Ping);

        let writer = {
            let engine = engine.clone();
            let metric = metric.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    engine.accumulate(&metric, TimeUnit::Nanosecond, 1).unwrap();
                }
            })
        };
        let mut total = 0;
        for _ in 0..20 {
            total += engine
                .snapshot_with_time_unit("store1", true)
                .and_then(|e| e.get("telemetry.race").map(|value| value.amount))
                .unwrap_or(0);
        }
        writer.join().unwrap();
        total += engine
            .snapshot_with_time_unit("store1", true)
            .and_then(|e| e.get("telemetry.race").map(|value| value.amount))
            .unwrap_or(0);

        assert_eq!(100, total);
    }

    #[test]
    fn test_values_survive_restart() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let metric = metric("restart", &["store1"], Lifetime::User);
        {
            let engine = TimespanStorageEngine::new(Arc::new(FilePersistence::new(temp_dir.path())));
            engine.accumulate(&metric, TimeUnit::Millisecond, 4_000_000).unwrap();
        }

        let engine = TimespanStorageEngine::new(Arc::new(FilePersistence::new(temp_dir.path())));
        engine.accumulate(&metric, TimeUnit::Millisecond, 1_000_000).unwrap();

        assert_eq!(
            Some(TimespanValue::new(TimeUnit::Millisecond, 5)),
            engine.value_of(&metric, "store1")
        );
    }
}
