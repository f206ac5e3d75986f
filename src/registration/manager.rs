//! Concurrent registration table.
//!
//! The table is a sharded map keyed by phantom address. Admission uses the
//! map's entry API, so the liveness check and the insert happen under the same
//! shard lock and two ingest paths racing on one phantom cannot both win.
//!
//! Entries expire by age. Lookups ignore expired entries immediately; a
//! periodic sweep (`expire`) reclaims their memory.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::Registration;
use crate::config::RegistrationConfig;
use crate::core::{ClientToStation, DerivedKeys, FixedFields, RegistrationFlags};

/// Read-only capability shared by the detector and the connection dispatcher.
pub trait RegistrationLookup: Send + Sync {
    /// Live registration covering `dst:dst_port`, if any
    fn lookup(&self, dst: IpAddr, dst_port: u16) -> Option<Arc<Registration>>;

    /// Predicate form used on the capture path. `src` is carried for
    /// implementations that key on the client as well.
    fn is_registered(&self, src: IpAddr, dst: IpAddr, dst_port: u16) -> bool {
        let _ = src;
        self.lookup(dst, dst_port).is_some()
    }
}

/// Result of offering a registration to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Phantom was free
    Admitted,
    /// Phantom was held by an expired registration, now replaced
    Replaced,
    /// A live registration already owns the phantom
    Duplicate,
    /// Table is at capacity even after sweeping expired entries
    Full,
    /// The registration was already past its TTL when offered
    Expired,
}

impl AdmissionOutcome {
    pub fn is_admitted(self) -> bool {
        matches!(self, AdmissionOutcome::Admitted | AdmissionOutcome::Replaced)
    }
}

/// Owner of all live registrations
#[derive(Debug)]
pub struct RegistrationManager {
    table: DashMap<IpAddr, Arc<Registration>>,
    ttl: Duration,
    max_entries: usize,
    admitted_total: AtomicU64,
}

impl RegistrationManager {
    /// Create a manager with the given TTL and capacity.
    ///
    /// Capacity is a soft bound: concurrent admissions may overshoot it by the
    /// number of racing callers.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            table: DashMap::new(),
            ttl,
            max_entries,
            admitted_total: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.ttl, config.max_registrations)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build a registration without inserting it.
    pub fn new_registration(
        &self,
        request: &ClientToStation,
        fixed: &FixedFields,
        keys: DerivedKeys,
        flags: RegistrationFlags,
    ) -> Registration {
        self.new_registration_at(request, fixed, keys, flags, Instant::now())
    }

    pub fn new_registration_at(
        &self,
        request: &ClientToStation,
        fixed: &FixedFields,
        keys: DerivedKeys,
        flags: RegistrationFlags,
        now: Instant,
    ) -> Registration {
        Registration::new(request, fixed, keys, flags, now)
    }

    /// Insert `reg` iff no live registration owns its phantom.
    pub fn add_registration(&self, reg: Registration) -> bool {
        self.admit(reg, Instant::now()).is_admitted()
    }

    /// Admission with an explicit clock, reporting why an insert did not happen.
    pub fn admit(&self, reg: Registration, now: Instant) -> AdmissionOutcome {
        let phantom = reg.phantom().to_canonical();

        if !reg.is_live_at(now, self.ttl) {
            debug!(phantom = %phantom, "Registration expired before admission, dropping");
            return AdmissionOutcome::Expired;
        }

        // Capacity sweep runs before any entry guard is taken
        if self.table.len() >= self.max_entries && !self.table.contains_key(&phantom) {
            self.expire(now);
            if self.table.len() >= self.max_entries {
                warn!(
                    phantom = %phantom,
                    max_entries = self.max_entries,
                    "Registration table full, dropping registration"
                );
                return AdmissionOutcome::Full;
            }
        }

        let outcome = match self.table.entry(phantom) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live_at(now, self.ttl) {
                    debug!(phantom = %phantom, "Phantom already registered, dropping duplicate");
                    return AdmissionOutcome::Duplicate;
                }
                occupied.insert(Arc::new(reg));
                AdmissionOutcome::Replaced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(reg));
                AdmissionOutcome::Admitted
            }
        };

        self.admitted_total.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Whether a live registration currently owns `phantom`
    pub fn phantom_is_live(&self, phantom: IpAddr) -> bool {
        self.phantom_is_live_at(phantom, Instant::now())
    }

    pub fn phantom_is_live_at(&self, phantom: IpAddr, now: Instant) -> bool {
        self.table
            .get(&phantom.to_canonical())
            .is_some_and(|reg| reg.is_live_at(now, self.ttl))
    }

    /// Look up the live registration for a destination address.
    ///
    /// A miss is the common case for non-covert traffic and is not logged.
    pub fn check_registration(&self, addr: IpAddr) -> Option<Arc<Registration>> {
        self.check_registration_at(addr, Instant::now())
    }

    pub fn check_registration_at(&self, addr: IpAddr, now: Instant) -> Option<Arc<Registration>> {
        let entry = self.table.get(&addr.to_canonical())?;
        if !entry.is_live_at(now, self.ttl) {
            return None;
        }
        entry.mark_live_check(now);
        Some(Arc::clone(entry.value()))
    }

    /// Remove every registration older than the TTL, returning how many went.
    pub fn expire(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.table.retain(|_, reg| {
            let live = reg.is_live_at(now, self.ttl);
            if !live {
                removed += 1;
            }
            live
        });

        if removed > 0 {
            info!(
                removed,
                remaining = self.table.len(),
                "Expired registrations removed"
            );
        }
        removed
    }

    /// Drop the registration for `phantom` regardless of age.
    pub fn invalidate(&self, phantom: IpAddr) -> bool {
        let removed = self.table.remove(&phantom.to_canonical()).is_some();
        if removed {
            debug!(phantom = %phantom, "Registration invalidated");
        }
        removed
    }

    /// Number of entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            entries: self.table.len(),
            max_entries: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
            admitted_total: self.admitted_total.load(Ordering::Relaxed),
        }
    }
}

impl RegistrationLookup for RegistrationManager {
    fn lookup(&self, dst: IpAddr, dst_port: u16) -> Option<Arc<Registration>> {
        self.check_registration(dst)
            .filter(|reg| reg.matches_port(dst_port))
    }
}

/// Statistics about the registration table
#[derive(Debug, Clone, Copy)]
pub struct ManagerStats {
    /// Current number of entries
    pub entries: usize,
    /// Soft capacity
    pub max_entries: usize,
    /// TTL in seconds
    pub ttl_seconds: u64,
    /// Registrations admitted since startup
    pub admitted_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys::derive_keys;
    use std::net::Ipv4Addr;

    fn registration(manager: &RegistrationManager, phantom: IpAddr, now: Instant) -> Registration {
        let request = ClientToStation {
            covert_address: Some("example.internal:8080".into()),
            ..Default::default()
        };
        let fixed = FixedFields {
            phantom,
            phantom_port: None,
        };
        #[allow(clippy::expect_used)]
        let keys = derive_keys(&[5u8; 32]).expect("derive");
        manager.new_registration_at(&request, &fixed, keys, RegistrationFlags::empty(), now)
    }

    fn phantom() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))
    }

    #[test]
    fn test_admit_then_duplicate() {
        let manager = RegistrationManager::new(Duration::from_secs(60), 100);
        let now = Instant::now();

        assert!(!manager.phantom_is_live_at(phantom(), now));
        assert_eq!(
            manager.admit(registration(&manager, phantom(), now), now),
            AdmissionOutcome::Admitted
        );
        assert!(manager.phantom_is_live_at(phantom(), now));
        assert_eq!(
            manager.admit(registration(&manager, phantom(), now), now),
            AdmissionOutcome::Duplicate
        );
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.stats().admitted_total, 1);
    }

    #[test]
    fn test_ttl_boundary() {
        let ttl = Duration::from_secs(30);
        let manager = RegistrationManager::new(ttl, 100);
        let t = Instant::now();
        let eps = Duration::from_millis(1);

        manager.admit(registration(&manager, phantom(), t), t);

        assert!(manager.check_registration_at(phantom(), t + ttl - eps).is_some());
        assert!(manager.check_registration_at(phantom(), t + ttl + eps).is_none());
    }

    #[test]
    fn test_expired_occupant_replaced() {
        let ttl = Duration::from_secs(10);
        let manager = RegistrationManager::new(ttl, 100);
        let t = Instant::now();
        manager.admit(registration(&manager, phantom(), t), t);

        let later = t + ttl + Duration::from_secs(1);
        assert_eq!(
            manager.admit(registration(&manager, phantom(), later), later),
            AdmissionOutcome::Replaced
        );
        assert!(manager.check_registration_at(phantom(), later).is_some());
    }

    #[test]
    fn test_expired_on_arrival_not_inserted() {
        let ttl = Duration::from_secs(10);
        let manager = RegistrationManager::new(ttl, 100);
        let t = Instant::now();
        let late = t + ttl + Duration::from_secs(1);

        assert_eq!(
            manager.admit(registration(&manager, phantom(), t), late),
            AdmissionOutcome::Expired
        );
        assert!(manager.is_empty());
        assert_eq!(manager.stats().admitted_total, 0);

        // A fresh registration for the same phantom still goes in
        assert_eq!(
            manager.admit(registration(&manager, phantom(), late), late),
            AdmissionOutcome::Admitted
        );
    }

    #[test]
    fn test_expire_sweeps_old_entries() {
        let ttl = Duration::from_secs(10);
        let manager = RegistrationManager::new(ttl, 100);
        let t = Instant::now();
        manager.admit(registration(&manager, phantom(), t), t);
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));
        let t2 = t + Duration::from_secs(5);
        manager.admit(registration(&manager, other, t2), t2);

        assert_eq!(manager.expire(t + Duration::from_secs(11)), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.check_registration_at(other, t + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn test_capacity_limit() {
        let manager = RegistrationManager::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        for last in 1..=2u8 {
            let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, last));
            assert!(manager.admit(registration(&manager, addr, now), now).is_admitted());
        }
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(
            manager.admit(registration(&manager, addr, now), now),
            AdmissionOutcome::Full
        );
    }

    #[test]
    fn test_mapped_lookup_matches_v4() {
        let manager = RegistrationManager::new(Duration::from_secs(60), 100);
        let now = Instant::now();
        manager.admit(registration(&manager, phantom(), now), now);

        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 5).to_ipv6_mapped());
        assert!(manager.check_registration_at(mapped, now).is_some());
    }

    #[test]
    fn test_lookup_records_live_check() {
        let manager = RegistrationManager::new(Duration::from_secs(60), 100);
        let t = Instant::now();
        manager.admit(registration(&manager, phantom(), t), t);

        let later = t + Duration::from_secs(3);
        #[allow(clippy::expect_used)]
        let reg = manager.check_registration_at(phantom(), later).expect("hit");
        assert_eq!(reg.last_live_check(), later);
    }

    #[test]
    fn test_invalidate() {
        let manager = RegistrationManager::new(Duration::from_secs(60), 100);
        let now = Instant::now();
        manager.admit(registration(&manager, phantom(), now), now);
        assert!(manager.invalidate(phantom()));
        assert!(!manager.invalidate(phantom()));
        assert!(manager.is_empty());
    }
}
