//! # Registrations
//!
//! A [`Registration`] binds a phantom address to the keys and covert target of
//! one client session. The [`RegistrationManager`] owns every live registration
//! and is the only way to insert, look up or expire them.
//!
//! ## Lifecycle
//! ```text
//! ingest ──new_registration──▶ Registration ──add_registration──▶ table
//!                                                   │
//!          dispatcher / detector ◀──check_registration┘
//!                                                   │
//!                                  expire / invalidate ──▶ dropped
//! ```

pub mod manager;

pub use manager::{
    AdmissionOutcome, ManagerStats, RegistrationLookup, RegistrationManager,
};

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::{ClientToStation, DerivedKeys, FixedFields, RegistrationFlags};

/// One accepted covert-channel reservation
#[derive(Debug)]
pub struct Registration {
    phantom: IpAddr,
    phantom_port: Option<u16>,
    keys: DerivedKeys,
    covert: String,
    mask: Option<String>,
    flags: RegistrationFlags,
    transport: u32,
    generation: u32,
    created_at: Instant,
    /// Milliseconds after `created_at` of the most recent lookup hit
    live_checked_ms: AtomicU64,
}

impl Registration {
    pub(crate) fn new(
        request: &ClientToStation,
        fixed: &FixedFields,
        keys: DerivedKeys,
        flags: RegistrationFlags,
        created_at: Instant,
    ) -> Self {
        Self {
            phantom: fixed.phantom,
            phantom_port: fixed.phantom_port,
            keys,
            covert: request.covert().to_string(),
            mask: request.mask().map(str::to_string),
            flags,
            transport: request.transport.unwrap_or_default(),
            generation: request.decoy_list_generation.unwrap_or_default(),
            created_at,
            live_checked_ms: AtomicU64::new(0),
        }
    }

    pub fn phantom(&self) -> IpAddr {
        self.phantom
    }

    pub fn phantom_port(&self) -> Option<u16> {
        self.phantom_port
    }

    pub fn keys(&self) -> &DerivedKeys {
        &self.keys
    }

    /// Real destination as `host:port`
    pub fn covert(&self) -> &str {
        &self.covert
    }

    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    pub fn flags(&self) -> RegistrationFlags {
        self.flags
    }

    /// Covert protocol id requested by the client
    pub fn transport(&self) -> u32 {
        self.transport
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of the most recent successful lookup, or creation time if none
    pub fn last_live_check(&self) -> Instant {
        self.created_at + Duration::from_millis(self.live_checked_ms.load(Ordering::Relaxed))
    }

    /// Whether this registration still holds its phantom at `now`
    pub fn is_live_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }

    /// Whether a connection to `port` is covered by this registration
    pub fn matches_port(&self, port: u16) -> bool {
        self.phantom_port.map_or(true, |p| p == port)
    }

    pub(crate) fn mark_live_check(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.created_at).as_millis();
        self.live_checked_ms
            .fetch_max(u64::try_from(ms).unwrap_or(u64::MAX), Ordering::Relaxed);
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{phantom={}, covert={}, mask={}, flags=0x{:02x}, transport={}, generation={}}}",
            self.phantom,
            self.covert,
            self.mask.as_deref().unwrap_or(""),
            self.flags.bits(),
            self.transport,
            self.generation
        )
    }
}
