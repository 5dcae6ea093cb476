use crate::client::resolver::{AddressFamily, GatewayResolver, ResolvedMask};
use crate::plugin::{ClientEvent, NotificationSink};
use crate::timer::Timer;
use std::time::Duration;
use tracing::{debug, info};

/// Resolution checks a client gets after the first one before it gives up.
pub const MAX_RESOLVE_ATTEMPTS: u32 = 5;

/// Time between two resolution checks.
pub const RESOLVE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvePhase {
    /// Never started, or stopped.
    Idle,
    /// Timer armed, nothing resolved yet.
    Resolving,
    /// Timer armed, one family resolved.
    PartiallyResolved,
    /// Both families resolved.
    Resolved,
    /// Out of attempts with a family still unresolved. The client stays this way.
    Exhausted,
}

/// Gateway MAC resolution bookkeeping for one client.
///
/// The resolved mask only ever gains bits. Exhausting the attempts is not an error: the
/// client simply stays partially resolved, which callers see through [`phase`].
///
/// [`phase`]: ClientAddressState::phase
#[derive(Clone, Debug, Default)]
pub struct ClientAddressState {
    started: bool,
    mask: ResolvedMask,
    attempts: u32,
    max_attempts: u32,
}

impl ClientAddressState {
    pub fn new() -> Self {
        ClientAddressState::default()
    }

    pub fn mask(&self) -> ResolvedMask {
        self.mask
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_resolved(&self, family: AddressFamily) -> bool {
        self.mask.is_family_resolved(family)
    }

    /// Starts resolving. The first check runs right away, so gateways that are forced or
    /// already bound resolve without waiting for the timer.
    pub fn start(
        &mut self,
        resolver: &GatewayResolver<'_>,
        timer: &mut dyn Timer,
        sink: &mut dyn NotificationSink,
    ) {
        timer.cancel();
        self.started = true;
        self.attempts = 0;
        self.max_attempts = MAX_RESOLVE_ATTEMPTS;
        self.on_tick(resolver, timer, sink);
    }

    /// One resolution check. Emits at most one event, covering every family that resolved
    /// during this check, and re-arms the timer while attempts remain.
    pub fn on_tick(
        &mut self,
        resolver: &GatewayResolver<'_>,
        timer: &mut dyn Timer,
        sink: &mut dyn NotificationSink,
    ) {
        let old = self.mask;
        for family in AddressFamily::ALL.iter().copied() {
            if self.mask.is_family_resolved(family) {
                continue;
            }
            if let Some(mac) = resolver.gateway_mac(family) {
                debug!(client = %resolver.client_mac(), ?family, gateway = %mac, "gateway resolved");
                self.mask.insert(family.resolved_bit());
            }
        }

        if self.mask != old {
            sink.notify(&ClientEvent::GatewayMacResolved {
                old,
                new: self.mask,
            });
        }

        if self.mask == ResolvedMask::ALL {
            info!(client = %resolver.client_mac(), attempts = self.attempts, "all gateways resolved");
            return;
        }
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            timer.arm(RESOLVE_INTERVAL);
        } else {
            info!(
                client = %resolver.client_mac(),
                mask = ?self.mask,
                "gateway resolution exhausted"
            );
        }
    }

    /// Stops resolving. Safe in any state, including before [`start`].
    ///
    /// [`start`]: ClientAddressState::start
    pub fn stop(&mut self, timer: &mut dyn Timer) {
        timer.cancel();
        self.started = false;
    }

    pub fn phase(&self, timer: &dyn Timer) -> ResolvePhase {
        self.phase_for(timer.is_armed())
    }

    /// Phase given whether the client's timer is currently armed.
    pub fn phase_for(&self, armed: bool) -> ResolvePhase {
        if self.mask == ResolvedMask::ALL {
            return ResolvePhase::Resolved;
        }
        if !self.started {
            return ResolvePhase::Idle;
        }
        match (armed, self.mask.is_empty()) {
            (true, true) => ResolvePhase::Resolving,
            (true, false) => ResolvePhase::PartiallyResolved,
            (false, _) => ResolvePhase::Exhausted,
        }
    }
}
