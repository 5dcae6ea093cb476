use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! veth_counters {
    ($($(#[$doc:meta])* $name:ident,)*) => {
        /// Live counters of one transport, shared with its receive worker.
        #[derive(Debug, Default)]
        pub struct VethStats {
            $($(#[$doc])* pub $name: AtomicU64,)*
        }

        /// A copy of [`VethStats`] at one point in time.
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
        }

        impl VethStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }

        impl fmt::Display for StatsSnapshot {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut first = true;
                $(
                    if self.$name != 0 {
                        if !first {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}={}", stringify!($name), self.$name)?;
                        first = false;
                    }
                )*
                if first {
                    f.write_str("idle")?;
                }
                Ok(())
            }
        }
    };
}

veth_counters! {
    tx_pkts,
    tx_bytes,
    /// Batch messages handed to the channel.
    tx_batch,
    /// Unicast frames dropped because the gateway MAC is not known yet.
    tx_drop_not_resolved,
    /// Frames dropped as unsendable: too long for the wire, or too short to address.
    tx_drop_invalid,
    tx_channel_err,
    rx_pkts,
    rx_bytes,
    /// Batch messages taken off the delivery queue.
    rx_batch,
    /// Messages dropped whole because they did not parse.
    rx_parse_err,
    rx_channel_err,
    /// Frames rewritten into the other tunnel-key domain and sent on.
    rx_rewrite_fwd,
    rx_rewrite_drop,
}

impl VethStats {
    pub fn new() -> Self {
        VethStats::default()
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
