//! Deterministic, weight-proportional selection of a worker host.
//!
//! The real fleet-wide scheduler (consistent hashing across a large,
//! changing set of servers) is out of scope here; what's in scope is the
//! contract it must satisfy: `pick(hosts, key)` is a pure function of
//! its inputs, and across many uniformly-distributed keys each host
//! gets a share of the traffic proportional to its weight.

use std::hash::{Hash, Hasher};

use errors::*;

/// A remote compilation worker: `host:port`, weighted by `weight` when
/// more than one host is configured. The textual form is
/// `HOST:PORT/WEIGHT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

/// Sentinel host meaning "run the compiler locally, don't ship it
/// anywhere". A plain string compare on `host`, preserved exactly as
/// the original scheduler did it for backward compatibility.
pub const LOCALHOST_SENTINEL: &str = "localhost";

impl HostSpec {
    pub fn is_localhost_sentinel(&self) -> bool {
        self.host == LOCALHOST_SENTINEL
    }
}

impl ::std::str::FromStr for HostSpec {
    type Err = Error;

    /// Parse `HOST:PORT/WEIGHT`.
    fn from_str(s: &str) -> Result<HostSpec> {
        let (host_port, weight) = s
            .rsplit_once('/')
            .ok_or_else(|| Error::from(format!("invalid host spec (missing /WEIGHT): {}", s)))?;
        let (host, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| Error::from(format!("invalid host spec (missing :PORT): {}", s)))?;
        if host.is_empty() {
            bail!("invalid host spec (empty host): {}", s);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::from(format!("invalid port in host spec: {}", s)))?;
        let weight: u32 = weight
            .parse()
            .map_err(|_| Error::from(format!("invalid weight in host spec: {}", s)))?;
        Ok(HostSpec {
            host: host.to_owned(),
            port,
            weight,
        })
    }
}

/// A small, deterministic (non-randomized) hash. `std::hash::DefaultHasher`
/// is seeded randomly per-process, which would make `pick` nondeterministic
/// across restarts; FNV-1a is simple, fast, and fixed.
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Fnv1a(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1a {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

fn hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = Fnv1a::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Pick a host for `key` out of `hosts`, deterministically and
/// weight-proportionally. Panics if `hosts` is empty; callers are
/// expected to always configure at least one host.
pub fn pick<'a, K: Hash>(hosts: &'a [HostSpec], key: &K) -> &'a HostSpec {
    assert!(!hosts.is_empty(), "pick() requires at least one host");
    if hosts.len() == 1 {
        return &hosts[0];
    }
    let total_weight: u64 = hosts.iter().map(|h| u64::from(h.weight)).sum();
    let mut bucket = hash_key(key) % total_weight;
    for host in hosts {
        let w = u64::from(host.weight);
        if bucket < w {
            return host;
        }
        bucket -= w;
    }
    // Unreachable as long as total_weight is the true sum of weights,
    // but a last host fallback is cheaper than an `unwrap` on a `None`.
    &hosts[hosts.len() - 1]
}
