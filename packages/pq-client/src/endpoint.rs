//! Endpoint resolution and caching.
//!
//! A partition's endpoint is resolved lazily and cached in a `DashMap`
//! for lock-free concurrent lookup. `invalidate` drops a stale entry so
//! the next lookup re-resolves, which is how the client reacts to a
//! `NotPrimary` or connection-refused signal without restarting.

use dashmap::DashMap;

/// Base URL for one partition's `pq-server` process, e.g.
/// `http://10.0.1.4:8080`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(pub String);

/// Resolves a partition id to its current endpoint. Implementations may
/// be a static list, a DNS lookup, or a placement-service call -- the
/// client treats resolution as an opaque closure.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, partition_id: u64) -> Endpoint;
}

/// A static list of endpoints, indexed by `partition_id % len()`. The
/// simplest resolver, used when partitions are assigned to fixed hosts
/// at deploy time.
pub struct StaticEndpointResolver {
    endpoints: Vec<Endpoint>,
}

impl StaticEndpointResolver {
    #[must_use]
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        assert!(!endpoints.is_empty(), "at least one endpoint is required");
        Self { endpoints }
    }
}

impl EndpointResolver for StaticEndpointResolver {
    fn resolve(&self, partition_id: u64) -> Endpoint {
        let index = (partition_id as usize) % self.endpoints.len();
        self.endpoints[index].clone()
    }
}

/// Caches resolved endpoints per partition id so the fan-out client does
/// not re-run resolution on every call.
pub struct EndpointCache {
    resolver: Box<dyn EndpointResolver>,
    cache: DashMap<u64, Endpoint>,
}

impl EndpointCache {
    #[must_use]
    pub fn new(resolver: Box<dyn EndpointResolver>) -> Self {
        Self { resolver, cache: DashMap::new() }
    }

    /// Returns the cached endpoint for `partition_id`, resolving and
    /// populating the cache on first access.
    #[must_use]
    pub fn get(&self, partition_id: u64) -> Endpoint {
        if let Some(endpoint) = self.cache.get(&partition_id) {
            return endpoint.clone();
        }
        let endpoint = self.resolver.resolve(partition_id);
        self.cache.insert(partition_id, endpoint.clone());
        endpoint
    }

    /// Drops a cached entry, forcing the next `get` to re-resolve. Called
    /// after a transport failure or `NotPrimary` response.
    pub fn invalidate(&self, partition_id: u64) {
        self.cache.remove(&partition_id);
    }
}
