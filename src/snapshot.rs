//! Per-cycle attribute snapshot cache.
//!
//! `SnapshotCache` decorates an `AttributeSource` and memoizes attribute
//! reads between two calls to `flush()`. It remembers every attribute name
//! ever requested for an object, so after a flush the first read of that
//! object fetches the whole learned set in one batched call.

use ahash::AHashMap as HashMap;
use std::collections::BTreeSet;
use tracing::trace;

use crate::connection::{AttributeMap, AttributeSource, AttributeValue, ObjectName};
use crate::error::Result;

/// Caching decorator over an attribute source.
pub struct SnapshotCache<C> {
    inner: C,
    cached_values: HashMap<ObjectName, AttributeMap>,
    cached_names: HashMap<ObjectName, BTreeSet<String>>,
}

impl<C: AttributeSource> SnapshotCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cached_values: HashMap::new(),
            cached_names: HashMap::new(),
        }
    }

    /// Drops all cached values. The learned name sets survive.
    pub fn flush(&mut self) {
        self.cached_values.clear();
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Names learned for `object` so far.
    pub fn learned_names(&self, object: &ObjectName) -> Option<&BTreeSet<String>> {
        self.cached_names.get(object)
    }

    fn cached_attributes(&mut self, object: &ObjectName, names: &[String]) -> Result<&AttributeMap> {
        let hit = self
            .cached_values
            .get(object)
            .is_some_and(|values| names.iter().all(|n| values.contains_key(n)));

        if !hit {
            let mut wanted: BTreeSet<String> = names.iter().cloned().collect();
            if let Some(known) = self.cached_names.get(object) {
                wanted.extend(known.iter().cloned());
            }
            let request: Vec<String> = wanted.iter().cloned().collect();
            trace!("Batched read of {} attributes from {}", request.len(), object);

            let values = self.inner.get_attributes(object, &request)?;
            self.cached_names.insert(object.clone(), wanted);
            self.cached_values.insert(object.clone(), values);
        }

        Ok(self.cached_values.entry(object.clone()).or_default())
    }
}

impl<C: AttributeSource> AttributeSource for SnapshotCache<C> {
    fn get_attribute(&mut self, object: &ObjectName, name: &str) -> Result<AttributeValue> {
        let names = [name.to_string()];
        let cached = self.cached_attributes(object, &names)?.get(name).cloned();
        if let Some(value) = cached {
            return Ok(value);
        }
        // Omitted from the batch, most likely because reading it failed.
        // A direct read surfaces that failure to the caller.
        self.inner.get_attribute(object, name)
    }

    fn get_attributes(&mut self, object: &ObjectName, names: &[String]) -> Result<AttributeMap> {
        let values = self.cached_attributes(object, names)?;
        Ok(names
            .iter()
            .filter_map(|n| values.get(n).map(|v| (n.clone(), v.clone())))
            .collect())
    }

    fn query_names(&mut self, pattern: &ObjectName) -> Result<Vec<ObjectName>> {
        self.inner.query_names(pattern)
    }

    fn invoke(
        &mut self,
        object: &ObjectName,
        operation: &str,
        params: &[AttributeValue],
    ) -> Result<AttributeValue> {
        self.inner.invoke(object, operation, params)
    }
}
