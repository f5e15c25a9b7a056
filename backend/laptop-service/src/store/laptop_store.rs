//! In-memory laptop catalog
//!
//! One readers-writer lock guards the map. `save` takes it exclusively,
//! `find` and `search` share it. A search holds the shared lock for its whole
//! scan, so writers wait until in-flight searches finish.
//!
//! Every laptop crossing the store boundary is cloned: callers never hold a
//! reference into the map.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{LaptopError, Result};
use crate::grpc::pb::{memory::Unit, Filter, Laptop, Memory};

#[derive(Debug, Default)]
pub struct LaptopStore {
    data: RwLock<HashMap<String, Laptop>>,
}

impl LaptopStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `laptop`
    ///
    /// ## Errors
    ///
    /// `AlreadyExists` if a laptop with the same id is stored; the stored one is left untouched
    pub async fn save(&self, laptop: &Laptop) -> Result<()> {
        let mut data = self.data.write().await;

        if data.contains_key(&laptop.id) {
            return Err(LaptopError::AlreadyExists);
        }

        data.insert(laptop.id.clone(), laptop.clone());
        Ok(())
    }

    /// Copy of the laptop with `id`, `None` if absent
    pub async fn find(&self, id: &str) -> Option<Laptop> {
        self.data.read().await.get(id).cloned()
    }

    /// Call `found` with a copy of every laptop qualifying under `filter`
    ///
    /// `ctx` is checked before each record; a cancelled or expired call stops the
    /// scan with that error. An error from `found` also stops the scan and is
    /// returned as-is.
    pub async fn search<F, Fut>(&self, ctx: &CallContext, filter: &Filter, mut found: F) -> Result<()>
    where
        F: FnMut(Laptop) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let data = self.data.read().await;

        for laptop in data.values() {
            ctx.check()?;

            if is_qualified(filter, laptop) {
                debug!(laptop_id = %laptop.id, "Laptop matches filter");
                found(laptop.clone()).await?;
            }
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

/// Whether `laptop` satisfies every bound in `filter`
pub fn is_qualified(filter: &Filter, laptop: &Laptop) -> bool {
    if laptop.price_usd > filter.max_price_usd {
        return false;
    }

    let (cores, min_ghz) = laptop
        .cpu
        .as_ref()
        .map(|cpu| (cpu.number_cores, cpu.min_ghz))
        .unwrap_or_default();

    if cores < filter.min_cpu_cores || min_ghz < filter.min_cpu_ghz {
        return false;
    }

    to_bit(laptop.ram.as_ref()) >= to_bit(filter.min_ram.as_ref())
}

/// Memory size in bits; unknown units and missing values normalize to 0
pub fn to_bit(memory: Option<&Memory>) -> u64 {
    let Some(memory) = memory else {
        return 0;
    };

    let shift = match Unit::try_from(memory.unit) {
        Ok(Unit::Bit) => 0,
        Ok(Unit::Byte) => 3,
        Ok(Unit::Kilobyte) => 13,
        Ok(Unit::Megabyte) => 23,
        Ok(Unit::Gigabyte) => 33,
        Ok(Unit::Terabyte) => 43,
        Ok(Unit::Unknown) | Err(_) => return 0,
    };

    memory.value.saturating_mul(1u64 << shift)
}
