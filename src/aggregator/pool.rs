//! Reusable result objects
//!
//! Results are rendered into preallocated slots, one small group per
//! instrument ordinal. A handle names its slot by index, so nothing is
//! returned to the allocator while the pool lives. When every slot of an
//! instrument is taken the pool falls back to a heap allocation instead of
//! failing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::VwapTwoWayPrice;
use crate::error::{AggregatorError, Result};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug)]
struct Slot {
    price: VwapTwoWayPrice,
    in_use: bool,
}

#[derive(Debug)]
struct InstrumentSlots {
    instrument: Arc<str>,
    slots: Vec<Slot>,
}

/// Handle to a result acquired from a [`ResultPool`].
///
/// Handles are not `Clone`, so a handle can be released at most once.
#[derive(Debug)]
pub struct PriceHandle(HandleKind);

#[derive(Debug)]
enum HandleKind {
    Slot { pool: u32, instrument: u32, slot: u32 },
    Spilled(Box<VwapTwoWayPrice>),
}

impl PriceHandle {
    /// Whether this result came from the allocation fallback
    pub fn is_spilled(&self) -> bool {
        matches!(self.0, HandleKind::Spilled(_))
    }
}

/// Fixed-capacity pool of result objects keyed by instrument ordinal
#[derive(Debug)]
pub struct ResultPool {
    id: u32,
    capacity: usize,
    instruments: Vec<InstrumentSlots>,
    spilled: u64,
}

impl ResultPool {
    /// Create a pool holding `capacity` results per instrument.
    ///
    /// A capacity of zero disables pooling: every acquire allocates.
    pub fn new(capacity: usize) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            instruments: Vec::new(),
            spilled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Preallocate the slots of a new instrument, returning its ordinal
    pub fn register(&mut self, instrument: Arc<str>) -> usize {
        let slots = (0..self.capacity)
            .map(|_| Slot {
                price: VwapTwoWayPrice::new(Arc::clone(&instrument)),
                in_use: false,
            })
            .collect();
        self.instruments.push(InstrumentSlots { instrument, slots });
        self.instruments.len() - 1
    }

    /// Take a free result for an instrument, allocating when none is free
    pub fn acquire(&mut self, instrument: usize) -> Result<PriceHandle> {
        let group = self.instruments.get_mut(instrument).ok_or_else(|| {
            AggregatorError::PoolMisuse(format!("instrument #{instrument} is not registered"))
        })?;

        if let Some((index, slot)) = group
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.in_use)
        {
            slot.in_use = true;
            return Ok(PriceHandle(HandleKind::Slot {
                pool: self.id,
                instrument: instrument as u32,
                slot: index as u32,
            }));
        }

        self.spilled += 1;
        Ok(PriceHandle(HandleKind::Spilled(Box::new(
            VwapTwoWayPrice::new(Arc::clone(&group.instrument)),
        ))))
    }

    fn slot(&self, pool: u32, instrument: u32, slot: u32) -> Option<&Slot> {
        if pool != self.id {
            return None;
        }
        self.instruments
            .get(instrument as usize)?
            .slots
            .get(slot as usize)
            .filter(|s| s.in_use)
    }

    /// Read the result behind a handle.
    ///
    /// Returns `None` for a handle issued by another pool.
    pub fn get<'a>(&'a self, handle: &'a PriceHandle) -> Option<&'a VwapTwoWayPrice> {
        match &handle.0 {
            HandleKind::Slot {
                pool,
                instrument,
                slot,
            } => self.slot(*pool, *instrument, *slot).map(|s| &s.price),
            HandleKind::Spilled(price) => Some(&**price),
        }
    }

    /// Mutable access to the result behind a handle
    pub fn get_mut<'a>(
        &'a mut self,
        handle: &'a mut PriceHandle,
    ) -> Option<&'a mut VwapTwoWayPrice> {
        match &mut handle.0 {
            HandleKind::Slot {
                pool,
                instrument,
                slot,
            } => {
                if *pool != self.id {
                    return None;
                }
                self.instruments
                    .get_mut(*instrument as usize)?
                    .slots
                    .get_mut(*slot as usize)
                    .filter(|s| s.in_use)
                    .map(|s| &mut s.price)
            }
            HandleKind::Spilled(price) => Some(&mut **price),
        }
    }

    /// Return a result to the pool.
    ///
    /// Spilled results are simply dropped. A handle from another pool is
    /// reported as misuse and leaves this pool untouched.
    pub fn release(&mut self, handle: PriceHandle) -> Result<()> {
        match handle.0 {
            HandleKind::Spilled(_) => Ok(()),
            HandleKind::Slot {
                pool,
                instrument,
                slot,
            } => {
                if pool != self.id {
                    return Err(AggregatorError::PoolMisuse(format!(
                        "handle belongs to pool #{pool}, not #{}",
                        self.id
                    )));
                }
                let entry = self
                    .instruments
                    .get_mut(instrument as usize)
                    .and_then(|group| group.slots.get_mut(slot as usize))
                    .filter(|s| s.in_use)
                    .ok_or_else(|| {
                        AggregatorError::PoolMisuse(format!(
                            "slot {slot} of instrument #{instrument} is not in use"
                        ))
                    })?;
                entry.in_use = false;
                Ok(())
            }
        }
    }

    /// Slots of an instrument currently handed out
    pub fn in_use(&self, instrument: usize) -> usize {
        self.instruments
            .get(instrument)
            .map(|group| group.slots.iter().filter(|s| s.in_use).count())
            .unwrap_or(0)
    }

    /// Number of acquisitions served by the allocation fallback
    pub fn spilled(&self) -> u64 {
        self.spilled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PriceState;

    #[test]
    fn test_acquire_reuses_released_slot() {
        let mut pool = ResultPool::new(2);
        let aapl = pool.register(Arc::from("AAPL"));

        let handle = pool.acquire(aapl).unwrap();
        assert!(!handle.is_spilled());
        assert_eq!(pool.in_use(aapl), 1);
        pool.release(handle).unwrap();
        assert_eq!(pool.in_use(aapl), 0);

        let handle = pool.acquire(aapl).unwrap();
        assert!(!handle.is_spilled());
        assert_eq!(pool.spilled(), 0);
        pool.release(handle).unwrap();
    }

    #[test]
    fn test_exhaustion_falls_back_to_allocation() {
        let mut pool = ResultPool::new(2);
        let aapl = pool.register(Arc::from("AAPL"));

        let first = pool.acquire(aapl).unwrap();
        let second = pool.acquire(aapl).unwrap();
        let third = pool.acquire(aapl).unwrap();

        assert!(!first.is_spilled());
        assert!(!second.is_spilled());
        assert!(third.is_spilled());
        assert_eq!(pool.spilled(), 1);
        assert_eq!(pool.get(&third).map(|p| &*p.instrument), Some("AAPL"));

        for handle in [first, second, third] {
            pool.release(handle).unwrap();
        }
        assert_eq!(pool.in_use(aapl), 0);
    }

    #[test]
    fn test_zero_capacity_always_allocates() {
        let mut pool = ResultPool::new(0);
        let aapl = pool.register(Arc::from("AAPL"));
        let handle = pool.acquire(aapl).unwrap();
        assert!(handle.is_spilled());
        pool.release(handle).unwrap();
    }

    #[test]
    fn test_instruments_are_independent() {
        let mut pool = ResultPool::new(1);
        let aapl = pool.register(Arc::from("AAPL"));
        let msft = pool.register(Arc::from("MSFT"));

        let a = pool.acquire(aapl).unwrap();
        let m = pool.acquire(msft).unwrap();
        assert!(!a.is_spilled());
        assert!(!m.is_spilled());
        assert_eq!(pool.get(&m).map(|p| &*p.instrument), Some("MSFT"));
        pool.release(a).unwrap();
        pool.release(m).unwrap();
    }

    #[test]
    fn test_write_through_handle() {
        let mut pool = ResultPool::new(1);
        let aapl = pool.register(Arc::from("AAPL"));
        let mut handle = pool.acquire(aapl).unwrap();

        pool.get_mut(&mut handle)
            .unwrap()
            .update(PriceState::Indicative, 1.0, 2.0, 3.0, 4.0);
        let price = pool.get(&handle).unwrap();
        assert_eq!(price.state, PriceState::Indicative);
        assert_eq!(price.offer_amount, 4.0);
        pool.release(handle).unwrap();
    }

    #[test]
    fn test_foreign_handle_is_misuse() {
        let mut ours = ResultPool::new(1);
        let mut theirs = ResultPool::new(1);
        ours.register(Arc::from("AAPL"));
        let idx = theirs.register(Arc::from("AAPL"));

        let foreign = theirs.acquire(idx).unwrap();
        assert!(ours.get(&foreign).is_none());
        assert!(matches!(
            ours.release(foreign),
            Err(AggregatorError::PoolMisuse(_))
        ));
        assert_eq!(theirs.in_use(idx), 1);
    }

    #[test]
    fn test_unregistered_instrument_is_misuse() {
        let mut pool = ResultPool::new(1);
        assert!(matches!(
            pool.acquire(7),
            Err(AggregatorError::PoolMisuse(_))
        ));
    }
}
