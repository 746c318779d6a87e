//! Bounded free-list of recyclable raster buffers
//!
//! Builds happen continuously while the timeline moves; recycling buffers
//! keeps the worker from hammering the allocator. The pool never blocks and
//! never grows past its capacity: excess releases drop the buffer outright.

use log::{debug, trace};

use crate::entities::raster::Raster;

/// Finite pool of raster buffers
#[derive(Debug)]
pub struct RasterPool {
    free: Vec<Raster>,
    capacity: usize,
}

impl RasterPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Take a buffer if one is pooled; caller allocates fresh on None
    pub fn acquire(&mut self) -> Option<Raster> {
        let r = self.free.pop();
        if r.is_some() {
            trace!("pool acquire, {} left", self.free.len());
        }
        r
    }

    /// Return a buffer to the pool, or drop it when the pool is full
    pub fn release(&mut self, mut raster: Raster) {
        if self.free.len() < self.capacity {
            raster.reset();
            self.free.push(raster);
        } else {
            trace!("pool full ({}), dropping buffer", self.capacity);
        }
    }

    /// Pre-warm with `n` fresh empty buffers (capped at capacity)
    pub fn prime(&mut self, n: usize) {
        for _ in 0..n {
            if self.free.len() >= self.capacity {
                break;
            }
            self.free.push(Raster::new());
        }
        debug!("pool primed: {} buffers pooled", self.free.len());
    }

    /// Destroy every pooled buffer
    pub fn drain(&mut self) {
        let n = self.free.len();
        self.free.clear();
        if n > 0 {
            debug!("pool drained: {} buffers destroyed", n);
        }
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
