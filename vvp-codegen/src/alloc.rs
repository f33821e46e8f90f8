use tracing::trace;

use crate::vector::{Address, Vector, ADDRESS_SPACE, ALLOCATION_FLOOR};

/// Tracks which bits of the thread bit space are in use by live vectors.
///
/// Allocation is first fit: the lowest run of free bits at or above the floor is
/// returned. Vectors are never freed implicitly, every consumer of a vector must
/// hand it back through [`BitAllocator::release`].
pub struct BitAllocator {
    occupied: Vec<u64>,
}

impl Default for BitAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BitAllocator {
    pub fn new() -> Self {
        Self {
            occupied: vec![0; (ADDRESS_SPACE / 64) as usize],
        }
    }

    fn peek(&self, addr: u32) -> bool {
        (self.occupied[(addr / 64) as usize] >> (addr % 64)) & 1 == 1
    }

    fn set(&mut self, addr: u32) {
        self.occupied[(addr / 64) as usize] |= 1 << (addr % 64);
    }

    fn clear(&mut self, addr: u32) {
        self.occupied[(addr / 64) as usize] &= !(1 << (addr % 64));
    }

    pub fn is_occupied(&self, addr: Address) -> bool {
        self.peek(addr.0)
    }

    /// Number of bits currently in use
    pub fn live_bits(&self) -> u32 {
        self.occupied.iter().map(|word| word.count_ones()).sum()
    }

    pub fn allocate(&mut self, width: u32) -> Vector {
        assert!(width > 0, "Attempted to allocate an empty vector");

        let mut base = ALLOCATION_FLOOR;
        let mut idx = 0;
        while idx < width {
            assert!(
                base + idx < ADDRESS_SPACE,
                "Thread bit space exhausted while allocating {width} bits"
            );
            if self.peek(base + idx) {
                base = base + idx + 1;
                idx = 0;
            } else {
                idx += 1;
            }
        }

        for addr in base..base + width {
            self.set(addr)
        }

        trace!("Allocated {width} bits at {base}");
        Vector::Owned {
            base: Address(base),
            width,
        }
    }

    pub fn release(&mut self, vector: Vector) {
        match vector {
            Vector::Constant { .. } => {}
            Vector::Flag(flag) => {
                panic!("Attempted to release the compare flag {flag:?} as an allocated vector")
            }
            Vector::Owned { base, width } => {
                assert!(
                    base.0 >= ALLOCATION_FLOOR,
                    "Owned vector at {base} is below the allocation floor"
                );
                trace!("Released {width} bits at {base}");
                for addr in base.0..base.0 + width {
                    assert!(self.peek(addr), "Double release of bit {addr}");
                    self.clear(addr)
                }
            }
        }
    }
}
