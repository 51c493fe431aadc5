/// A bounded set of available slot indices.
///
/// Heaps only talk to their free list through this trait so the bitmap can be
/// swapped for another strategy without touching callers.
pub trait FreeIndexSet {
    /// Creates a set where every index in `0..capacity` is available.
    fn with_capacity(capacity: u32) -> Self
    where
        Self: Sized;

    fn capacity(&self) -> u32;

    /// Removes and returns an available index, `None` when the set is empty.
    fn acquire(&mut self) -> Option<u32>;

    /// Makes `index` available again. The index must currently be taken.
    fn release(&mut self, index: u32);

    fn is_free(&self, index: u32) -> bool;

    fn free_count(&self) -> u32;
}

/// Number of slots tracked by one bitmap word.
pub const BITSET_SIZE: u32 = 1024;
const LANES: usize = (BITSET_SIZE / u64::BITS) as usize;

#[derive(Clone)]
struct BitSet([u64; LANES]);

impl BitSet {
    /// Sets the lowest `count` bits.
    fn with_low_bits(count: u32) -> Self {
        let mut lanes = [0u64; LANES];
        for (i, lane) in lanes.iter_mut().enumerate() {
            let lane_start = i as u32 * u64::BITS;
            if lane_start + u64::BITS <= count {
                *lane = u64::MAX;
            } else if lane_start < count {
                *lane = (1u64 << (count - lane_start)) - 1;
            }
        }
        Self(lanes)
    }

    #[inline]
    fn none(&self) -> bool {
        self.0.iter().all(|&lane| lane == 0)
    }

    #[inline]
    fn first_set(&self) -> Option<u32> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, lane)| **lane != 0)
            .map(|(i, lane)| i as u32 * u64::BITS + lane.trailing_zeros())
    }

    #[inline]
    fn test(&self, bit: u32) -> bool {
        self.0[(bit / u64::BITS) as usize] & (1u64 << (bit % u64::BITS)) != 0
    }

    #[inline]
    fn set(&mut self, bit: u32) {
        self.0[(bit / u64::BITS) as usize] |= 1u64 << (bit % u64::BITS);
    }

    #[inline]
    fn clear(&mut self, bit: u32) {
        self.0[(bit / u64::BITS) as usize] &= !(1u64 << (bit % u64::BITS));
    }
}

/// Free list with one bit per slot, set while the slot is free.
///
/// Allocation scans words in ascending order and skips words with no free bit,
/// so the lowest free index is always handed out first.
pub struct BitmapFreeList {
    words: Vec<BitSet>,
    capacity: u32,
    free: u32,
}

impl FreeIndexSet for BitmapFreeList {
    fn with_capacity(capacity: u32) -> Self {
        let word_count = capacity.div_ceil(BITSET_SIZE) as usize;
        let mut words = vec![BitSet::with_low_bits(BITSET_SIZE); word_count];

        // bits past the end of the heap must never look free
        let remainder = capacity % BITSET_SIZE;
        if let Some(last) = words.last_mut()
            && remainder != 0
        {
            *last = BitSet::with_low_bits(remainder);
        }

        Self {
            words,
            capacity,
            free: capacity,
        }
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn acquire(&mut self) -> Option<u32> {
        for (group, bs) in self.words.iter_mut().enumerate() {
            if bs.none() {
                continue;
            }

            let bit = bs.first_set()?;
            bs.clear(bit);
            self.free -= 1;
            return Some(group as u32 * BITSET_SIZE + bit);
        }
        None
    }

    fn release(&mut self, index: u32) {
        let (group, bit) = split(index);
        let bs = &mut self.words[group];
        debug_assert!(!bs.test(bit), "descriptor slot {index} freed twice");
        bs.set(bit);
        self.free += 1;
    }

    fn is_free(&self, index: u32) -> bool {
        let (group, bit) = split(index);
        self.words.get(group).is_some_and(|bs| bs.test(bit))
    }

    fn free_count(&self) -> u32 {
        self.free
    }
}

#[inline]
fn split(index: u32) -> (usize, u32) {
    ((index / BITSET_SIZE) as usize, index % BITSET_SIZE)
}

/// Stack of free indices. Constant-time allocation, but recently freed slots
/// are reused first instead of the lowest one.
pub struct FreeIndexStack {
    stack: Vec<u32>,
    free_mask: Vec<bool>,
}

impl FreeIndexSet for FreeIndexStack {
    fn with_capacity(capacity: u32) -> Self {
        Self {
            stack: (0..capacity).rev().collect(),
            free_mask: vec![true; capacity as usize],
        }
    }

    fn capacity(&self) -> u32 {
        self.free_mask.len() as u32
    }

    fn acquire(&mut self) -> Option<u32> {
        let index = self.stack.pop()?;
        self.free_mask[index as usize] = false;
        Some(index)
    }

    fn release(&mut self, index: u32) {
        let slot = &mut self.free_mask[index as usize];
        debug_assert!(!*slot, "descriptor slot {index} freed twice");
        *slot = true;
        self.stack.push(index);
    }

    fn is_free(&self, index: u32) -> bool {
        self.free_mask.get(index as usize).copied().unwrap_or(false)
    }

    fn free_count(&self) -> u32 {
        self.stack.len() as u32
    }
}
