mod free_list;
mod handle;
mod heap;

pub use free_list::{BITSET_SIZE, BitmapFreeList, FreeIndexSet, FreeIndexStack};
pub use handle::{DescriptorHandle, HeapKind, HeapLayout};
pub use heap::{DescriptorHeapManager, ExhaustionPolicy, HeapError};
