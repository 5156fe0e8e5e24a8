//! # blockalloc — a user-space block allocator
//!
//! A heap allocator that manages one fixed-size contiguous region obtained
//! once from the host process (via `libc::malloc`) and serves variable-size
//! byte requests out of it. Released blocks are reclaimed by coalescing
//! with physically adjacent free neighbors; an explicit [`BlockAllocator::compact`]
//! operation slides live allocations down toward the base of the region to
//! consolidate free space into one hole.
//!
//! ```text
//!   Region layout (one allocator instance owns exactly one of these):
//!
//!   ┌────────┬─────────────┬────────┬─────────────┬────────┬────────────────┐
//!   │ header │   payload   │ header │   payload   │ header │    payload     │
//!   │  (16B) │  allocated  │  (16B) │    free     │  (16B) │   allocated    │
//!   └────────┴─────────────┴────────┴─────────────┴────────┴────────────────┘
//!
//!   free_list  ──► block 2 ──► null           (address-ascending)
//!   alloc_list ──► block 1 ──► block 3 ──► null (address-ascending)
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   blockalloc
//!   ├── header        - the intrusive block header (size + successor link)
//!   ├── policy         - AllocationPolicy: FirstFit / BestFit / WorstFit
//!   ├── allocator       - BlockAllocator: the core allocator
//!   └── address_list    - AddressList: an independent teaching companion
//! ```
//!
//! ## Quick start
//!
//! ```
//! use blockalloc::{AllocationPolicy, BlockAllocator};
//!
//! let alloc = BlockAllocator::initialize(1024, AllocationPolicy::FirstFit);
//!
//! let p = alloc.allocate(64).expect("region has room");
//! unsafe {
//!     (p.as_ptr() as *mut u64).write(42);
//!     assert_eq!((p.as_ptr() as *mut u64).read(), 42);
//! }
//! alloc.deallocate(p);
//! ```
//!
//! ## What this crate does not do
//!
//! - Alignment beyond the natural alignment of the block header itself.
//! - Allocation spanning more than one region; a `BlockAllocator` manages
//!   exactly the bytes it was initialized with.
//! - Transparent pointer fixup across compaction — `compact` reports
//!   before/after address pairs and the caller updates its own pointers.
//! - Reentrant use from a signal handler.
//! - Growing a region after `initialize`.
//!
//! ## Safety
//!
//! This crate manages memory manually behind raw pointers; most of its
//! internals are `unsafe`. The public API is safe to call (contract
//! violations panic rather than corrupting memory), but the pointers it
//! hands back are raw and the caller is responsible for not using them
//! after `deallocate` or an uncooperated-with `compact`.

mod address_list;
mod allocator;
mod header;
mod policy;

pub use address_list::{AddressList, NodeRef};
pub use allocator::BlockAllocator;
pub use policy::AllocationPolicy;
