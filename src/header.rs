//! The intrusive block header.
//!
//! Every block in the region is a header immediately followed by its
//! payload. The header carries only what the allocator needs to walk its
//! own lists — a payload size and a successor link. There is no `is_free`
//! flag: which list a block belongs to is determined by which root
//! (`free_list` or `alloc_list`) its chain hangs off of, never by a bit
//! stashed in the header itself.

use std::mem;

#[repr(C)]
pub(crate) struct Header {
    pub(crate) size: usize,
    pub(crate) next: *mut Header,
}

/// On-wire size of a header. 16 bytes on a 64-bit host (one `usize` plus
/// one pointer), matching the reference implementation's `HEADER_SIZE`.
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Address of the first payload byte of the block whose header starts at `header`.
///
/// # Safety
/// `header` must point at a live header within the managed region.
pub(crate) unsafe fn payload_start(header: *mut Header) -> *mut u8 {
    unsafe { (header as *mut u8).add(HEADER_SIZE) }
}

/// Recovers the header address from a payload pointer previously handed to a caller.
///
/// # Safety
/// `payload` must have been returned by a prior `allocate`/`callocate` call
/// on the same region.
pub(crate) unsafe fn header_from_payload(payload: *mut u8) -> *mut Header {
    unsafe { payload.sub(HEADER_SIZE) as *mut Header }
}
