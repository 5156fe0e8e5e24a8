//! Placement policies.

/// Discipline used to choose which free block satisfies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Return the first free block large enough to satisfy the request.
    FirstFit,
    /// Return the free block that leaves the smallest leftover.
    BestFit,
    /// Return the free block that leaves the largest leftover.
    ///
    /// If every candidate is an exact fit (leftover of zero), no block
    /// is returned — see the crate-level docs for why this asymmetry
    /// with `BestFit` is kept rather than "fixed".
    WorstFit,
}
