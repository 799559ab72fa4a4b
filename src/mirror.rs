//! Paired host/accelerator storage with explicit synchronization points.
//!
//! Every large solver array exists twice: a canonical host copy (the basis,
//! the rotation matrix, the workspace) and an accelerator mirror that is only
//! valid between an explicit upload and the following download. Instead of
//! duplicating that pattern per field, this module centralizes it: a
//! [`Mirrored`] buffer owns both copies and a
//! side marker saying which one is authoritative, and a [`DeviceArena`]
//! accounts for accelerator memory so that pool exhaustion surfaces as a
//! fatal, diagnosable error instead of a mid-iteration crash.
//!
//! The reference backend executes "device" compute on host memory through the
//! [`kernels`] submodule; a real accelerator backend would dispatch the same
//! entry points. Both copies live in ordinary address space here, which keeps
//! the consistency protocol testable: the invariants (no reads of a stale
//! side, push/pull complete before returning) are exactly those of a
//! two-memory-space deployment.

use crate::error::{SolverError, SolverErrorKind};
use faer::{Mat, MatMut, MatRef};

/// Accelerator-side compute entry points.
///
/// The solver's data-parallel work (the Gram-Schmidt inner-product panels,
/// the basis updates, the restart rotation) goes through these functions.
/// The reference backend runs them on host memory with `faer`; a real
/// accelerator backend would dispatch the corresponding kernels. All calls
/// are synchronous: the result is complete when the function returns.
pub(crate) mod kernels {
    use faer::{Accum, MatMut, MatRef, Par, linalg::matmul::matmul};

    /// `dst = alpha * lhs * rhs`, or `dst += ...` when `accumulate` is set.
    pub(crate) fn gemm(
        dst: MatMut<'_, f64>,
        lhs: MatRef<'_, f64>,
        rhs: MatRef<'_, f64>,
        alpha: f64,
        accumulate: bool,
    ) {
        let accum = if accumulate { Accum::Add } else { Accum::Replace };
        matmul(dst, accum, lhs, rhs, alpha, Par::Seq);
    }

    /// `dst = alpha * lhs^T * rhs`, or `dst += ...` when `accumulate` is set.
    /// This is the inner-product panel of block Gram-Schmidt.
    pub(crate) fn gemm_tn(
        dst: MatMut<'_, f64>,
        lhs: MatRef<'_, f64>,
        rhs: MatRef<'_, f64>,
        alpha: f64,
        accumulate: bool,
    ) {
        let accum = if accumulate { Accum::Add } else { Accum::Replace };
        matmul(dst, accum, lhs.transpose(), rhs, alpha, Par::Seq);
    }
}

/// Accelerator memory pool with byte accounting.
///
/// Every [`Mirrored`] buffer reserves its device footprint at construction
/// and releases it on drop. A reservation that would exceed the capacity
/// fails with `ResourceExhaustion`, before the buffer exists.
#[derive(Debug)]
pub struct DeviceArena {
    capacity: usize,
    in_use: usize,
}

impl DeviceArena {
    /// A pool of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, in_use: 0 }
    }

    /// Bytes currently reserved.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Bytes still available.
    pub fn available(&self) -> usize {
        self.capacity - self.in_use
    }

    fn reserve(&mut self, bytes: usize) -> Result<(), SolverError> {
        if bytes > self.available() {
            return Err(SolverErrorKind::ResourceExhaustion {
                requested: bytes,
                available: self.available(),
            }
            .into());
        }
        self.in_use += bytes;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.in_use);
        self.in_use -= bytes;
    }
}

/// Synchronization state of a mirrored buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorSide {
    /// Both copies hold the same data (after a push or pull).
    InSync,
    /// The host copy was written since the last sync; the device mirror is
    /// stale.
    HostAhead,
    /// A device kernel wrote the mirror since the last sync; the host copy
    /// must not be read until the next pull.
    DeviceAhead,
}

/// A host matrix paired with its accelerator mirror.
///
/// The host copy is canonical solver state; the device copy is transient and
/// re-derivable. `push` and `pull` are blocking, whole-range copies: when they
/// return, the destination side is complete and authoritative. Column-range
/// variants exist for the common case of syncing only freshly written basis
/// columns.
#[derive(Debug)]
pub struct Mirrored {
    host: Mat<f64>,
    device: Mat<f64>,
    side: MirrorSide,
    bytes: usize,
}

impl Mirrored {
    /// Allocates an `nrows x ncols` mirrored buffer, zero-initialized on both
    /// sides, reserving the device footprint from `arena`.
    pub fn new(arena: &mut DeviceArena, nrows: usize, ncols: usize) -> Result<Self, SolverError> {
        let bytes = nrows * ncols * std::mem::size_of::<f64>();
        arena.reserve(bytes)?;
        Ok(Self {
            host: Mat::zeros(nrows, ncols),
            device: Mat::zeros(nrows, ncols),
            side: MirrorSide::InSync,
            bytes,
        })
    }

    /// Releases the device reservation. Must be called before the arena is
    /// torn down; the host copy stays usable afterwards.
    pub fn free_device(&mut self, arena: &mut DeviceArena) {
        arena.release(self.bytes);
        self.bytes = 0;
    }

    pub fn nrows(&self) -> usize {
        self.host.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.host.ncols()
    }

    /// Current synchronization state.
    pub fn side(&self) -> MirrorSide {
        self.side
    }

    /// Copies the host copy to the device mirror. Blocking; complete on
    /// return.
    pub fn push(&mut self) {
        debug_assert_ne!(
            self.side,
            MirrorSide::DeviceAhead,
            "push would clobber unsynced device results"
        );
        self.device.as_mut().copy_from(self.host.as_ref());
        self.side = MirrorSide::InSync;
    }

    /// Copies columns `[start, start + len)` host -> device.
    pub fn push_cols(&mut self, start: usize, len: usize) {
        debug_assert_ne!(
            self.side,
            MirrorSide::DeviceAhead,
            "push would clobber unsynced device results"
        );
        self.device
            .as_mut()
            .subcols_mut(start, len)
            .copy_from(self.host.as_ref().subcols(start, len));
        self.side = MirrorSide::InSync;
    }

    /// Copies the device mirror back to the host. Blocking; complete on
    /// return.
    pub fn pull(&mut self) {
        self.host.as_mut().copy_from(self.device.as_ref());
        self.side = MirrorSide::InSync;
    }

    /// Copies columns `[start, start + len)` device -> host.
    pub fn pull_cols(&mut self, start: usize, len: usize) {
        self.host
            .as_mut()
            .subcols_mut(start, len)
            .copy_from(self.device.as_ref().subcols(start, len));
        self.side = MirrorSide::InSync;
    }

    /// Read view of the host copy. Must not be called between a device-side
    /// write and the following pull.
    pub fn host(&self) -> MatRef<'_, f64> {
        debug_assert_ne!(
            self.side,
            MirrorSide::DeviceAhead,
            "host copy read while the device mirror holds unsynced results"
        );
        self.host.as_ref()
    }

    /// Write view of the host copy; marks the device mirror stale.
    pub fn host_mut(&mut self) -> MatMut<'_, f64> {
        debug_assert_ne!(
            self.side,
            MirrorSide::DeviceAhead,
            "host copy written while the device mirror holds unsynced results"
        );
        self.side = MirrorSide::HostAhead;
        self.host.as_mut()
    }

    /// Read view of the device mirror (kernel input). Requires a push since
    /// the last host-side write.
    pub fn device(&self) -> MatRef<'_, f64> {
        debug_assert_ne!(
            self.side,
            MirrorSide::HostAhead,
            "device mirror read without a preceding push"
        );
        self.device.as_ref()
    }

    /// Write view of the device mirror (kernel output); marks the host copy
    /// stale until the next `pull`.
    pub fn device_mut(&mut self) -> MatMut<'_, f64> {
        debug_assert_ne!(
            self.side,
            MirrorSide::HostAhead,
            "device mirror written while stale; push first"
        );
        self.side = MirrorSide::DeviceAhead;
        self.device.as_mut()
    }
}
