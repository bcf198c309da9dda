use super::{Device, LaunchConfig, MemoryReservation};
use crate::bitmatrix::BitMatrix;
use crate::bitvec::BitRange;
use crate::error::M4rError;

/// An independent, ordered queue of work on a [`Device`]
///
/// Every launch issued through a stream completes before the next one starts, so work within a
/// stream runs in program order. Different streams are not ordered with respect to each other;
/// anything they write to the same location must be combined atomically. A stream holds its share
/// of device memory for as long as it is alive.
#[derive(Debug)]
pub struct ExecutionStream<'d> {
    id: usize,
    device: &'d Device,
    _memory: MemoryReservation<'d>,
}

impl<'d> ExecutionStream<'d> {
    pub(crate) fn new(device: &'d Device, id: usize, bytes: usize) -> Result<Self, M4rError> {
        Ok(ExecutionStream {
            id,
            device,
            _memory: device.reserve(bytes)?,
        })
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn device(&self) -> &'d Device {
        self.device
    }

    /// See [`Device::launch`]
    #[inline]
    pub fn launch(
        &self,
        launch: LaunchConfig,
        units: usize,
        kernel: impl Fn(usize) + Sync + Send,
    ) -> Result<(), M4rError> {
        tracing::trace!(stream = self.id, units, "stream launch");
        self.device.launch(launch, units, kernel)
    }

    /// See [`Device::launch_rows`]
    #[inline]
    pub fn launch_rows(
        &self,
        launch: LaunchConfig,
        out: &mut BitMatrix,
        kernel: impl Fn(usize, &mut BitRange) + Sync + Send,
    ) -> Result<(), M4rError> {
        tracing::trace!(stream = self.id, units = out.rows(), "stream launch rows");
        self.device.launch_rows(launch, out, kernel)
    }
}
