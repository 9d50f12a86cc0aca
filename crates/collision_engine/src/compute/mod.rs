//! Compute device abstraction
//!
//! A deliberately small slice of an OpenCL-style execution model: buffers,
//! programs, asynchronous kernel launches ordered by events, and profiling
//! timestamps per event. Backends program against the [`Compute`] trait;
//! [`host::HostDevice`] provides an in-process implementation for platforms
//! without a device and for tests.

pub mod host;

use std::ops::Deref;

use bitflags::bitflags;
use thiserror::Error;

/// Errors surfaced by compute devices
#[derive(Debug, Error)]
pub enum ComputeError {
    /// A buffer, program, or event handle does not name a live object
    #[error("invalid handle: {0}")]
    InvalidHandle(u32),
    /// A read, write, or fill fell outside the target buffer
    #[error("buffer access out of bounds: offset {offset} + len {len} > size {size}")]
    OutOfBounds {
        /// Byte offset of the access
        offset: usize,
        /// Byte length of the access
        len: usize,
        /// Byte size of the buffer
        size: usize,
    },
    /// The program does not contain the named kernel
    #[error("unknown kernel: {0}")]
    UnknownKernel(String),
    /// A kernel was launched with the wrong argument list
    #[error("kernel {kernel}: argument mismatch: {msg}")]
    ArgMismatch {
        /// Kernel name
        kernel: String,
        /// Description of the mismatch
        msg: String,
    },
    /// The device could not allocate a buffer
    #[error("allocation of {0} bytes failed")]
    Allocation(usize),
    /// Program compilation failed
    #[error("program compilation failed: {0}")]
    Compile(String),
}

/// Handle to a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer(pub u32);

/// Handle to a compiled program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program(pub u32);

/// Handle to an asynchronous operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event(pub u32);

bitflags! {
    /// Buffer allocation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemFlag: u32 {
        /// Kernels may read and write the buffer
        const READ_WRITE = 1 << 0;
        /// Kernels only read the buffer
        const READ_ONLY = 1 << 1;
        /// Kernels only write the buffer
        const WRITE_ONLY = 1 << 2;
    }
}

/// Profiling timestamp selector for [`Compute::prof_info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ProfInfo {
    /// Command enqueued on the host
    Queued = 0,
    /// Command submitted to the device
    Submit,
    /// Execution started
    Start,
    /// Execution finished
    End,
}

/// Argument passed to a kernel launch
#[derive(Debug, Clone, Copy)]
pub enum KernelArg {
    /// A scalar `u32`
    U32(u32),
    /// A scalar `f32`
    F32(f32),
    /// A device buffer
    Buffer(Buffer),
}

/// Queryable device limits
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// Maximum work items per work group
    pub max_work_group_size: usize,
}

/// A mapped view of a device buffer, unmapped via [`Compute::unmap_buffer`]
#[derive(Debug)]
pub struct MappedBuffer {
    pub(crate) buffer: Buffer,
    pub(crate) bytes: Vec<u8>,
}

impl Deref for MappedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Minimal asynchronous compute device
///
/// Operations that enqueue device work take a `wait` list of events that
/// must complete first and return an [`Event`] for the enqueued work.
/// Events accumulate on the device until released in bulk with
/// [`Compute::release_events`].
pub trait Compute {
    /// Device limits
    fn limits(&self) -> DeviceLimits;

    /// Compile a program from source
    fn create_program(&mut self, source: &str, options: &str) -> Result<Program, ComputeError>;

    /// Release a program
    fn release_program(&mut self, program: Program) -> Result<(), ComputeError>;

    /// Allocate a buffer of `size` bytes
    fn create_buffer(&mut self, flags: MemFlag, size: usize) -> Result<Buffer, ComputeError>;

    /// Release a buffer
    fn release_buffer(&mut self, buffer: Buffer) -> Result<(), ComputeError>;

    /// Fill a byte range of a buffer with a value
    fn fill_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        len: usize,
        value: u8,
        wait: &[Event],
    ) -> Result<Event, ComputeError>;

    /// Write bytes into a buffer
    fn write_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        data: &[u8],
        wait: &[Event],
    ) -> Result<Event, ComputeError>;

    /// Write one field of `count` packed records
    ///
    /// Copies `elem_size` bytes from `data` every `src_stride` bytes into the
    /// buffer at `offset` plus multiples of `dst_stride`.
    #[allow(clippy::too_many_arguments)]
    fn write_buffer_rect(
        &mut self,
        buffer: Buffer,
        offset: usize,
        elem_size: usize,
        dst_stride: usize,
        src_stride: usize,
        data: &[u8],
        count: usize,
        wait: &[Event],
    ) -> Result<Event, ComputeError>;

    /// Blocking read of a byte range into `out`
    fn read_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        out: &mut [u8],
        wait: &[Event],
    ) -> Result<(), ComputeError>;

    /// Blocking map of a byte range for reading
    fn map_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        len: usize,
        wait: &[Event],
    ) -> Result<MappedBuffer, ComputeError>;

    /// Unmap a previously mapped buffer
    fn unmap_buffer(&mut self, mapped: MappedBuffer) -> Result<(), ComputeError>;

    /// Launch a kernel over a global work size
    fn execute(
        &mut self,
        program: Program,
        kernel: &str,
        global: &[usize],
        local: &[usize],
        wait: &[Event],
        args: &[KernelArg],
    ) -> Result<Event, ComputeError>;

    /// Nanosecond profiling timestamp of a completed event
    fn prof_info(&self, event: Event, info: ProfInfo) -> Result<u64, ComputeError>;

    /// Release a batch of events
    fn release_events(&mut self, events: &[Event]) -> Result<(), ComputeError>;
}
