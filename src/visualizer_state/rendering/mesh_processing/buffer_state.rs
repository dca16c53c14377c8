//! # Buffer State
//!
//! Named GPU buffers used by the accelerator, with usage analytics.
//!
//! Buffers are referenced by a static name and grown on demand: a marker
//! larger than any seen so far reallocates its buffers, smaller markers reuse
//! the existing allocation and only touch its prefix.

use std::collections::HashMap;

use log::debug;
use wgpu::{Buffer, BufferUsages, Device, Queue};

use super::accelerator::AcceleratorError;

/// Analytics data for a GPU buffer.
#[derive(Debug, Default)]
struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    allocated_memory: u64,
    /// High-water mark of bytes written
    used_memory: u64,
    /// Number of times the buffer has been written to
    times_written: u64,
    /// Number of times the buffer had to be reallocated
    times_grown: u64,
}

impl BufferAnalytics {
    fn record_allocation(&mut self, size: u64, grown: bool) {
        if grown {
            self.times_grown += 1;
        }
        self.allocated_memory = size;
        self.used_memory = 0;
    }

    fn record_write(&mut self, end: u64) {
        self.used_memory = self.used_memory.max(end);
        self.times_written += 1;
    }
}

/// Totals across every buffer, reported after each remap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage {
    pub allocated_memory: u64,
    pub used_memory: u64,
    pub times_written: u64,
    pub times_grown: u64,
}

/// Registry of the accelerator's GPU buffers.
#[derive(Default)]
pub struct BufferState {
    buffers: HashMap<&'static str, Buffer>,
    buffer_analytics: HashMap<&'static str, BufferAnalytics>,
}

impl BufferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure buffer `buffer_name` exists with at least `size` bytes and
    /// the given usage, reallocating it otherwise.
    pub fn ensure_capacity(
        &mut self,
        device: &Device,
        buffer_name: &'static str,
        size: u64,
        usage: BufferUsages,
    ) {
        if let Some(buffer) = self.buffers.get(buffer_name) {
            if buffer.size() >= size && buffer.usage().contains(usage) {
                return;
            }
        }

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(buffer_name),
            size,
            usage,
            mapped_at_creation: false,
        });
        debug!("Allocated '{}' with {} bytes", buffer_name, size);

        let grown = self.buffers.insert(buffer_name, buffer).is_some();
        self.buffer_analytics
            .entry(buffer_name)
            .or_default()
            .record_allocation(size, grown);
    }

    /// Writes raw bytes into a buffer through the queue.
    ///
    /// # Errors
    /// Fails if the buffer does not exist or the write would overrun it.
    pub fn write_buffer(
        &mut self,
        queue: &Queue,
        buffer_name: &'static str,
        offset: wgpu::BufferAddress,
        data: &[u8],
    ) -> Result<(), AcceleratorError> {
        let buffer = self
            .buffers
            .get(buffer_name)
            .ok_or(AcceleratorError::MissingBuffer(buffer_name))?;
        let analytics = self.buffer_analytics.entry(buffer_name).or_default();

        let end = offset + data.len() as u64;
        if end > buffer.size() {
            return Err(AcceleratorError::BufferOverrun {
                buffer_name,
                end,
                size: buffer.size(),
            });
        }

        queue.write_buffer(buffer, offset, data);
        analytics.record_write(end);
        Ok(())
    }

    /// Gets a buffer by name.
    pub fn get_buffer(&self, buffer_name: &'static str) -> Result<&Buffer, AcceleratorError> {
        self.buffers
            .get(buffer_name)
            .ok_or(AcceleratorError::MissingBuffer(buffer_name))
    }

    /// Sums the analytics of every buffer.
    pub fn usage(&self) -> BufferUsage {
        self.buffer_analytics
            .values()
            .fold(BufferUsage::default(), |acc, analytics| BufferUsage {
                allocated_memory: acc.allocated_memory + analytics.allocated_memory,
                used_memory: acc.used_memory + analytics.used_memory,
                times_written: acc.times_written + analytics.times_written,
                times_grown: acc.times_grown + analytics.times_grown,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_sums_every_buffer() {
        let mut state = BufferState::new();

        let input = state.buffer_analytics.entry("input").or_default();
        input.record_allocation(280, false);
        input.record_write(140);
        input.record_write(280);
        input.record_allocation(560, true);
        input.record_write(420);

        let staging = state.buffer_analytics.entry("staging").or_default();
        staging.record_allocation(280, false);
        staging.record_write(84);

        assert_eq!(
            state.usage(),
            BufferUsage {
                allocated_memory: 840,
                used_memory: 504,
                times_written: 4,
                times_grown: 1,
            }
        );
    }

    #[test]
    fn test_empty_state_reports_nothing() {
        assert_eq!(BufferState::new().usage(), BufferUsage::default());
    }
}
