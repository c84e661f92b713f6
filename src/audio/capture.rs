// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::period::{Frame, SILENCE};

/// Lock-free single-producer single-consumer ring of captured frames. The
/// input callback writes, the engine reads at the top of each period.
pub struct CaptureRing {
    buffer: UnsafeCell<Vec<Frame>>,
    /// Always a power of two.
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    dropped: AtomicU64,
}

// One writer and one reader touch disjoint regions, published through the
// positions with acquire/release.
unsafe impl Sync for CaptureRing {}

impl CaptureRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            buffer: UnsafeCell::new(vec![SILENCE; capacity]),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Usable frames; one slot stays empty to tell full from empty.
    pub fn capacity(&self) -> usize {
        self.capacity - 1
    }

    #[inline]
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    #[inline]
    pub fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Frames the producer could not fit.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer side. Returns the number of frames stored; the rest are dropped.
    pub fn write(&self, frames: &[Frame]) -> usize {
        let to_write = self.space().min(frames.len());
        if to_write < frames.len() {
            self.dropped
                .fetch_add((frames.len() - to_write) as u64, Ordering::Relaxed);
        }
        if to_write == 0 {
            return 0;
        }
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;
        let first = (self.capacity - write).min(to_write);

        // SAFETY: only the producer writes, and only into the free region
        // between write_pos and read_pos.
        unsafe {
            let base = (*self.buffer.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(frames.as_ptr(), base.add(write), first);
            if to_write > first {
                std::ptr::copy_nonoverlapping(frames.as_ptr().add(first), base, to_write - first);
            }
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Consumer side. Returns the number of frames read into `out`.
    pub fn read(&self, out: &mut [Frame]) -> usize {
        let to_read = self.available().min(out.len());
        if to_read == 0 {
            return 0;
        }
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;
        let first = (self.capacity - read).min(to_read);

        // SAFETY: only the consumer reads, and only the region the producer
        // has published.
        unsafe {
            let base = (*self.buffer.get()).as_ptr();
            std::ptr::copy_nonoverlapping(base.add(read), out.as_mut_ptr(), first);
            if to_read > first {
                std::ptr::copy_nonoverlapping(base, out.as_mut_ptr().add(first), to_read - first);
            }
        }

        self.read_pos.store((read + to_read) & mask, Ordering::Release);
        to_read
    }

    /// Consumer side. Discards everything currently buffered.
    pub fn clear(&self) {
        let write = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write, Ordering::Release);
    }
}
