//! Fixed-size, byte-addressable register storage. Accesses that do not fit
//! entirely inside the backing storage are absorbed: reads return zero and
//! writes are dropped. A misbehaving bus master can never fault the device.
use std::{
    ops::Range,
    sync::{Mutex, PoisonError},
};

use super::{
    endianness::{Endianness, MAX_ACCESS_BYTES},
    trace::{self, AccessDirection, AccessOutcome, AccessRecord, AccessTracer},
};

pub struct RegisterFile {
    name: String,
    bytes: Mutex<Vec<u8>>,
    capacity: usize,
    endian: Endianness,
    tracer: Mutex<Option<Box<dyn AccessTracer>>>,
}

impl RegisterFile {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_endianness(name, capacity, Endianness::Little)
    }

    pub fn with_endianness(name: impl Into<String>, capacity: usize, endian: Endianness) -> Self {
        Self {
            name: name.into(),
            bytes: Mutex::new(vec![0_u8; capacity]),
            capacity,
            endian,
            tracer: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// Installs an observer that receives every access record.
    pub fn set_tracer(&self, tracer: Box<dyn AccessTracer>) {
        *self.tracer.lock().unwrap_or_else(PoisonError::into_inner) = Some(tracer);
    }

    pub fn clear_tracer(&self) {
        self.tracer.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Byte range touched by an access, or `None` when the access must be absorbed.
    fn window(&self, offset: u64, size: usize) -> Option<Range<usize>> {
        if size == 0 || size > MAX_ACCESS_BYTES {
            return None;
        }
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(size)?;
        (end <= self.capacity).then_some(start..end)
    }

    pub fn read(&self, offset: u64, size: usize) -> u64 {
        let (value, outcome) = match self.window(offset, size) {
            Some(range) => {
                let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
                (self.endian.decode_bytes(&bytes[range]), AccessOutcome::Applied)
            }
            None => (0, AccessOutcome::BoundsIgnored),
        };
        self.record(AccessRecord {
            direction: AccessDirection::Read,
            offset,
            size,
            value,
            outcome,
        });
        value
    }

    pub fn write(&self, offset: u64, size: usize, value: u64) {
        let outcome = match self.window(offset, size) {
            Some(range) => {
                let encoded = self.endian.encode_bytes(value, size);
                let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
                bytes[range].copy_from_slice(&encoded[..size]);
                AccessOutcome::Applied
            }
            None => AccessOutcome::BoundsIgnored,
        };
        self.record(AccessRecord {
            direction: AccessDirection::Write,
            offset,
            size,
            value,
            outcome,
        });
    }

    /// Copy of the whole backing storage.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Zeroes every register.
    pub fn reset(&self) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill(0);
    }

    fn record(&self, record: AccessRecord) {
        trace::emit(&self.name, &record);
        if let Some(tracer) = self
            .tracer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            tracer.on_access(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Collect(Arc<Mutex<Vec<AccessRecord>>>);

    impl AccessTracer for Collect {
        fn on_access(&mut self, record: AccessRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    #[test]
    fn starts_zeroed() {
        let regs = RegisterFile::new("regs", 64);
        assert!(regs.snapshot().iter().all(|b| *b == 0), "storage must start zeroed");
        assert_eq!(regs.read(0, 8), 0);
    }

    #[test]
    fn write_then_read_round_trips_every_width() {
        let regs = RegisterFile::new("regs", 4096);
        for (offset, size) in [(0u64, 1usize), (2, 2), (8, 4), (16, 8), (4088, 8), (4095, 1)] {
            regs.write(offset, size, 0x1122_3344_5566_7788);
            let expected = 0x1122_3344_5566_7788 & crate::soc::device::endianness::mask_bytes(size);
            assert_eq!(
                regs.read(offset, size),
                expected,
                "read({offset}, {size}) should return the truncated written value"
            );
        }
    }

    #[test]
    fn deadbeef_scenario() {
        let regs = RegisterFile::new("regs", 4096);
        regs.write(0, 4, 0xDEAD_BEEF);
        assert_eq!(regs.read(0, 4), 0xDEAD_BEEF);
        assert_eq!(regs.read(4093, 8), 0, "read crossing the end returns zero");
    }

    #[test]
    fn out_of_bounds_write_leaves_storage_untouched() {
        let regs = RegisterFile::new("regs", 16);
        regs.write(0, 8, u64::MAX);
        let before = regs.snapshot();
        regs.write(12, 8, 0xAAAA_AAAA_AAAA_AAAA);
        regs.write(16, 1, 0xFF);
        regs.write(u64::MAX, 8, 0xFF);
        assert_eq!(regs.snapshot(), before, "rejected writes must not touch storage");
        assert_eq!(regs.read(u64::MAX - 2, 4), 0, "offset overflow is absorbed");
    }

    #[test]
    fn write_is_little_endian_in_storage() {
        let regs = RegisterFile::new("regs", 8);
        regs.write(0, 4, 0xDEAD_BEEF);
        assert_eq!(&regs.snapshot()[..4], &hex_literal::hex!("EFBEADDE"));
        assert_eq!(regs.read(1, 2), 0xADBE, "unaligned reads pack from storage order");
    }

    #[test]
    fn unsupported_widths_are_absorbed() {
        let regs = RegisterFile::new("regs", 32);
        regs.write(0, 16, 0x1234);
        regs.write(0, 0, 0x1234);
        assert!(regs.snapshot().iter().all(|b| *b == 0));
        assert_eq!(regs.read(0, 0), 0);
    }

    #[test]
    fn tracer_observes_applied_and_ignored_accesses() {
        let regs = RegisterFile::new("regs", 8);
        let records = Arc::new(Mutex::new(Vec::new()));
        regs.set_tracer(Box::new(Collect(records.clone())));

        regs.write(0, 2, 0xBEEF);
        regs.read(0, 2);
        regs.read(6, 4);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 3, "every access produces one record");
        assert_eq!(records[0].direction, AccessDirection::Write);
        assert_eq!(records[1].value, 0xBEEF);
        assert_eq!(records[1].outcome, AccessOutcome::Applied);
        assert_eq!(records[2].outcome, AccessOutcome::BoundsIgnored);
        assert_eq!(records[2].value, 0);
    }

    #[test]
    fn reset_zeroes_storage() {
        let regs = RegisterFile::new("regs", 8);
        regs.write(0, 8, u64::MAX);
        regs.reset();
        assert_eq!(regs.read(0, 8), 0);
    }
}
