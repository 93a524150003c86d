use std::fmt;

/// Tracing target for register accesses. Sinks that only care about guest
/// misbehaviour filter on this target.
pub const GUEST_ERROR_TARGET: &str = "custompci::guest_error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDirection {
    Read,
    Write,
}

impl fmt::Display for AccessDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDirection::Read => write!(f, "read"),
            AccessDirection::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Applied,
    /// The access fell outside the backing storage and was absorbed.
    BoundsIgnored,
}

/// One register access as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub direction: AccessDirection,
    pub offset: u64,
    pub size: usize,
    pub value: u64,
    pub outcome: AccessOutcome,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at 0x{:x}, size {}, value 0x{:x}",
            self.direction, self.offset, self.size, self.value
        )?;
        if self.outcome == AccessOutcome::BoundsIgnored {
            write!(f, " (ignored: out of bounds)")?;
        }
        Ok(())
    }
}

/// Consumers implement this trait to observe register accesses.
pub trait AccessTracer: Send {
    fn on_access(&mut self, record: AccessRecord);
}

/// Emits the record to the `tracing` sink.
pub(crate) fn emit(device: &str, record: &AccessRecord) {
    match record.outcome {
        AccessOutcome::Applied => tracing::debug!(
            target: GUEST_ERROR_TARGET,
            device,
            direction = %record.direction,
            address = record.offset,
            size = record.size,
            value = record.value,
            "{device}: {record}"
        ),
        AccessOutcome::BoundsIgnored => tracing::warn!(
            target: GUEST_ERROR_TARGET,
            device,
            direction = %record.direction,
            address = record.offset,
            size = record.size,
            value = record.value,
            "{device}: {record}"
        ),
    }
}
