// Subsystem status / interrupt-control state, shared with the workers.

use std::sync::Mutex;

pub const INT_VSY: u32 = 1 << 0;
pub const INT_S3D_DONE: u32 = 1 << 1;
pub const INT_FIFO_OVF: u32 = 1 << 2;
pub const INT_FIFO_EMP: u32 = 1 << 3;
pub const INT_HOST_DONE: u32 = 1 << 4;
pub const INT_CMD_DONE: u32 = 1 << 5;
pub const INT_3DF_EMP: u32 = 1 << 6;

#[derive(Copy, Clone, Default)]
pub struct IrqSnapshot {
    pub status: u32,
    pub enable: u32,
}

struct IrqState {
    status: u32,
    enable: u32,
    pending: u32,
}

pub struct Irq {
    state: Mutex<IrqState>,
}

impl Irq {
    pub fn new() -> Self {
        Irq {
            // Both queues are empty out of reset.
            state: Mutex::new(IrqState {
                status: INT_FIFO_EMP | INT_3DF_EMP,
                enable: 0,
                pending: 0,
            }),
        }
    }

    pub fn raise(&self, bits: u32) {
        if let Ok(mut s) = self.state.lock() {
            s.status |= bits;
            if bits & s.enable != 0 {
                s.pending += 1;
            }
        }
    }

    pub fn status(&self) -> u32 {
        self.state.lock().map(|s| s.status).unwrap_or(0)
    }

    /// Subsystem control write: low byte is write-one-to-clear against the
    /// status bits, the next byte is the interrupt-enable mask.
    pub fn control_write(&self, value: u32) {
        if let Ok(mut s) = self.state.lock() {
            s.status &= !(value & 0xFF);
            s.enable = (value >> 8) & 0xFF;
        }
    }

    /// Number of enabled raises since the last call.
    pub fn take_pending(&self) -> u32 {
        self.state
            .lock()
            .map(|mut s| std::mem::replace(&mut s.pending, 0))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> IrqSnapshot {
        self.state
            .lock()
            .map(|s| IrqSnapshot {
                status: s.status,
                enable: s.enable,
            })
            .unwrap_or_default()
    }

    pub fn restore(&self, snap: &IrqSnapshot) {
        if let Ok(mut s) = self.state.lock() {
            s.status = snap.status;
            s.enable = snap.enable;
            s.pending = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_write_clears_and_enables() {
        let irq = Irq::new();
        irq.raise(INT_S3D_DONE);
        assert_ne!(irq.status() & INT_S3D_DONE, 0);
        irq.control_write(INT_S3D_DONE | INT_FIFO_EMP);
        assert_eq!(irq.status() & (INT_S3D_DONE | INT_FIFO_EMP), 0);
        // Enable HOST_DONE, then raise it: one pending interrupt.
        irq.control_write(INT_HOST_DONE << 8);
        irq.raise(INT_HOST_DONE);
        irq.raise(INT_VSY); // not enabled, no pending bump
        assert_eq!(irq.take_pending(), 1);
        assert_eq!(irq.take_pending(), 0);
    }
}
