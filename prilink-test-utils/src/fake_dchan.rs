//! Fake D-channel device and clock.

use std::collections::VecDeque;

use prilink::DchanDevice;
use prilink_types::custom::PriResult;
use prilink_types::MonoTime;

/// A loopback D-channel: frames queued with [`FakeDchan::inject`] come out
/// of `read`, frames the stack writes are captured for inspection.
#[derive(Default)]
pub struct FakeDchan {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
}

impl FakeDchan {
    /// An empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the stack to read.
    pub fn inject(&mut self, frame: &[u8]) {
        self.rx.push_back(frame.to_vec());
    }

    /// Everything the stack transmitted, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.tx
    }

    /// Drain the captured transmissions.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.tx)
    }

    /// The most recent transmission, if any.
    pub fn last_sent(&self) -> Option<&[u8]> {
        self.tx.last().map(|f| f.as_slice())
    }
}

impl DchanDevice for FakeDchan {
    fn read(&mut self, buf: &mut [u8]) -> PriResult<usize> {
        match self.rx.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn write(&mut self, frame: &[u8]) -> PriResult<usize> {
        self.tx.push(frame.to_vec());
        Ok(frame.len())
    }
}

/// A hand-cranked monotonic clock.
pub struct FakeClock {
    now: MonoTime,
}

impl FakeClock {
    /// A clock starting a little after the epoch.
    pub fn new() -> Self {
        FakeClock { now: MonoTime::new(1000, 0) }
    }

    /// The current fake time.
    pub fn now(&self) -> MonoTime {
        self.now
    }

    /// Advance by `ms` milliseconds and return the new time.
    pub fn advance_ms(&mut self, ms: i32) -> MonoTime {
        self.now = self.now.add_ms(ms);
        self.now
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}
