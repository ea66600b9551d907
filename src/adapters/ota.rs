//! Firmware update writer, backed by the `esp-ota` crate.
//!
//! Flow: `begin(size)` → N × `write_chunk` → `finalize` → controller
//! restarts after its grace delay.
//!
//! [`OtaManager`] lives inside one `POST /update` request; every step is
//! mirrored as an [`UpdateEvent`] on a channel whose receiving end,
//! [`UpdateEvents`], implements [`UpdatePort`] for the tick thread.

use std::sync::mpsc::{self, Receiver, Sender};

use log::{info, warn};

use crate::app::events::UpdateEvent;
use crate::app::ports::UpdatePort;
use crate::error::UpdateError;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

/// Progress is reported every this many bytes.
pub const PROGRESS_STEP: u32 = 64 * 1024;

// ── Event channel ─────────────────────────────────────────────

pub fn update_channel() -> (Sender<UpdateEvent>, UpdateEvents) {
    let (tx, rx) = mpsc::channel();
    (tx, UpdateEvents { rx })
}

/// Tick-side end of the update event channel.
pub struct UpdateEvents {
    rx: Receiver<UpdateEvent>,
}

impl UpdatePort for UpdateEvents {
    fn poll_event(&mut self) -> Option<UpdateEvent> {
        self.rx.try_recv().ok()
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    ReadyToReboot,
    Failed,
}

// ── Manager ───────────────────────────────────────────────────

/// OTA partition writer.
///
/// On ESP-IDF targets, uses the `esp-ota` crate for partition management.
/// On simulation targets the bytes are only counted.
pub struct OtaManager {
    state: OtaState,
    events: Sender<UpdateEvent>,
    last_reported: u32,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaManager {
    pub fn new(events: Sender<UpdateEvent>) -> Self {
        Self {
            state: OtaState::Idle,
            events,
            last_reported: 0,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Validate the size and open the inactive partition.
    pub fn begin(&mut self, firmware_size: u32) -> Result<(), UpdateError> {
        if matches!(self.state, OtaState::Receiving { .. }) {
            return Err(UpdateError::AlreadyInProgress);
        }
        if firmware_size == 0 || firmware_size > MAX_FIRMWARE_SIZE {
            return Err(UpdateError::InvalidSize);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                UpdateError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.state = OtaState::Receiving {
            expected_size: firmware_size,
            bytes_written: 0,
        };
        self.last_reported = 0;
        info!("OTA: begin ({} bytes)", firmware_size);
        self.notify(UpdateEvent::Started {
            total: firmware_size,
        });
        Ok(())
    }

    /// Append the next chunk.  Returns total bytes written.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<u32, UpdateError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(UpdateError::NotReceiving);
        };

        let len = u32::try_from(data.len()).map_err(|_| UpdateError::Overflow)?;
        if bytes_written.saturating_add(len) > expected_size {
            return Err(self.fail(UpdateError::Overflow));
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(self.fail(UpdateError::NotReceiving));
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                return Err(self.fail(UpdateError::WriteFailed));
            }
        }

        let new_written = bytes_written + len;
        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        if new_written - self.last_reported >= PROGRESS_STEP {
            self.last_reported = new_written;
            self.notify(UpdateEvent::Progress {
                written: new_written,
                total: expected_size,
            });
        }
        Ok(new_written)
    }

    /// Verify the image and mark the partition bootable.
    pub fn finalize(&mut self) -> Result<(), UpdateError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(self.fail(UpdateError::IncompleteTransfer)),
            _ => return Err(UpdateError::NotReceiving),
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                return Err(self.fail(UpdateError::NotReceiving));
            };
            let mut completed = match update.finalize() {
                Ok(completed) => completed,
                Err(e) => {
                    warn!("esp-ota finalize failed: {:?}", e);
                    return Err(self.fail(UpdateError::VerifyFailed));
                }
            };
            if let Err(e) = completed.set_as_boot_partition() {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                return Err(self.fail(UpdateError::BootSetFailed));
            }
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized, ready to reboot");
        self.notify(UpdateEvent::Completed);
        Ok(())
    }

    /// Abandon the transfer (client went away, read error).
    pub fn abort(&mut self) {
        if matches!(self.state, OtaState::Receiving { .. }) {
            self.fail(UpdateError::IncompleteTransfer);
        }
    }

    fn fail(&mut self, reason: UpdateError) -> UpdateError {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.ota_update.take();
        }
        warn!("OTA: failed: {}", reason);
        self.state = OtaState::Failed;
        self.notify(UpdateEvent::Failed(reason));
        reason
    }

    fn notify(&self, event: UpdateEvent) {
        if self.events.send(event).is_err() {
            warn!("OTA: event channel closed");
        }
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (OtaManager, UpdateEvents) {
        let (tx, rx) = update_channel();
        (OtaManager::new(tx), rx)
    }

    fn drain(rx: &mut UpdateEvents) -> Vec<UpdateEvent> {
        std::iter::from_fn(|| rx.poll_event()).collect()
    }

    #[test]
    fn begin_rejects_zero_size() {
        let (mut m, _rx) = manager();
        assert_eq!(m.begin(0), Err(UpdateError::InvalidSize));
    }

    #[test]
    fn begin_rejects_oversized() {
        let (mut m, _rx) = manager();
        assert_eq!(m.begin(MAX_FIRMWARE_SIZE + 1), Err(UpdateError::InvalidSize));
    }

    #[test]
    fn begin_twice_is_rejected() {
        let (mut m, _rx) = manager();
        m.begin(100).unwrap();
        assert_eq!(m.begin(100), Err(UpdateError::AlreadyInProgress));
    }

    #[test]
    fn chunk_requires_receiving_state() {
        let (mut m, _rx) = manager();
        assert_eq!(m.write_chunk(&[0; 10]), Err(UpdateError::NotReceiving));
    }

    #[test]
    fn overflow_fails_the_transfer() {
        let (mut m, mut rx) = manager();
        m.begin(10).unwrap();
        assert_eq!(m.write_chunk(&[0; 11]), Err(UpdateError::Overflow));
        assert_eq!(m.state(), OtaState::Failed);
        assert_eq!(
            drain(&mut rx).last(),
            Some(&UpdateEvent::Failed(UpdateError::Overflow))
        );
    }

    #[test]
    fn finalize_requires_all_bytes() {
        let (mut m, _rx) = manager();
        m.begin(100).unwrap();
        m.write_chunk(&[0; 50]).unwrap();
        assert_eq!(m.finalize(), Err(UpdateError::IncompleteTransfer));
    }

    #[test]
    fn happy_path_reports_progress_and_completion() {
        let (mut m, mut rx) = manager();
        let total = PROGRESS_STEP * 2;
        m.begin(total).unwrap();
        for _ in 0..(total / 4096) {
            m.write_chunk(&[0xAB; 4096]).unwrap();
        }
        m.finalize().unwrap();
        assert_eq!(m.state(), OtaState::ReadyToReboot);

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&UpdateEvent::Started { total }));
        assert_eq!(events.last(), Some(&UpdateEvent::Completed));
        let progress = events
            .iter()
            .filter(|e| matches!(e, UpdateEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 2);
    }

    #[test]
    fn abort_mid_transfer_reports_failure() {
        let (mut m, mut rx) = manager();
        m.begin(100).unwrap();
        m.abort();
        assert_eq!(
            drain(&mut rx).last(),
            Some(&UpdateEvent::Failed(UpdateError::IncompleteTransfer))
        );
    }
}
