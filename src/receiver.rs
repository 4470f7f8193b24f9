use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::frame::{new_synchroniser, ConfigError, FrameConfig, FrameEvent};
use crate::source::{SymbolInput, SymbolSource};

/// Packet counters in the style of the demodulator telemetry: repaired
/// frames passed CRC with a nonzero Viterbi metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiverStats {
    pub total: u64,
    pub correct: u64,
    pub incorrect: u64,
    pub rejected: u64,
    pub repaired: u64,
}

/// Glues a symbol source to the frame synchroniser: source thread feeds a
/// bounded channel, the receiver thread runs the synchroniser and forwards
/// every non-trivial event.
pub struct PacketReceiver {
    config: FrameConfig,
    input: SymbolInput,
}

pub fn new_receiver(config: FrameConfig, input: SymbolInput) -> PacketReceiver {
    PacketReceiver { config, input }
}

impl PacketReceiver {
    pub fn run(mut self) -> Result<(Receiver<FrameEvent>, JoinHandle<ReceiverStats>), ConfigError> {
        let mut sync = new_synchroniser(self.config)?;
        let (symbol_rx, source_t) = self.input.run();
        let (event_tx, event_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let mut stats = ReceiverStats::default();

            while let Ok(iq) = symbol_rx.recv() {
                let event = sync.process(iq);
                match &event {
                    FrameEvent::None => continue,
                    FrameEvent::PreambleFound {
                        selected_phase,
                        phase_conflict,
                        desync_bitcount,
                    } => {
                        tracing::debug!(
                            phase = selected_phase,
                            conflict = phase_conflict,
                            desync = desync_bitcount,
                            "preamble"
                        );
                    }
                    FrameEvent::BlockSizeOk { length } => {
                        tracing::debug!(length = *length, "block size");
                    }
                    FrameEvent::BlockSizeErr { length } => {
                        stats.rejected += 1;
                        tracing::warn!(length = *length, "length field out of range");
                    }
                    FrameEvent::PayloadOk(payload) => {
                        stats.total += 1;
                        stats.correct += 1;
                        if payload.decoded_error > 0 {
                            stats.repaired += 1;
                        }
                    }
                    FrameEvent::PayloadErr(payload) => {
                        stats.total += 1;
                        stats.incorrect += 1;
                        tracing::warn!(
                            received = payload.crc8_received,
                            calculated = payload.crc8_calculated,
                            "crc mismatch"
                        );
                    }
                }

                if event_tx.send(event).is_err() {
                    break;
                }
            }

            if source_t.join().is_err() {
                tracing::error!("symbol source thread panicked");
            }
            stats
        });

        Ok((event_rx, handle))
    }
}
