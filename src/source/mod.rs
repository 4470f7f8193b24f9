use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use enum_dispatch::enum_dispatch;
use num_complex::Complex32;

pub mod file;

pub use file::{new_file_source, new_stdin_source, FileSource, StdinSource};

/// Wire format of the interleaved I/Q pairs a source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SampleFormat {
    /// little-endian f32 pairs
    F32,
    /// unsigned bytes centred on 127.5, as raw capture hardware emits
    U8,
}

/// A producer of demodulated symbols. Sources run on their own thread and
/// hand symbols over a bounded channel; dropping the receiver stops them.
#[enum_dispatch]
pub trait SymbolSource {
    fn run(&mut self) -> (Receiver<Complex32>, JoinHandle<()>);
}

#[enum_dispatch(SymbolSource)]
pub enum SymbolInput {
    File(FileSource),
    Stdin(StdinSource),
}
