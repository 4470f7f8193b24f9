use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use num_complex::Complex32;

use super::{SampleFormat, SymbolSource};

// symbols buffered between the reader thread and the synchroniser
const CHANNEL_DEPTH: usize = 8192;

pub struct FileSource {
    path: PathBuf,
    format: SampleFormat,
}

pub fn new_file_source(path: PathBuf, format: SampleFormat) -> FileSource {
    FileSource { path, format }
}

impl SymbolSource for FileSource {
    fn run(&mut self) -> (Receiver<Complex32>, JoinHandle<()>) {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let path = self.path.clone();
        let format = self.format;

        let handle = thread::spawn(move || match File::open(&path) {
            Ok(file) => read_symbols(BufReader::new(file), format, &tx),
            Err(err) => tracing::error!("couldn't open {:?}: {}", path, err),
        });

        (rx, handle)
    }
}

pub struct StdinSource {
    format: SampleFormat,
}

pub fn new_stdin_source(format: SampleFormat) -> StdinSource {
    StdinSource { format }
}

impl SymbolSource for StdinSource {
    fn run(&mut self) -> (Receiver<Complex32>, JoinHandle<()>) {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let format = self.format;

        let handle = thread::spawn(move || {
            read_symbols(io::stdin().lock(), format, &tx);
        });

        (rx, handle)
    }
}

/// Pull I/Q pairs until the stream dries up or the consumer goes away.
fn read_symbols(mut reader: impl Read, format: SampleFormat, tx: &SyncSender<Complex32>) {
    loop {
        let symbol = match format {
            SampleFormat::F32 => {
                let mut buf = [0u8; 8];
                if reader.read_exact(&mut buf).is_err() {
                    break;
                }
                Complex32::new(
                    f32::from_le_bytes(buf[0..4].try_into().unwrap()),
                    f32::from_le_bytes(buf[4..8].try_into().unwrap()),
                )
            }
            SampleFormat::U8 => {
                let mut buf = [0u8; 2];
                if reader.read_exact(&mut buf).is_err() {
                    break;
                }
                Complex32::new(
                    (buf[0] as f32 - 127.5) / 128.0,
                    (buf[1] as f32 - 127.5) / 128.0,
                )
            }
        };

        if tx.send(symbol).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_pairs_parse_in_order() {
        let mut bytes = Vec::new();
        for v in [0.5f32, -0.5, 0.25, -0.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let (tx, rx) = mpsc::sync_channel(16);
        read_symbols(&bytes[..], SampleFormat::F32, &tx);
        drop(tx);

        let symbols: Vec<Complex32> = rx.iter().collect();
        assert_eq!(symbols, vec![
            Complex32::new(0.5, -0.5),
            Complex32::new(0.25, -0.25),
        ]);
    }

    #[test]
    fn test_u8_pairs_are_centred() {
        let bytes = [255u8, 0u8];
        let (tx, rx) = mpsc::sync_channel(16);
        read_symbols(&bytes[..], SampleFormat::U8, &tx);
        drop(tx);

        let symbol = rx.iter().next().unwrap();
        assert!(symbol.re > 0.99 && symbol.re < 1.0);
        assert!(symbol.im < -0.99 && symbol.im > -1.0);
    }

    #[test]
    fn test_trailing_partial_pair_is_dropped() {
        let bytes = [10u8, 20, 30];
        let (tx, rx) = mpsc::sync_channel(16);
        read_symbols(&bytes[..], SampleFormat::U8, &tx);
        drop(tx);

        assert_eq!(rx.iter().count(), 1);
    }
}
