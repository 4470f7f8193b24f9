use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use qam_rs::frame::{FrameConfig, FrameEvent};
use qam_rs::receiver::new_receiver;
use qam_rs::source::{new_file_source, new_stdin_source, SampleFormat, SymbolInput};

/// Decode framed QAM packets from a demodulated symbol stream.
#[derive(Parser)]
struct Cli {
    /// symbol capture to replay; reads stdin when omitted
    file: Option<PathBuf>,
    /// wire format of the interleaved I/Q pairs
    #[arg(long, value_enum, default_value = "f32")]
    format: SampleFormat,
    /// largest encoded frame the receiver will buffer
    #[arg(long, default_value_t = 1024)]
    max_frame_bytes: usize,
}

fn main() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qam_rs=info"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let cli = Cli::parse();

    let config = FrameConfig {
        max_frame_bytes: cli.max_frame_bytes,
        ..Default::default()
    };
    let input = match cli.file {
        Some(path) => SymbolInput::from(new_file_source(path, cli.format)),
        None => SymbolInput::from(new_stdin_source(cli.format)),
    };

    let (events, receiver_t) = match new_receiver(config, input).run() {
        Ok(running) => running,
        Err(err) => {
            eprintln!("bad configuration: {err}");
            process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    while let Ok(event) = events.recv() {
        if let FrameEvent::PayloadOk(payload) = event {
            if out.write_all(&payload.bytes).and_then(|_| out.flush()).is_err() {
                break;
            }
        }
    }

    let stats = receiver_t.join().expect("receiver thread panicked");
    eprintln!(
        "received={} correct={} incorrect={} rejected={} repaired={}",
        stats.total, stats.correct, stats.incorrect, stats.rejected, stats.repaired
    );
}
