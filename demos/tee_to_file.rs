//! Tee example.
//!
//! Plays a one second 440 Hz tone through a tee and keeps a raw copy of every
//! frame in a file. Without the `cpal` feature the tone goes to an in-memory
//! stream; with it, to the default output device.
//!
//! Run with: cargo run --example tee_to_file -- [output.raw]
//! Or:       cargo run --example tee_to_file --features cpal -- [output.raw]

use std::f32::consts::TAU;
use std::path::PathBuf;

use pcm_tee::{Direction, FileSink, SinkTarget, TeeStream, Transport};
use tracing_subscriber::EnvFilter;

const RATE: u32 = 48000;
const CHANNELS: u16 = 2;
const PERIOD_FRAMES: usize = 480;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pcm_tee=debug".parse()?))
        .init();

    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("tee.raw"), PathBuf::from);

    let sink = FileSink::open(&SinkTarget::Path(path.clone()))?;
    let mut tee = TeeStream::new(open_slave()?, sink, true);
    tee.prepare()?;

    let mut phase = 0.0f32;
    let mut period = Vec::with_capacity(PERIOD_FRAMES * usize::from(CHANNELS) * 2);
    for _ in 0..(RATE as usize / PERIOD_FRAMES) {
        period.clear();
        for _ in 0..PERIOD_FRAMES {
            let sample = ((phase * TAU).sin() * 0.25 * f32::from(i16::MAX)) as i16;
            phase = (phase + 440.0 / RATE as f32).fract();
            for _ in 0..CHANNELS {
                period.extend_from_slice(&sample.to_le_bytes());
            }
        }

        let mut offset = 0;
        while offset < PERIOD_FRAMES {
            let n = tee.write_interleaved(&period[offset * 4..], PERIOD_FRAMES - offset)?;
            offset += n;
            make_room(&mut tee)?;
        }
    }

    tee.drain()?;
    let stats = tee.stats();
    let mut dump = String::new();
    tee.dump(&mut dump)?;
    print!("{dump}");
    tee.close()?;

    println!(
        "Wrote {} frames ({} bytes) to {}",
        stats.frames_teed,
        stats.bytes_written,
        path.display()
    );
    Ok(())
}

#[cfg(not(feature = "cpal"))]
fn open_slave() -> Result<pcm_tee::MemoryTransport, pcm_tee::PcmError> {
    let config = pcm_tee::MemoryTransportConfig {
        channels: CHANNELS,
        rate: RATE,
        buffer_size: PERIOD_FRAMES * 4,
        ..Default::default()
    };
    pcm_tee::MemoryTransport::from_config("memory", Direction::Playback, &config)
}

#[cfg(feature = "cpal")]
fn open_slave() -> Result<pcm_tee::DeviceTransport, pcm_tee::PcmError> {
    let config = pcm_tee::DeviceConfig {
        channels: CHANNELS,
        rate: RATE,
        ..Default::default()
    };
    pcm_tee::DeviceTransport::open("default", Direction::Playback, &config)
}

/// Plays out what the in-memory stream holds, standing in for the hardware.
#[cfg(not(feature = "cpal"))]
fn make_room(tee: &mut TeeStream<pcm_tee::MemoryTransport>) -> Result<(), pcm_tee::PcmError> {
    tee.slave_mut().consume(PERIOD_FRAMES)?;
    Ok(())
}

/// The device drains the ring on its own.
#[cfg(feature = "cpal")]
fn make_room(_tee: &mut TeeStream<pcm_tee::DeviceTransport>) -> Result<(), pcm_tee::PcmError> {
    Ok(())
}
