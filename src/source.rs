//! Frame sources: background threads that read raw VCDU frames off some
//! transport and push them into a [`Demuxer`](crate::demux::Demuxer).

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use log::{error, info};

use crate::demux::Demuxer;
use crate::vcdu::VCDU_LEN;

/// Reads a bare stream of back-to-back fixed-size VCDU frames from a TCP
/// socket, e.g. a raw downlink proxy with no framing of its own.
pub fn spawn_tcp_source(address: String, demuxer: std::sync::Arc<Demuxer>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        info!("connecting to {address}");
        let stream = match TcpStream::connect(&address) {
            Ok(s) => s,
            Err(err) => {
                error!("failed to connect to {address}: {err}");
                return;
            }
        };
        read_fixed_frames(stream, &demuxer);
    })
}

/// Length of the framing prefix a goesrecv-style relay puts in front of
/// every VCDU: an 8-byte record marker with no fields this demuxer cares
/// about, stripped before the frame is forwarded on.
const RECORD_PREFIX_LEN: usize = 8;

/// Reads fixed-size records from a relay that wraps each VCDU in an 8-byte
/// prefix (the nanomsg/goesrecv convention): every record on the wire is
/// `RECORD_PREFIX_LEN + VCDU_LEN` bytes, and only the trailing `VCDU_LEN`
/// bytes are the frame itself.
pub fn spawn_prefixed_tcp_source(address: String, demuxer: std::sync::Arc<Demuxer>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        info!("connecting to {address}");
        let mut stream = match TcpStream::connect(&address) {
            Ok(s) => s,
            Err(err) => {
                error!("failed to connect to {address}: {err}");
                return;
            }
        };
        let record_len = RECORD_PREFIX_LEN + VCDU_LEN;
        loop {
            let mut record = vec![0u8; record_len];
            if stream.read_exact(&mut record).is_err() {
                info!("source at {address} closed");
                break;
            }
            demuxer.push(record.split_off(RECORD_PREFIX_LEN));
        }
    })
}

/// Reads a file of concatenated fixed-size VCDU frames, for replay/testing.
pub fn spawn_file_source(path: std::path::PathBuf, demuxer: std::sync::Arc<Demuxer>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || match std::fs::File::open(&path) {
        Ok(file) => read_fixed_frames(file, &demuxer),
        Err(err) => error!("failed to open {}: {err}", path.display()),
    })
}

fn read_fixed_frames<R: Read>(mut reader: R, demuxer: &Demuxer) {
    loop {
        let mut frame = vec![0u8; VCDU_LEN];
        match reader.read_exact(&mut frame) {
            Ok(()) => demuxer.push(frame),
            Err(_) => break,
        }
    }
}

/// Reads raw VCDU frames straight out of an already-opened file, one shot,
/// for tests and small offline replays.
pub fn read_frames_from_file(path: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut file = std::fs::File::open(path)?;
    let mut frames = Vec::new();
    loop {
        let mut frame = vec![0u8; VCDU_LEN];
        match file.read_exact(&mut frame) {
            Ok(()) => frames.push(frame),
            Err(_) => break,
        }
    }
    Ok(frames)
}
