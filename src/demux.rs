//! Demuxer core: the intake FIFO, VCDU counter continuity tracking, and the
//! dedicated worker thread that drains frames into completed xRIT files.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{info, warn};

use crate::channel::{ChannelEvent, ChannelState};
use crate::config::DownlinkMode;
use crate::crc::Crc16Table;
use crate::error::DemuxError;
use crate::keys::KeyTable;
use crate::mpdu::MPdu;
use crate::stats::{Stat, Stats};
use crate::vcdu::{Vcdu, FILL_VCID};
use crate::xrit;

const COUNTER_MODULUS: u32 = 1 << 24;

/// Handle to a running demuxer worker thread.
pub struct Demuxer {
    sender: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), DemuxError>>>,
}

impl Demuxer {
    /// Spawns the worker thread and returns a handle for pushing frames.
    pub fn spawn(
        output_root: PathBuf,
        keys: KeyTable,
        mode: DownlinkMode,
        spacecraft_id: u8,
        dump_path: Option<PathBuf>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let poll_interval = mode.poll_interval();

        let handle = std::thread::spawn(move || {
            let mut worker = Worker::new(output_root, keys, spacecraft_id, dump_path)?;
            worker.run(receiver, worker_stop, poll_interval)
        });

        Demuxer {
            sender,
            stop,
            handle: Some(handle),
        }
    }

    /// Enqueues a raw VCDU frame. Never blocks on I/O; the worker thread
    /// does all of that off this caller's stack.
    pub fn push(&self, frame: Vec<u8>) {
        // An error here means the worker thread has exited (e.g. after a
        // fatal I/O error); the frame is simply dropped, the caller learns
        // about it via `join`.
        let _ = self.sender.send(frame);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Signals the worker to stop, then blocks until it has drained the
    /// intake queue and exited, returning its terminal result.
    pub fn join(mut self) -> Result<(), DemuxError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(Ok(())),
            None => Ok(()),
        }
    }
}

struct Worker {
    output_root: PathBuf,
    keys: KeyTable,
    spacecraft_id: u8,
    dump: Option<File>,
    crc: Crc16Table,
    channels: HashMap<u8, ChannelState>,
    last_counter: Option<u32>,
    stats: Stats,
}

impl Worker {
    fn new(
        output_root: PathBuf,
        keys: KeyTable,
        spacecraft_id: u8,
        dump_path: Option<PathBuf>,
    ) -> Result<Self, DemuxError> {
        let dump = match dump_path {
            Some(path) => Some(
                File::options()
                    .create(true)
                    .append(true)
                    .open(path)?,
            ),
            None => None,
        };
        Ok(Worker {
            output_root,
            keys,
            spacecraft_id,
            dump,
            crc: Crc16Table::new(),
            channels: HashMap::new(),
            last_counter: None,
            stats: Stats::new(),
        })
    }

    /// Drains the intake queue until told to stop, then drains whatever is
    /// left so a `stop()` call never silently drops buffered frames.
    fn run(
        &mut self,
        receiver: Receiver<Vec<u8>>,
        stop: Arc<AtomicBool>,
        poll_interval: std::time::Duration,
    ) -> Result<(), DemuxError> {
        loop {
            match receiver.try_recv() {
                Ok(frame) => self.process_frame(&frame)?,
                Err(TryRecvError::Empty) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    std::thread::sleep(poll_interval);
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        while let Ok(frame) = receiver.try_recv() {
            self.process_frame(&frame)?;
        }
        Ok(())
    }

    fn process_frame(&mut self, frame: &[u8]) -> Result<(), DemuxError> {
        self.stats.record(Stat::Frame);
        self.stats.record(Stat::Bytes(frame.len()));

        let vcdu = match Vcdu::parse(frame) {
            Ok(v) => v,
            Err(err) => {
                warn!("dropping malformed VCDU frame: {err}");
                return Ok(());
            }
        };

        if vcdu.header.spacecraft_id != self.spacecraft_id {
            self.stats.record(Stat::WrongSpacecraft);
            warn!(
                "dropping frame for spacecraft id {} (configured for {})",
                vcdu.header.spacecraft_id, self.spacecraft_id
            );
            return Ok(());
        }

        self.check_continuity(vcdu.header.counter);

        if vcdu.is_fill() {
            self.stats.record(Stat::FillFrame);
            return Ok(());
        }

        if let Some(dump) = self.dump.as_mut() {
            dump.write_all(frame)?;
        }

        let mpdu = match MPdu::parse(vcdu.mpdu) {
            Ok(m) => m,
            Err(err) => {
                warn!("vcid {}: dropping malformed M_PDU: {err}", vcdu.header.vcid);
                return Ok(());
            }
        };

        let channel = self
            .channels
            .entry(vcdu.header.vcid)
            .or_insert_with(|| ChannelState::new(vcdu.header.vcid));
        let events = channel.process_mpdu(&mpdu, &self.crc);

        for event in events {
            self.handle_event(event)?;
        }
        Ok(())
    }

    /// Tracks continuity on a single running counter across the whole
    /// downlink, not per virtual channel: fill frames and every data VCID
    /// share one 24-bit sequence.
    fn check_continuity(&mut self, counter: u32) {
        if let Some(last) = self.last_counter {
            let expected = (last + 1) % COUNTER_MODULUS;
            if counter != expected {
                let dropped = (counter + COUNTER_MODULUS - expected) % COUNTER_MODULUS;
                self.stats.record(Stat::DroppedPackets(dropped));
                warn!("DROPPED {dropped} PACKETS (expected counter {expected}, got {counter})");
            }
        }
        self.last_counter = Some(counter);
    }

    fn handle_event(&mut self, event: ChannelEvent) -> Result<(), DemuxError> {
        match event {
            ChannelEvent::DiscardedBytes(n) => {
                self.stats.record(Stat::DiscardedBytes(n));
            }
            ChannelEvent::BadCrc { apid } => {
                self.stats.record(Stat::BadCrc);
                warn!("apid {apid}: CP_PDU failed CRC check");
            }
            ChannelEvent::TpFileComplete { apid, data, .. } => {
                self.stats.record(Stat::TpFileComplete);
                self.stats.record(Stat::APID(apid));
                self.emit_xrit(apid, &data)?;
            }
        }
        Ok(())
    }

    fn emit_xrit(&mut self, apid: u16, sdpu_bytes: &[u8]) -> Result<(), DemuxError> {
        let spdu = match crate::spdu::decrypt(sdpu_bytes, &self.keys) {
            Ok(spdu) => spdu,
            Err(err) => {
                warn!("apid {apid}: failed to decrypt S_PDU: {err}");
                return Ok(());
            }
        };

        let filename = match xrit::annotation_filename(&spdu.records) {
            Ok(name) => name,
            Err(err) => {
                warn!("apid {apid}: xRIT file has no usable filename: {err}");
                return Ok(());
            }
        };

        let out_path = match xrit::output_path(&self.output_root, &filename) {
            Ok(path) => path,
            Err(err) => {
                warn!("apid {apid}: {err}");
                return Ok(());
            }
        };

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, &spdu.plaintext)?;
        self.stats.record(Stat::XritEmitted);
        let file_type = xrit::file_type_name(spdu.primary_header.file_type).unwrap_or("Unknown");
        info!("wrote {} ({file_type})", out_path.display());
        Ok(())
    }
}
