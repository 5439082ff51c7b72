use std::{
    collections::HashMap,
    time::Instant,
};

pub enum Stat {
    Frame,
    /// A VCDU with vcid=63
    FillFrame,
    Bytes(usize),
    /// A VCDU whose spacecraft id doesn't match the configured downlink.
    WrongSpacecraft,
    /// A VCDU counter gap; carries the number of packets dropped.
    DroppedPackets(u32),
    /// Bytes we had no open CP_PDU or TP_File to attach to
    DiscardedBytes(usize),
    BadCrc,
    TpFileComplete,
    XritEmitted,
    /// A completed TP_File for a specific APID
    APID(u16),
}

pub struct Stats {
    time: Instant,
    pub(crate) frames: usize,
    bytes: usize,
    pub(crate) fills: usize,
    pub(crate) wrong_spacecraft: usize,
    pub(crate) discontinuities: usize,
    pub(crate) dropped_packets: u64,
    discarded_bytes: usize,
    bad_crc: usize,
    tpfiles_completed: usize,
    xrit_emitted: usize,
    apid: HashMap<u16, usize>,
}

impl Stats {
    pub fn new() -> Stats {
        Stats {
            time: Instant::now(),
            frames: 0,
            bytes: 0,
            fills: 0,
            wrong_spacecraft: 0,
            discontinuities: 0,
            dropped_packets: 0,
            discarded_bytes: 0,
            bad_crc: 0,
            tpfiles_completed: 0,
            xrit_emitted: 0,
            apid: HashMap::new(),
        }
    }

    pub fn record(&mut self, stat: Stat) {
        match stat {
            Stat::Frame => self.frames += 1,
            Stat::Bytes(b) => self.bytes += b,
            Stat::FillFrame => self.fills += 1,
            Stat::WrongSpacecraft => self.wrong_spacecraft += 1,
            Stat::DroppedPackets(n) => {
                self.discontinuities += 1;
                self.dropped_packets += u64::from(n);
            }
            Stat::DiscardedBytes(n) => self.discarded_bytes += n,
            Stat::BadCrc => self.bad_crc += 1,
            Stat::TpFileComplete => self.tpfiles_completed += 1,
            Stat::XritEmitted => self.xrit_emitted += 1,
            Stat::APID(id) => *self.apid.entry(id).or_insert(0) += 1,
        }
    }

    pub fn print(&self) {
        let secs = self.time.elapsed().as_millis() as f32 / 1000.0;
        println!("==============");
        println!("Frames: {:0.2} pps", self.frames as f32 / secs.max(0.001));
        println!("Fill frames: {}", self.fills);
        println!("Wrong spacecraft: {}", self.wrong_spacecraft);
        println!("Discontinuities: {} ({} packets dropped)", self.discontinuities, self.dropped_packets);
        println!("Discarded bytes: {}", self.discarded_bytes);
        println!("Bad CRC: {}", self.bad_crc);
        println!("TP_Files completed: {}", self.tpfiles_completed);
        println!("xRIT files emitted: {}", self.xrit_emitted);
        println!("APID stats:");
        for (id, count) in self.apid.iter() {
            println!("  APID {}: {}", id, count);
        }
    }

    pub fn reset(&mut self) {
        self.time = Instant::now();
        self.frames = 0;
        self.bytes = 0;
        self.fills = 0;
        self.wrong_spacecraft = 0;
        self.discontinuities = 0;
        self.dropped_packets = 0;
        self.discarded_bytes = 0;
        self.bad_crc = 0;
        self.tpfiles_completed = 0;
        self.xrit_emitted = 0;
        self.apid.clear();
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
