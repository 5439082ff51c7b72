//! Per-virtual-channel CP_PDU and TP_File reassembly.
//!
//! One [`ChannelState`] tracks a single VCID's packet-zone bitstream: the
//! CP_PDU currently being accumulated and the TP_File it feeds, each a
//! tagged `Option` rather than a dynamically-typed attribute that can be
//! missing. CP_PDUs that fail their CRC or length check are still forwarded
//! to the TP_File stage — the legacy demuxer's lenient, bug-compatible
//! policy — since the stream is never replayed and a dropped-but-wrong file
//! is more useful than silence.

use log::{debug, warn};

use crate::cppdu::{CpPduAssembler, CpPduHeader, SeqFlag};
use crate::crc::Crc16Table;
use crate::mpdu::MPdu;
use crate::tpfile::TpFileAssembler;

#[derive(Debug)]
pub enum ChannelEvent {
    TpFileComplete {
        apid: u16,
        counter: u16,
        data: Vec<u8>,
    },
    BadCrc {
        apid: u16,
    },
    DiscardedBytes(usize),
}

pub struct ChannelState {
    vcid: u8,
    current_cppdu: Option<CpPduAssembler>,
    current_tpfile: Option<TpFileAssembler>,
}

impl ChannelState {
    pub fn new(vcid: u8) -> Self {
        ChannelState {
            vcid,
            current_cppdu: None,
            current_tpfile: None,
        }
    }

    /// Feeds one M_PDU's packet zone through CP_PDU reassembly, emitting
    /// events for every CP_PDU completed and every TP_File this advances.
    pub fn process_mpdu(&mut self, mpdu: &MPdu, crc: &Crc16Table) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        let zone = mpdu.packet_zone;

        if mpdu.has_header() {
            let pointer = mpdu.first_header_pointer as usize;
            if pointer != 0 {
                match self.current_cppdu.take() {
                    Some(mut asm) => {
                        let _ = asm.append(&zone[..pointer.min(zone.len())]);
                        self.complete_cppdu(asm, crc, &mut events);
                    }
                    None => {
                        events.push(ChannelEvent::DiscardedBytes(pointer));
                        debug!("vcid {}: no CP_PDU to finish (dropped packets?)", self.vcid);
                    }
                }
                self.open_and_chain(&zone[pointer.min(zone.len())..], crc, &mut events);
            } else {
                self.open_and_chain(zone, crc, &mut events);
            }
        } else if let Some(asm) = self.current_cppdu.as_mut() {
            let _ = asm.append(zone);
        } else {
            events.push(ChannelEvent::DiscardedBytes(zone.len()));
            debug!("vcid {}: no CP_PDU to append M_PDU to (dropped packets?)", self.vcid);
        }

        events
    }

    /// Opens a new CP_PDU from `bytes` and, per the short-CP_PDU edge case,
    /// keeps chaining through any further complete CP_PDUs that turn out to
    /// be packed into the same slice (no second pointer marks their
    /// boundary — only the M_PDU's single `first_header_pointer` does).
    fn open_and_chain(&mut self, bytes: &[u8], crc: &Crc16Table, events: &mut Vec<ChannelEvent>) {
        let mut remaining = bytes.to_vec();
        loop {
            let mut asm = CpPduAssembler::new();
            if let Err(err) = asm.append(&remaining) {
                warn!("vcid {}: malformed CP_PDU header: {err}", self.vcid);
                self.current_cppdu = None;
                return;
            }
            if asm.header().is_none() {
                // Not even a full header yet; keep accumulating across
                // whatever M_PDUs arrive next.
                self.current_cppdu = Some(asm);
                return;
            }
            if asm.is_eof() {
                debug!("vcid {}: CP_PDU EOF marker", self.vcid);
                self.current_cppdu = None;
                return;
            }
            if !asm.is_complete() {
                self.current_cppdu = Some(asm);
                return;
            }
            match asm.split_excess() {
                Some(extra) if !extra.is_empty() => {
                    self.complete_cppdu(asm, crc, events);
                    remaining = extra;
                }
                _ => {
                    self.complete_cppdu(asm, crc, events);
                    self.current_cppdu = None;
                    return;
                }
            }
        }
    }

    /// Finishes a CP_PDU (whether or not it reached its declared length) and
    /// forwards it to the TP_File stage regardless of CRC/length outcome.
    fn complete_cppdu(&mut self, asm: CpPduAssembler, crc: &Crc16Table, events: &mut Vec<ChannelEvent>) {
        let (header, payload, length_ok, crc_ok) = match asm.finish(crc) {
            Ok(result) => result,
            Err(err) => {
                warn!("vcid {}: failed to finish CP_PDU: {err}", self.vcid);
                return;
            }
        };

        if !length_ok {
            warn!(
                "vcid {}: apid {}: CP_PDU length mismatch (declared {} bytes)",
                self.vcid, header.apid, header.data_length
            );
        }
        if !crc_ok {
            warn!("vcid {}: apid {}: CP_PDU failed CRC check", self.vcid, header.apid);
            events.push(ChannelEvent::BadCrc { apid: header.apid });
        }

        self.dispatch_to_tpfile(header, payload, events);
    }

    /// Dispatches on the CP_PDU's sequence flag (§4.9): FIRST opens a new
    /// TP_File, CONTINUE/LAST extend or close the open one, SINGLE is FIRST
    /// immediately followed by LAST.
    fn dispatch_to_tpfile(&mut self, header: CpPduHeader, payload: Vec<u8>, events: &mut Vec<ChannelEvent>) {
        let (opens, closes) = match header.seq_flag {
            SeqFlag::First => (true, false),
            SeqFlag::Continue => (false, false),
            SeqFlag::Last => (false, true),
            SeqFlag::Single => (true, true),
        };

        if opens {
            match TpFileAssembler::open(&payload) {
                Ok(tp) => self.current_tpfile = Some(tp),
                Err(err) => {
                    warn!("vcid {}: apid {}: bad TP_File header: {err}", self.vcid, header.apid);
                    self.current_tpfile = None;
                    return;
                }
            }
        } else if let Some(tp) = self.current_tpfile.as_mut() {
            tp.append(&payload);
        } else {
            warn!(
                "vcid {}: apid {}: CP_PDU continuation with no open TP_File",
                self.vcid, header.apid
            );
            return;
        }

        if closes {
            if let Some(tp) = self.current_tpfile.take() {
                match tp.finish() {
                    Ok((tp_header, data)) => events.push(ChannelEvent::TpFileComplete {
                        apid: header.apid,
                        counter: tp_header.counter,
                        data,
                    }),
                    Err(err) => warn!(
                        "vcid {}: apid {}: TP_File length mismatch, skipping file: {err}",
                        self.vcid, header.apid
                    ),
                }
            }
        }
    }
}
