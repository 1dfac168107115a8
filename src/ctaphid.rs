//! CTAPHID packet framing: a message up to 7609 bytes split into one INIT
//! packet and zero or more CONT packets over a 64-byte HID report.

use crate::error::{Error, ProtocolErrorKind};

/// HID report size this framing assumes
const PACKET_SIZE: usize = 64;

/// INIT packet payload capacity: 64 - 4 (cid) - 1 (cmd) - 2 (bcnt)
const INIT_PAYLOAD_CAP: usize = PACKET_SIZE - 7;

/// CONT packet payload capacity: 64 - 4 (cid) - 1 (seq)
const CONT_PAYLOAD_CAP: usize = PACKET_SIZE - 5;

/// Largest message this framing can carry
pub const MAX_MESSAGE_SIZE: usize = INIT_PAYLOAD_CAP + CONT_PAYLOAD_CAP * 128;

/// CTAPHID command bytes relevant to this crate
pub const CMD_MSG: u8 = 0x03;
pub const CMD_CBOR: u8 = 0x10;
pub const CMD_INIT: u8 = 0x06;
pub const CMD_CANCEL: u8 = 0x11;
pub const CMD_KEEPALIVE: u8 = 0x3B;
pub const CMD_ERROR: u8 = 0x3F;

/// The broadcast channel id used before `CTAPHID_INIT` allocates a real one
pub const CID_BROADCAST: u32 = 0xFFFF_FFFF;

/// Split `payload` into the INIT+CONT packet sequence for `cid`/`cmd`.
pub fn pack(cid: u32, cmd: u8, payload: &[u8]) -> Result<Vec<[u8; PACKET_SIZE]>, Error> {
    if payload.len() > MAX_MESSAGE_SIZE {
        fail!(
            ProtocolErrorKind::MalformedResponse,
            "CTAPHID message exceeds the 7609-byte maximum"
        );
    }

    let mut packets = Vec::new();
    let mut packet = [0u8; PACKET_SIZE];
    packet[0..4].copy_from_slice(&cid.to_be_bytes());
    packet[4] = cmd | 0x80;
    packet[5..7].copy_from_slice(&(payload.len() as u16).to_be_bytes());

    let (init_chunk, rest) = if payload.len() > INIT_PAYLOAD_CAP {
        payload.split_at(INIT_PAYLOAD_CAP)
    } else {
        (payload, &[][..])
    };
    packet[7..7 + init_chunk.len()].copy_from_slice(init_chunk);
    packets.push(packet);

    let mut seq = 0u8;
    let mut remaining = rest;
    while !remaining.is_empty() {
        let mut cont = [0u8; PACKET_SIZE];
        cont[0..4].copy_from_slice(&cid.to_be_bytes());
        cont[4] = seq;
        let take = remaining.len().min(CONT_PAYLOAD_CAP);
        cont[5..5 + take].copy_from_slice(&remaining[..take]);
        packets.push(cont);
        remaining = &remaining[take..];
        seq += 1;
    }

    Ok(packets)
}

/// Incremental CTAPHID message reassembler, fed one packet at a time.
pub struct Reassembler {
    cid: u32,
    cmd: Option<u8>,
    expected_len: usize,
    buf: Vec<u8>,
    next_seq: u8,
}

impl Reassembler {
    /// Start a reassembler expecting packets on channel `cid`
    pub fn new(cid: u32) -> Self {
        Self {
            cid,
            cmd: None,
            expected_len: 0,
            buf: Vec::new(),
            next_seq: 0,
        }
    }

    /// Feed one raw 64-byte packet. Returns `Some((cmd, payload))` once the
    /// full message has been reassembled.
    pub fn feed(&mut self, packet: &[u8]) -> Result<Option<(u8, Vec<u8>)>, Error> {
        if packet.len() != PACKET_SIZE {
            fail!(
                ProtocolErrorKind::MalformedResponse,
                "CTAPHID packet must be exactly 64 bytes"
            );
        }
        let cid = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        ensure!(cid == self.cid, ProtocolErrorKind::MalformedResponse);

        if self.cmd.is_none() {
            let cmd = packet[4] & 0x7F;
            let len = u16::from_be_bytes([packet[5], packet[6]]) as usize;
            self.cmd = Some(cmd);
            self.expected_len = len;
            let take = len.min(INIT_PAYLOAD_CAP);
            self.buf.extend_from_slice(&packet[7..7 + take]);
        } else {
            let seq = packet[4];
            ensure!(seq == self.next_seq, ProtocolErrorKind::MalformedResponse);
            self.next_seq += 1;
            let remaining = self.expected_len - self.buf.len();
            let take = remaining.min(CONT_PAYLOAD_CAP);
            self.buf.extend_from_slice(&packet[5..5 + take]);
        }

        if self.buf.len() >= self.expected_len {
            Ok(Some((self.cmd.unwrap(), std::mem::take(&mut self.buf))))
        } else {
            Ok(None)
        }
    }
}
