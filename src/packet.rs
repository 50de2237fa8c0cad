//! MQTT 3.1 wire format.
//!
//! Speaks protocol level 3 (`MQIsdp`). Every control packet type can be both
//! written and read, so the same code drives the client and the broker end of
//! a test fixture. [`check`] frames a packet against a raw byte view without
//! consuming anything; [`read`] consumes exactly one frame and decodes it.

use core::slice::Iter;

use bytes::{Buf, BufMut, Bytes, BytesMut};

mod ack;
mod connack;
mod connect;
mod publish;
mod subscribe;

pub use ack::{PubAck, PubComp, PubRec, PubRel};
pub use connack::{ConnAck, ConnectReturnCode};
pub use connect::{Connect, LastWill, Login};
pub use publish::Publish;
pub use subscribe::{SubAck, Subscribe, SubscribeFilter, SubscribeReasonCode, UnsubAck, Unsubscribe};

/// Errors during packet reading or writing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid connect return code: {0}")]
    InvalidConnectReturnCode(u8),
    #[error("invalid protocol")]
    InvalidProtocol,
    #[error("invalid protocol level: {0}")]
    InvalidProtocolLevel(u8),
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("invalid QoS value: {0}")]
    InvalidQoS(u8),
    #[error("packet id must be non-zero")]
    PacketIdZero,
    #[error("payload size is incorrect")]
    PayloadSizeIncorrect,
    #[error("payload is too long")]
    PayloadTooLong,
    #[error("payload size {0} exceeds the packet size limit")]
    PayloadSizeLimitExceeded(usize),
    #[error("payload is required")]
    PayloadRequired,
    #[error("topic or string is not utf-8")]
    TopicNotUtf8,
    #[error("promised boundary crossed: {0}")]
    BoundaryCrossed(usize),
    #[error("packet is malformed")]
    MalformedPacket,
    #[error("remaining length is malformed")]
    MalformedRemainingLength,
    #[error("{0} more bytes required to frame the packet")]
    InsufficientBytes(usize),
}

/// Quality of service of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Maps a number to its QoS.
pub fn qos(num: u8) -> Result<QoS, Error> {
    match num {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        qos => Err(Error::InvalidQoS(qos)),
    }
}

/// MQTT control packet type, the high nibble of the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

/// Packet type and frame boundaries parsed from the first 2-5 bytes of a
/// control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// First byte: packet type in bits 7-4, flags in bits 3-0.
    pub byte1: u8,
    /// Length of the fixed header itself, 2-5 bytes.
    pub fixed_header_len: usize,
    /// Number of bytes in the rest of the frame.
    pub remaining_len: usize,
}

impl FixedHeader {
    fn new(byte1: u8, remaining_len_len: usize, remaining_len: usize) -> FixedHeader {
        FixedHeader {
            byte1,
            fixed_header_len: remaining_len_len + 1,
            remaining_len,
        }
    }

    pub fn packet_type(&self) -> Result<PacketType, Error> {
        let num = self.byte1 >> 4;
        match num {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            num => Err(Error::InvalidPacketType(num)),
        }
    }

    /// Total frame size, fixed header plus remaining length.
    pub fn frame_length(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }
}

/// One MQTT control packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Append the packet's wire form to `buffer`. Returns the number of
    /// bytes written.
    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        match self {
            Packet::Connect(p) => p.write(buffer),
            Packet::ConnAck(p) => p.write(buffer),
            Packet::Publish(p) => p.write(buffer),
            Packet::PubAck(p) => p.write(buffer),
            Packet::PubRec(p) => p.write(buffer),
            Packet::PubRel(p) => p.write(buffer),
            Packet::PubComp(p) => p.write(buffer),
            Packet::Subscribe(p) => p.write(buffer),
            Packet::SubAck(p) => p.write(buffer),
            Packet::Unsubscribe(p) => p.write(buffer),
            Packet::UnsubAck(p) => p.write(buffer),
            Packet::PingReq => {
                buffer.put_slice(&[0xC0, 0x00]);
                Ok(2)
            }
            Packet::PingResp => {
                buffer.put_slice(&[0xD0, 0x00]);
                Ok(2)
            }
            Packet::Disconnect => {
                buffer.put_slice(&[0xE0, 0x00]);
                Ok(2)
            }
        }
    }
}

/// Checks whether `stream` holds at least one complete frame.
///
/// Returns [`Error::InsufficientBytes`] with the missing count when the
/// frame is still incomplete, and [`Error::PayloadSizeLimitExceeded`] when
/// the frame would exceed `max_packet_size`.
pub fn check(stream: Iter<u8>, max_packet_size: usize) -> Result<FixedHeader, Error> {
    let stream_len = stream.len();
    let fixed_header = parse_fixed_header(stream)?;
    if fixed_header.remaining_len > max_packet_size {
        return Err(Error::PayloadSizeLimitExceeded(fixed_header.remaining_len));
    }

    let frame_length = fixed_header.frame_length();
    if stream_len < frame_length {
        return Err(Error::InsufficientBytes(frame_length - stream_len));
    }

    Ok(fixed_header)
}

fn parse_fixed_header(mut stream: Iter<u8>) -> Result<FixedHeader, Error> {
    // No packet is smaller than a type byte and a one byte remaining length
    let stream_len = stream.len();
    if stream_len < 2 {
        return Err(Error::InsufficientBytes(2 - stream_len));
    }

    let byte1 = stream.next().ok_or(Error::InsufficientBytes(2))?;
    let (len_len, len) = length(stream)?;

    Ok(FixedHeader::new(*byte1, len_len, len))
}

/// Decodes the remaining length variable integer. Returns the number of
/// bytes it occupied and its value.
fn length(stream: Iter<u8>) -> Result<(usize, usize), Error> {
    let mut len: usize = 0;
    let mut len_len = 0;
    let mut done = false;
    let mut shift = 0;

    // 7 value bits per byte, bit 7 flags continuation, 4 bytes at most
    for byte in stream {
        len_len += 1;
        let byte = *byte as usize;
        len += (byte & 0x7F) << shift;

        done = (byte & 0x80) == 0;
        if done {
            break;
        }

        shift += 7;
        if shift > 21 {
            return Err(Error::MalformedRemainingLength);
        }
    }

    if !done {
        return Err(Error::InsufficientBytes(1));
    }

    Ok((len_len, len))
}

/// Reads one complete frame out of `stream` and decodes it.
///
/// [`check`] must have succeeded on the same bytes first; after that, any
/// error here means a malformed frame that has already been consumed.
pub fn read(stream: &mut BytesMut, max_packet_size: usize) -> Result<Packet, Error> {
    let fixed_header = check(stream.iter(), max_packet_size)?;
    let packet = stream.split_to(fixed_header.frame_length());
    let packet_type = fixed_header.packet_type()?;

    if fixed_header.remaining_len == 0 {
        return match packet_type {
            PacketType::PingReq => Ok(Packet::PingReq),
            PacketType::PingResp => Ok(Packet::PingResp),
            PacketType::Disconnect => Ok(Packet::Disconnect),
            _ => Err(Error::PayloadRequired),
        };
    }

    let packet = packet.freeze();
    let packet = match packet_type {
        PacketType::Connect => Packet::Connect(Connect::read(fixed_header, packet)?),
        PacketType::ConnAck => Packet::ConnAck(ConnAck::read(fixed_header, packet)?),
        PacketType::Publish => Packet::Publish(Publish::read(fixed_header, packet)?),
        PacketType::PubAck => Packet::PubAck(PubAck::read(fixed_header, packet)?),
        PacketType::PubRec => Packet::PubRec(PubRec::read(fixed_header, packet)?),
        PacketType::PubRel => Packet::PubRel(PubRel::read(fixed_header, packet)?),
        PacketType::PubComp => Packet::PubComp(PubComp::read(fixed_header, packet)?),
        PacketType::Subscribe => Packet::Subscribe(Subscribe::read(fixed_header, packet)?),
        PacketType::SubAck => Packet::SubAck(SubAck::read(fixed_header, packet)?),
        PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(fixed_header, packet)?),
        PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(fixed_header, packet)?),
        PacketType::PingReq => Packet::PingReq,
        PacketType::PingResp => Packet::PingResp,
        PacketType::Disconnect => Packet::Disconnect,
    };

    Ok(packet)
}

fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    if stream.is_empty() {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.get_u8())
}

fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.get_u16())
}

fn read_mqtt_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    let len = read_u16(stream)? as usize;
    if len > stream.len() {
        return Err(Error::BoundaryCrossed(len));
    }
    Ok(stream.split_to(len))
}

fn read_mqtt_string(stream: &mut Bytes) -> Result<String, Error> {
    let s = read_mqtt_bytes(stream)?;
    String::from_utf8(s.to_vec()).map_err(|_| Error::TopicNotUtf8)
}

fn write_mqtt_bytes(stream: &mut BytesMut, bytes: &[u8]) {
    stream.put_u16(bytes.len() as u16);
    stream.extend_from_slice(bytes);
}

fn write_mqtt_string(stream: &mut BytesMut, string: &str) {
    write_mqtt_bytes(stream, string.as_bytes());
}

/// Encodes the remaining length variable integer. Returns the number of
/// bytes it occupied.
fn write_remaining_length(stream: &mut BytesMut, len: usize) -> Result<usize, Error> {
    if len > 268_435_455 {
        return Err(Error::PayloadTooLong);
    }

    let mut done = false;
    let mut x = len;
    let mut count = 0;

    while !done {
        let mut byte = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            byte |= 128;
        }

        stream.put_u8(byte);
        count += 1;
        done = x == 0;
    }

    Ok(count)
}
