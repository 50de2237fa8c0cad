use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    qos, read_mqtt_string, read_u16, write_mqtt_string, write_remaining_length, Error,
    FixedHeader, QoS,
};

/// Application message, in either direction.
///
/// `pkid` 0 means "no id assigned yet"; QoS 1 and 2 messages must carry a
/// non-zero id on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub pkid: u16,
    pub payload: Bytes,
}

impl Publish {
    pub fn new<S: Into<String>, P: Into<Vec<u8>>>(topic: S, qos: QoS, payload: P) -> Publish {
        Publish {
            dup: false,
            qos,
            retain: false,
            pkid: 0,
            topic: topic.into(),
            payload: Bytes::from(payload.into()),
        }
    }

    fn len(&self) -> usize {
        let mut len = 2 + self.topic.len();
        if self.qos != QoS::AtMostOnce {
            len += 2;
        }
        len + self.payload.len()
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Publish, Error> {
        let qos = qos((fixed_header.byte1 & 0b0110) >> 1)?;
        let dup = (fixed_header.byte1 & 0b1000) != 0;
        let retain = (fixed_header.byte1 & 0b0001) != 0;

        bytes.advance(fixed_header.fixed_header_len);
        let topic = read_mqtt_string(&mut bytes)?;

        // Packet identifier is only present for QoS 1 and 2
        let pkid = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce | QoS::ExactlyOnce => read_u16(&mut bytes)?,
        };

        if qos != QoS::AtMostOnce && pkid == 0 {
            return Err(Error::PacketIdZero);
        }

        Ok(Publish {
            dup,
            qos,
            retain,
            topic,
            pkid,
            payload: bytes,
        })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();

        let dup = self.dup as u8;
        let qos = self.qos as u8;
        let retain = self.retain as u8;
        buffer.put_u8(0b0011_0000 | retain | (qos << 1) | (dup << 3));

        let count = write_remaining_length(buffer, len)?;
        write_mqtt_string(buffer, self.topic.as_str());

        if self.qos != QoS::AtMostOnce {
            if self.pkid == 0 {
                return Err(Error::PacketIdZero);
            }
            buffer.put_u16(self.pkid);
        }

        buffer.extend_from_slice(&self.payload);

        Ok(1 + count + len)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{read, Packet};
    use super::*;

    #[test]
    fn qos0_publish_has_no_packet_id_on_the_wire() {
        let publish = Publish::new("a/b", QoS::AtMostOnce, "hello");

        let mut buffer = BytesMut::new();
        let written = publish.write(&mut buffer).unwrap();
        let expected = [
            0x30, 0x0A, // PUBLISH, remaining length 10
            0x00, 0x03, b'a', b'/', b'b', // topic
            b'h', b'e', b'l', b'l', b'o', // payload
        ];
        assert_eq!(written, expected.len());
        assert_eq!(buffer.to_vec(), expected);

        let decoded = match read(&mut buffer, 1024).unwrap() {
            Packet::Publish(publish) => publish,
            packet => panic!("expected PUBLISH, got {:?}", packet),
        };
        assert_eq!(decoded, publish);
        assert_eq!(decoded.pkid, 0);
    }

    #[test]
    fn qos1_publish_carries_its_packet_id() {
        let mut publish = Publish::new("a/b", QoS::AtLeastOnce, "hi");
        publish.pkid = 10;

        let mut buffer = BytesMut::new();
        publish.write(&mut buffer).unwrap();
        assert_eq!(
            buffer.to_vec(),
            [0x32, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x0A, b'h', b'i']
        );

        let decoded = match read(&mut buffer, 1024).unwrap() {
            Packet::Publish(publish) => publish,
            packet => panic!("expected PUBLISH, got {:?}", packet),
        };
        assert_eq!(decoded, publish);
    }

    #[test]
    fn header_flags_decode_into_dup_qos_retain() {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(b"\x3d\x0d\x00\x05topic\x43\x21data");

        let decoded = match read(&mut bytes, 1024).unwrap() {
            Packet::Publish(publish) => publish,
            packet => panic!("expected PUBLISH, got {:?}", packet),
        };
        assert!(decoded.dup);
        assert!(decoded.retain);
        assert_eq!(decoded.qos, QoS::ExactlyOnce);
        assert_eq!(decoded.topic, "topic");
        assert_eq!(decoded.pkid, 0x4321);
        assert_eq!(&decoded.payload[..], b"data");
    }

    #[test]
    fn reserved_qos_bits_are_rejected() {
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(b"\x36\x07\x00\x03a/b\x00\x01");
        assert_eq!(read(&mut bytes, 1024), Err(Error::InvalidQoS(3)));
    }

    #[test]
    fn elevated_qos_requires_a_packet_id() {
        let publish = Publish::new("a/b", QoS::AtLeastOnce, "hi");
        let mut buffer = BytesMut::new();
        assert_eq!(publish.write(&mut buffer), Err(Error::PacketIdZero));

        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(b"\x32\x09\x00\x03a/b\x00\x00hi");
        assert_eq!(read(&mut bytes, 1024), Err(Error::PacketIdZero));
    }
}
