use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{read_u16, Error, FixedHeader};

/// Acknowledgement to a QoS 1 publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub pkid: u16,
}

impl PubAck {
    pub fn new(pkid: u16) -> PubAck {
        PubAck { pkid }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubAck, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;
        Ok(PubAck { pkid })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0x40, 0x02]);
        buffer.put_u16(self.pkid);
        Ok(4)
    }
}

/// First acknowledgement to a QoS 2 publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRec {
    pub pkid: u16,
}

impl PubRec {
    pub fn new(pkid: u16) -> PubRec {
        PubRec { pkid }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRec, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;
        Ok(PubRec { pkid })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0x50, 0x02]);
        buffer.put_u16(self.pkid);
        Ok(4)
    }
}

/// Release of a QoS 2 publish, sent in response to its PUBREC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRel {
    pub pkid: u16,
}

impl PubRel {
    pub fn new(pkid: u16) -> PubRel {
        PubRel { pkid }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRel, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;
        Ok(PubRel { pkid })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        // type 6 | reserved flags 0b0010
        buffer.put_slice(&[0x62, 0x02]);
        buffer.put_u16(self.pkid);
        Ok(4)
    }
}

/// Final acknowledgement of a QoS 2 exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubComp {
    pub pkid: u16,
}

impl PubComp {
    pub fn new(pkid: u16) -> PubComp {
        PubComp { pkid }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubComp, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;
        Ok(PubComp { pkid })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0x70, 0x02]);
        buffer.put_u16(self.pkid);
        Ok(4)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{read, Packet};
    use super::*;

    #[test]
    fn ack_headers_carry_their_type_and_flags() {
        let acks: [(Packet, u8); 4] = [
            (Packet::PubAck(PubAck::new(0x1234)), 0x40),
            (Packet::PubRec(PubRec::new(0x1234)), 0x50),
            (Packet::PubRel(PubRel::new(0x1234)), 0x62),
            (Packet::PubComp(PubComp::new(0x1234)), 0x70),
        ];

        for (packet, header) in acks {
            let mut buffer = BytesMut::new();
            assert_eq!(packet.write(&mut buffer).unwrap(), 4);
            assert_eq!(buffer.to_vec(), [header, 0x02, 0x12, 0x34]);
            assert_eq!(read(&mut buffer, 1024).unwrap(), packet);
        }
    }

    #[test]
    fn ack_body_must_be_two_bytes() {
        let mut bytes = BytesMut::from(&[0x40, 0x03, 0x12, 0x34, 0x00][..]);
        assert_eq!(read(&mut bytes, 1024), Err(Error::PayloadSizeIncorrect));

        let mut bytes = BytesMut::from(&[0x62, 0x01, 0x12][..]);
        assert_eq!(read(&mut bytes, 1024), Err(Error::PayloadSizeIncorrect));
    }
}
