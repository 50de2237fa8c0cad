use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    qos, read_mqtt_string, read_u16, read_u8, write_mqtt_string, write_remaining_length, Error,
    FixedHeader, QoS,
};

/// Subscription request for one or more topic filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub pkid: u16,
    pub filters: Vec<SubscribeFilter>,
}

impl Subscribe {
    pub fn new<S: Into<String>>(path: S, qos: QoS) -> Subscribe {
        Subscribe {
            pkid: 0,
            filters: vec![SubscribeFilter::new(path.into(), qos)],
        }
    }

    fn len(&self) -> usize {
        2 + self.filters.iter().map(|f| f.len()).sum::<usize>()
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Subscribe, Error> {
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            let path = read_mqtt_string(&mut bytes)?;
            let requested_qos = read_u8(&mut bytes)?;
            filters.push(SubscribeFilter {
                path,
                qos: qos(requested_qos)?,
            });
        }

        Ok(Subscribe { pkid, filters })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();

        // type 8 | reserved flags 0b0010
        buffer.put_u8(0x82);
        let count = write_remaining_length(buffer, len)?;
        buffer.put_u16(self.pkid);
        for filter in &self.filters {
            filter.write(buffer);
        }

        Ok(1 + count + len)
    }
}

/// One topic filter and the QoS requested for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeFilter {
    pub path: String,
    pub qos: QoS,
}

impl SubscribeFilter {
    pub fn new(path: String, qos: QoS) -> SubscribeFilter {
        SubscribeFilter { path, qos }
    }

    fn len(&self) -> usize {
        // filter string + requested QoS byte
        2 + self.path.len() + 1
    }

    fn write(&self, buffer: &mut BytesMut) {
        write_mqtt_string(buffer, self.path.as_str());
        buffer.put_u8(self.qos as u8);
    }
}

/// Acknowledgement to a subscription, one granted code per filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SubAck {
    pub pkid: u16,
    pub return_codes: Vec<SubscribeReasonCode>,
}

/// Outcome of one requested filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReasonCode {
    Success(QoS),
    Failure,
}

impl SubAck {
    pub fn new(pkid: u16, return_codes: Vec<SubscribeReasonCode>) -> SubAck {
        SubAck { pkid, return_codes }
    }

    fn len(&self) -> usize {
        2 + self.return_codes.len()
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<SubAck, Error> {
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;

        let mut return_codes = Vec::new();
        while bytes.has_remaining() {
            let code = read_u8(&mut bytes)?;
            let code = match code {
                0x80 => SubscribeReasonCode::Failure,
                code => SubscribeReasonCode::Success(qos(code)?),
            };
            return_codes.push(code);
        }

        Ok(SubAck { pkid, return_codes })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();

        buffer.put_u8(0x90);
        let count = write_remaining_length(buffer, len)?;
        buffer.put_u16(self.pkid);
        for code in &self.return_codes {
            let code = match code {
                SubscribeReasonCode::Success(qos) => *qos as u8,
                SubscribeReasonCode::Failure => 0x80,
            };
            buffer.put_u8(code);
        }

        Ok(1 + count + len)
    }
}

/// Request to stop receiving messages on the given topics.
#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub pkid: u16,
    pub topics: Vec<String>,
}

impl Unsubscribe {
    pub fn new<S: Into<String>>(topic: S) -> Unsubscribe {
        Unsubscribe {
            pkid: 0,
            topics: vec![topic.into()],
        }
    }

    fn len(&self) -> usize {
        2 + self.topics.iter().map(|t| 2 + t.len()).sum::<usize>()
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Unsubscribe, Error> {
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;

        let mut topics = Vec::new();
        while bytes.has_remaining() {
            topics.push(read_mqtt_string(&mut bytes)?);
        }

        Ok(Unsubscribe { pkid, topics })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();

        // type 10 | reserved flags 0b0010
        buffer.put_u8(0xA2);
        let count = write_remaining_length(buffer, len)?;
        buffer.put_u16(self.pkid);
        for topic in &self.topics {
            write_mqtt_string(buffer, topic);
        }

        Ok(1 + count + len)
    }
}

/// Acknowledgement to an unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    pub pkid: u16,
}

impl UnsubAck {
    pub fn new(pkid: u16) -> UnsubAck {
        UnsubAck { pkid }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<UnsubAck, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);
        let pkid = read_u16(&mut bytes)?;
        Ok(UnsubAck { pkid })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0xB0, 0x02]);
        buffer.put_u16(self.pkid);
        Ok(4)
    }
}
