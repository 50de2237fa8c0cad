use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    qos, read_mqtt_bytes, read_mqtt_string, read_u16, read_u8, write_mqtt_bytes,
    write_mqtt_string, write_remaining_length, Error, FixedHeader, QoS,
};

pub(crate) const PROTOCOL_NAME: &str = "MQIsdp";
pub(crate) const PROTOCOL_LEVEL: u8 = 3;

// Connect flag bits
const USERNAME: u8 = 0b1000_0000;
const PASSWORD: u8 = 0b0100_0000;
const WILL_RETAIN: u8 = 0b0010_0000;
const WILL_QOS_SHIFT: u8 = 3;
const WILL: u8 = 0b0000_0100;
const CLEAN_SESSION: u8 = 0b0000_0010;

/// Connection request to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    /// Seconds the broker may wait between control packets.
    pub keep_alive: u16,
    /// Client identifier.
    pub client_id: String,
    /// Start with a fresh session instead of resuming stored state.
    pub clean_session: bool,
    /// Message the broker publishes if this connection dies abnormally.
    pub last_will: Option<LastWill>,
    /// Credentials.
    pub login: Option<Login>,
}

impl Connect {
    pub fn new<S: Into<String>>(id: S) -> Connect {
        Connect {
            keep_alive: 10,
            client_id: id.into(),
            clean_session: true,
            last_will: None,
            login: None,
        }
    }

    fn len(&self) -> usize {
        let mut len = 2 + PROTOCOL_NAME.len() // protocol name
            + 1                               // protocol level
            + 1                               // connect flags
            + 2;                              // keep alive

        len += 2 + self.client_id.len();

        if let Some(will) = &self.last_will {
            len += will.len();
        }
        if let Some(login) = &self.login {
            len += login.len();
        }

        len
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Connect, Error> {
        bytes.advance(fixed_header.fixed_header_len);

        let protocol_name = read_mqtt_string(&mut bytes)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(Error::InvalidProtocol);
        }

        let level = read_u8(&mut bytes)?;
        if level != PROTOCOL_LEVEL {
            return Err(Error::InvalidProtocolLevel(level));
        }

        let connect_flags = read_u8(&mut bytes)?;
        let clean_session = (connect_flags & CLEAN_SESSION) != 0;
        let keep_alive = read_u16(&mut bytes)?;

        let client_id = read_mqtt_string(&mut bytes)?;
        let last_will = LastWill::read(connect_flags, &mut bytes)?;
        let login = Login::read(connect_flags, &mut bytes)?;

        Ok(Connect {
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
        })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();
        let start = buffer.len();

        buffer.put_u8(0b0001_0000);
        let count = write_remaining_length(buffer, len)?;
        write_mqtt_string(buffer, PROTOCOL_NAME);
        buffer.put_u8(PROTOCOL_LEVEL);

        // The will and login bits are only known after their payloads are
        // written, so the flags byte is patched in afterwards.
        let flags_index = start + 1 + count + 2 + PROTOCOL_NAME.len() + 1;

        let mut connect_flags = 0;
        if self.clean_session {
            connect_flags |= CLEAN_SESSION;
        }

        buffer.put_u8(connect_flags);
        buffer.put_u16(self.keep_alive);
        write_mqtt_string(buffer, &self.client_id);

        if let Some(will) = &self.last_will {
            connect_flags |= will.write(buffer);
        }
        if let Some(login) = &self.login {
            connect_flags |= login.write(buffer);
        }

        buffer[flags_index] = connect_flags;

        Ok(1 + count + len)
    }
}

/// Message published by the broker on the client's behalf when the
/// connection terminates without a DISCONNECT.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> LastWill {
        LastWill {
            topic: topic.into(),
            message: Bytes::from(payload.into()),
            qos,
            retain,
        }
    }

    fn len(&self) -> usize {
        2 + self.topic.len() + 2 + self.message.len()
    }

    fn read(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<LastWill>, Error> {
        if connect_flags & WILL == 0 {
            return Ok(None);
        }

        let topic = read_mqtt_string(bytes)?;
        let message = read_mqtt_bytes(bytes)?;
        Ok(Some(LastWill {
            topic,
            message,
            qos: qos((connect_flags >> WILL_QOS_SHIFT) & 0b11)?,
            retain: (connect_flags & WILL_RETAIN) != 0,
        }))
    }

    fn write(&self, buffer: &mut BytesMut) -> u8 {
        let mut connect_flags = WILL;
        connect_flags |= (self.qos as u8) << WILL_QOS_SHIFT;
        if self.retain {
            connect_flags |= WILL_RETAIN;
        }

        write_mqtt_string(buffer, &self.topic);
        write_mqtt_bytes(buffer, &self.message);
        connect_flags
    }
}

/// Username and password sent in the CONNECT payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub user: String,
    pub password: String,
}

impl Login {
    pub fn new<U: Into<String>, P: Into<String>>(user: U, password: P) -> Login {
        Login {
            user: user.into(),
            password: password.into(),
        }
    }

    fn len(&self) -> usize {
        let mut len = 0;
        if !self.user.is_empty() {
            len += 2 + self.user.len();
        }
        if !self.password.is_empty() {
            len += 2 + self.password.len();
        }
        len
    }

    fn read(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<Login>, Error> {
        let user = match connect_flags & USERNAME {
            0 => String::new(),
            _ => read_mqtt_string(bytes)?,
        };
        let password = match connect_flags & PASSWORD {
            0 => String::new(),
            _ => read_mqtt_string(bytes)?,
        };

        if user.is_empty() && password.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Login { user, password }))
        }
    }

    fn write(&self, buffer: &mut BytesMut) -> u8 {
        let mut connect_flags = 0;
        if !self.user.is_empty() {
            connect_flags |= USERNAME;
            write_mqtt_string(buffer, &self.user);
        }
        if !self.password.is_empty() {
            connect_flags |= PASSWORD;
            write_mqtt_string(buffer, &self.password);
        }
        connect_flags
    }
}

#[cfg(test)]
mod tests {
    use super::super::{read, Packet};
    use super::*;

    #[test]
    fn plain_connect_wire_form() {
        let mut connect = Connect::new("abc");
        connect.keep_alive = 60;

        let mut buffer = BytesMut::new();
        let written = connect.write(&mut buffer).unwrap();
        let expected = [
            0x10, 0x11, // CONNECT, remaining length 17
            0x00, 0x06, b'M', b'Q', b'I', b's', b'd', b'p', // protocol name
            0x03, // protocol level
            0x02, // connect flags: clean session
            0x00, 0x3C, // keep alive 60
            0x00, 0x03, b'a', b'b', b'c', // client id
        ];
        assert_eq!(written, expected.len());
        assert_eq!(buffer.to_vec(), expected);
    }

    #[test]
    fn connect_payload_order_is_will_then_login() {
        let mut connect = Connect::new("dev-1");
        connect.clean_session = false;
        connect.last_will = Some(LastWill::new("wills/dev-1", "gone", QoS::AtLeastOnce, true));
        connect.login = Some(Login::new("user", "pass"));

        let mut buffer = BytesMut::new();
        connect.write(&mut buffer).unwrap();

        // username | password | will retain | will QoS 1 | will flag
        assert_eq!(buffer[11], 0x80 | 0x40 | 0x20 | 0x08 | 0x04);

        let decoded = match read(&mut buffer, 1024).unwrap() {
            Packet::Connect(connect) => connect,
            packet => panic!("expected CONNECT, got {:?}", packet),
        };
        assert_eq!(decoded, connect);
    }

    #[test]
    fn connect_flags_survive_a_dirty_buffer() {
        let mut buffer = BytesMut::new();
        Packet::PingReq.write(&mut buffer).unwrap();

        let mut connect = Connect::new("abc");
        connect.clean_session = false;
        connect.login = Some(Login::new("user", ""));
        connect.write(&mut buffer).unwrap();

        buffer.advance(2);
        let decoded = match read(&mut buffer, 1024).unwrap() {
            Packet::Connect(connect) => connect,
            packet => panic!("expected CONNECT, got {:?}", packet),
        };
        assert_eq!(decoded.login, Some(Login::new("user", "")));
    }

    #[test]
    fn foreign_protocol_magic_is_rejected() {
        // a 3.1.1 style CONNECT: name "MQTT", level 4
        let mut frame = BytesMut::new();
        frame.extend_from_slice(&[
            0x10, 0x0F, // CONNECT, remaining length 15
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, 0x02, 0x00, 0x0A, // level, flags, keep alive
            0x00, 0x03, b'a', b'b', b'c', // client id
        ]);

        assert_eq!(read(&mut frame, 1024), Err(Error::InvalidProtocol));
    }

    #[test]
    fn unsupported_protocol_level_is_rejected() {
        let mut buffer = BytesMut::new();
        Connect::new("abc").write(&mut buffer).unwrap();
        let level_index = 1 + 1 + 2 + PROTOCOL_NAME.len();
        buffer[level_index] = 4;

        assert_eq!(read(&mut buffer, 1024), Err(Error::InvalidProtocolLevel(4)));
    }
}
