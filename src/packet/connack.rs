use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{read_u8, Error, FixedHeader};

/// Return code in the acknowledgement to a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Success = 0,
    RefusedProtocolVersion = 1,
    BadClientId = 2,
    ServiceUnavailable = 3,
    BadUserNamePassword = 4,
    NotAuthorized = 5,
}

/// Acknowledgement to a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub fn new(code: ConnectReturnCode) -> ConnAck {
        ConnAck { code }
    }

    pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<ConnAck, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::PayloadSizeIncorrect);
        }
        bytes.advance(fixed_header.fixed_header_len);

        // the first variable header byte is reserved in 3.1
        let _reserved = read_u8(&mut bytes)?;
        let return_code = read_u8(&mut bytes)?;

        Ok(ConnAck {
            code: connect_return(return_code)?,
        })
    }

    pub fn write(&self, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0x20, 0x02, 0x00, self.code as u8]);
        Ok(4)
    }
}

/// Maps a number to its connect return code.
fn connect_return(num: u8) -> Result<ConnectReturnCode, Error> {
    match num {
        0 => Ok(ConnectReturnCode::Success),
        1 => Ok(ConnectReturnCode::RefusedProtocolVersion),
        2 => Ok(ConnectReturnCode::BadClientId),
        3 => Ok(ConnectReturnCode::ServiceUnavailable),
        4 => Ok(ConnectReturnCode::BadUserNamePassword),
        5 => Ok(ConnectReturnCode::NotAuthorized),
        num => Err(Error::InvalidConnectReturnCode(num)),
    }
}
