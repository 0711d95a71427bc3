use bytes::Buf;
use num_traits::FromPrimitive;

#[derive(Error, Debug)]
pub enum Error {
    #[error("an i/o error occurred")]
    Io(#[from] std::io::Error),

    #[error("the remote device returned an error: {0:?}")]
    Remote(ErrorCode),

    #[error("the remote device returned invalid data")]
    InvalidResponse,

    #[error("the remote device answered with an unexpected pdu {0:?}")]
    UnexpectedPdu(super::serialization::PduId),
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ErrorCode {
    UnsupportedSdpVersion = 0x0001,
    InvalidServiceRecordHandle,
    InvalidRequestSyntax,
    InvalidPduSize,
    InvalidContinuationState,
    InsufficientResources,
}

impl ErrorCode {
    pub(super) fn from_buf<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        if buf.remaining() < 2 {
            return Err(Error::InvalidResponse);
        }

        FromPrimitive::from_u16(buf.get_u16()).ok_or(Error::InvalidResponse)
    }
}
