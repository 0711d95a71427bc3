use crate::communication::discovery;
use crate::device::ObserverError;
use crate::AddressParseError;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("timed out opening the connection")]
    Timeout,
    #[error("the connection was refused: {0}")]
    Refused(#[source] std::io::Error),
    #[error("the connection is already open")]
    AlreadyOpen,
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ConnectError::Timeout,
            _ => ConnectError::Refused(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum DisconnectError {
    #[error("timed out closing the connection")]
    Timeout,
    #[error("IO error while closing the connection: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a discovery round ends without reporting services. None of these
/// reach the caller of `discover`; they are only logged.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("the service discovery query failed: {0}")]
    QueryFailed(#[from] discovery::Error),
    #[error("the service discovery query timed out")]
    Timeout,
    #[error("the device offers no audio sink service")]
    NoMatchingService,
}

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("a device is already assigned")]
    AlreadyAssigned,
    #[error("the device is not known to the controller")]
    DeviceUnavailable,
    #[error("could not observe the device: {0}")]
    ObserverInstallFailed(#[source] ObserverError),
    #[error("the device is not assigned")]
    NotAssigned,
    #[error(transparent)]
    InvalidAddress(#[from] AddressParseError),
}
