//! The seam between the protocol logic and the sockets it runs over.

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};

use super::stream::BluetoothStream;
use crate::{Address, AddressType};

/// A connected, reliable, record-oriented byte stream to a remote device.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Channel for T {}

/// Opens channels to remote devices. The returned future completes when the
/// channel is usable; callers bound it with their own timeout.
pub trait Connector: Send + Sync {
    /// Opens a channel from the adapter with address `local` to `psm` on
    /// `remote`.
    fn connect(
        &self,
        local: Address,
        remote: Address,
        address_type: AddressType,
        psm: u16,
    ) -> BoxFuture<'static, std::io::Result<Box<dyn Channel>>>;
}

/// Connects through the kernel's L2CAP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct L2capConnector;

impl Connector for L2capConnector {
    fn connect(
        &self,
        local: Address,
        remote: Address,
        address_type: AddressType,
        psm: u16,
    ) -> BoxFuture<'static, std::io::Result<Box<dyn Channel>>> {
        async move {
            let stream = BluetoothStream::connect(local, remote, address_type, psm).await?;
            Ok(Box::new(stream) as Box<dyn Channel>)
        }
        .boxed()
    }
}
