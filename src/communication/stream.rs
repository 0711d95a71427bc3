//! IO structures related to communicating with remote Bluetooth devices.

use std::io::Error;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;

use crate::util::check_error;
use crate::{Address, AddressType};

const BTPROTO_L2CAP: libc::c_int = 0;

#[repr(C)]
#[derive(Copy, Clone)]
struct SockAddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: Address,
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl SockAddrL2 {
    fn new(addr: Address, addr_type: AddressType, psm: u16) -> Self {
        SockAddrL2 {
            l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: psm.to_le(),
            l2_bdaddr: addr,
            l2_cid: 0,
            l2_bdaddr_type: addr_type as u8,
        }
    }

    fn as_ptr(&self) -> *const libc::sockaddr {
        self as *const SockAddrL2 as *const libc::sockaddr
    }

    fn len() -> libc::socklen_t {
        std::mem::size_of::<SockAddrL2>() as libc::socklen_t
    }
}

/// Reads the pending error of a socket whose non-blocking connect finished.
fn take_socket_error(fd: RawFd) -> Result<(), Error> {
    let mut optval: libc::c_int = 0;
    let mut optlen = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    check_error(unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut optval as *mut _ as *mut _,
            &mut optlen,
        )
    })?;

    match optval {
        0 => Ok(()),
        errno => Err(Error::from_raw_os_error(errno)),
    }
}

fn l2cap_socket() -> Result<OwnedFd, Error> {
    let fd = check_error(unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK | libc::SOCK_SEQPACKET,
            BTPROTO_L2CAP,
        )
    })?;

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Waits for a non-blocking connect on `socket` to finish. The socket is
/// closed if this fails or is dropped before it completes.
async fn wait_connected(socket: OwnedFd) -> Result<OwnedFd, Error> {
    let afd = AsyncFd::new(socket)?;
    let _ = afd.writable().await?;
    let socket = afd.into_inner();
    take_socket_error(socket.as_raw_fd())?;
    Ok(socket)
}

/// A structure representing an active L2CAP connection to a remote device.
/// The socket is `SOCK_SEQPACKET`, so every write is delivered as one
/// packet.
#[derive(Debug)]
pub struct BluetoothStream {
    inner: UnixStream,
}

impl BluetoothStream {
    /// Connects to `psm` on a remote Bluetooth device through the adapter
    /// with address `local`. Completes once the L2CAP channel is configured
    /// or the kernel reports a failure.
    pub async fn connect(
        local: Address,
        remote: Address,
        addr_type: AddressType,
        psm: u16,
    ) -> Result<Self, Error> {
        let socket = l2cap_socket()?;

        let local_type = match addr_type {
            AddressType::BREDR => AddressType::BREDR,
            _ => AddressType::LEPublic,
        };
        let source = SockAddrL2::new(local, local_type, 0);
        check_error(unsafe { libc::bind(socket.as_raw_fd(), source.as_ptr(), SockAddrL2::len()) })?;

        let target = SockAddrL2::new(remote, addr_type, psm);
        let res = unsafe { libc::connect(socket.as_raw_fd(), target.as_ptr(), SockAddrL2::len()) };

        let socket = match check_error(res) {
            Ok(_) => socket,
            // should always get EINPROGRESS if socket is initialized using SOCK_NONBLOCK
            Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => wait_connected(socket).await?,
            Err(err) => return Err(err),
        };

        Ok(BluetoothStream {
            inner: UnixStream::from_std(StdUnixStream::from(socket))?,
        })
    }

    fn pin_get_inner(self: Pin<&mut Self>) -> Pin<&mut UnixStream> {
        unsafe { self.map_unchecked_mut(|s| &mut s.inner) }
    }
}

impl AsRawFd for BluetoothStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsyncWrite for BluetoothStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, Error>> {
        AsyncWrite::poll_write(self.pin_get_inner(), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        AsyncWrite::poll_flush(self.pin_get_inner(), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        AsyncWrite::poll_shutdown(self.pin_get_inner(), cx)
    }
}

impl AsyncRead for BluetoothStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        AsyncRead::poll_read(self.pin_get_inner(), cx, buf)
    }
}
