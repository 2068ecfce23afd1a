//! UDP endpoints, one socket per direction per channel
//!
//! The send side is a plain best-effort `send_to`. The receive side never
//! blocks: the socket is non-blocking, so an empty queue comes back as
//! [`Received::Empty`] straight away and the caller's tick is never stalled.

use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
};

use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Send-only endpoint with a fixed destination
#[derive(Debug)]
pub struct TxEndpoint {
    socket: UdpSocket,
    dest: SocketAddr,
}

impl TxEndpoint {
    pub fn bind(local: SocketAddr, dest: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).map_err(|source| Error::Bind {
            addr: local,
            source,
        })?;
        debug!(local = %socket.local_addr()?, %dest, "Bound send endpoint");
        Ok(Self { socket, dest })
    }

    /// Fire and forget. Loss is invisible here.
    pub fn send(&self, bytes: &[u8]) -> std::io::Result<usize> {
        let n = self.socket.send_to(bytes, self.dest)?;
        trace!(n, dest = %self.dest, "Sent datagram");
        Ok(n)
    }

    pub fn dest(&self) -> SocketAddr {
        self.dest
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Received<'a> {
    Datagram(&'a [u8]),
    Empty,
}

/// Receive-only endpoint that owns its datagram buffer
#[derive(Debug)]
pub struct RxEndpoint {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl RxEndpoint {
    /// `max_size` should be larger than any frame expected on this port, so a
    /// datagram that got truncated shows up as a length mismatch later on.
    pub fn bind(addr: SocketAddr, max_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| Error::Bind { addr, source })?;
        socket.set_nonblocking(true)?;
        debug!(local = %socket.local_addr()?, max_size, "Bound receive endpoint");
        Ok(Self {
            socket,
            buf: vec![0u8; max_size],
        })
    }

    pub fn try_receive(&mut self) -> std::io::Result<Received<'_>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, from)) => {
                trace!(n, %from, "Received datagram");
                Ok(Received::Datagram(&self.buf[..n]))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Received::Empty),
            Err(e) => Err(e),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
