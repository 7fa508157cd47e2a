use super::{ContainerSession, ReadStatus};
use crate::av::Packet;
use crate::Result;

/// Sequential packet access to a [`ContainerSession`].
///
/// Packets come back in container order, interleaved across streams. The
/// caller owns the [`Packet`] and must [`unref`](Packet::unref) it before the
/// next call, which lets the payload allocation be reused.
pub struct PacketCursor<'a> {
    session: &'a mut ContainerSession,
}

impl<'a> PacketCursor<'a> {
    pub(crate) fn new(session: &'a mut ContainerSession) -> Self {
        Self { session }
    }

    /// Fills `packet` with the next packet.
    ///
    /// Fails with a contract violation when `packet` still holds data, after
    /// `EndOfStream` was returned, or when the session is closed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, packet: &mut Packet) -> Result<ReadStatus> {
        self.session.read_next(packet)
    }

    /// The session being read.
    pub fn session(&self) -> &ContainerSession {
        self.session
    }
}
