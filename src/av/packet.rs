use bytes::BytesMut;

/// Packet flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// The packet starts a decodable unit (random access point)
    pub keyframe: bool,
    /// The demuxer detected damage (continuity gap, truncated payload)
    pub corrupt: bool,
}

/// A chunk of compressed bytes belonging to one stream.
///
/// A packet is allocated once and refilled by the cursor on every read.
/// [`Packet::unref`] must be called between reads; it drops the payload but
/// keeps the allocation so the next read can reuse it.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub(crate) data: BytesMut,
    /// Index of the stream in the container session
    pub stream_index: usize,
    /// Presentation timestamp in stream time base units
    pub pts: Option<i64>,
    /// Decode timestamp in stream time base units
    pub dts: Option<i64>,
    /// Duration in stream time base units
    pub duration: Option<i64>,
    /// Keyframe and corruption markers
    pub flags: PacketFlags,
    /// Byte offset of the packet in the container, when known
    pub pos: Option<u64>,
}

impl Packet {
    /// Creates an empty packet ready to be filled by a cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty packet with preallocated payload capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Creates a packet holding `data`.
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            data: BytesMut::from(data),
            ..Self::default()
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the decode timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the owning stream.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Marks the packet as a keyframe or not.
    pub fn with_key_flag(mut self, keyframe: bool) -> Self {
        self.flags.keyframe = keyframe;
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the packet holds no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated payload capacity, kept across [`Packet::unref`].
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Returns true if the packet carries neither payload nor timing.
    pub fn is_unreferenced(&self) -> bool {
        self.data.is_empty() && self.pts.is_none() && self.dts.is_none()
    }

    /// Drops the payload and resets every field, keeping the allocation.
    pub fn unref(&mut self) {
        self.data.clear();
        self.stream_index = 0;
        self.pts = None;
        self.dts = None;
        self.duration = None;
        self.flags = PacketFlags::default();
        self.pos = None;
    }

    /// Payload buffer for demuxers to fill.
    pub(crate) fn payload_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Copies every field of `other` into this packet, reusing its allocation.
    pub(crate) fn fill_from(&mut self, other: &Packet) {
        self.data.clear();
        self.data.extend_from_slice(&other.data);
        self.stream_index = other.stream_index;
        self.pts = other.pts;
        self.dts = other.dts;
        self.duration = other.duration;
        self.flags = other.flags;
        self.pos = other.pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unref_keeps_capacity() {
        let mut pkt = Packet::with_capacity(4096).with_pts(10).with_stream_index(3);
        pkt.payload_mut().extend_from_slice(&[1, 2, 3]);
        assert!(!pkt.is_unreferenced());

        let capacity = pkt.capacity();
        pkt.unref();
        assert!(pkt.is_unreferenced());
        assert_eq!(pkt.stream_index, 0);
        assert_eq!(pkt.capacity(), capacity);
    }

    #[test]
    fn test_builder() {
        let pkt = Packet::from_data(&[9; 4])
            .with_dts(1)
            .with_duration(2)
            .with_key_flag(true);
        assert_eq!(pkt.len(), 4);
        assert_eq!(pkt.dts, Some(1));
        assert_eq!(pkt.duration, Some(2));
        assert!(pkt.flags.keyframe);
    }

    #[test]
    fn test_fill_from_copies_fields() {
        let src = Packet::from_data(b"abc").with_pts(5).with_stream_index(1);
        let mut dst = Packet::new();
        dst.fill_from(&src);
        assert_eq!(dst.data(), b"abc");
        assert_eq!(dst.pts, Some(5));
        assert_eq!(dst.stream_index, 1);
    }
}
