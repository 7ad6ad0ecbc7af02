use bytes::Bytes;
use grindvakt_protocols::LinkType;

/// One captured link-layer frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    pub link: LinkType,
}

impl Frame {
    /// Creates a new Frame from raw data.
    pub fn new(link: LinkType, data: impl Into<Bytes>) -> Self {
        Frame {
            data: data.into(),
            link,
        }
    }
}
