//! IAB TCF v2.2 reject-all consent: the core-segment encoder, a decoder, the
//! `__tcfapi` interceptor and its installation into a page.

pub mod bits;
pub mod decode;
pub mod encoder;
pub mod error;
pub mod locator;
pub mod payload;
pub mod shim;
pub mod window;

pub use decode::{CoreSegment, VendorSection, decode_core};
pub use encoder::{encode_reject_all, encode_reject_all_at, layout, now_deciseconds};
pub use error::TcfError;
pub use locator::{FrameInfo, frames_in, has_locator_frame};
pub use payload::{DeniedMap, EventStatus, PingResponse, TcData, TcfResponse, VendorList};
pub use shim::{
    ConsentApi, ConsentHost, DataLayerGuard, OverrideMarker, QueuedCall, ShimOutcome, ShimTarget, TcfCallback,
    TcfCommand, TcfShim,
};
pub use window::MemoryWindow;
