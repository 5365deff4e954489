//! DOM access for the banner scanner: the [`Document`] seam, element probes,
//! shadow-piercing queries, and an in-memory page.

pub mod document;
pub mod memory;
pub mod probe;
pub mod query;
pub mod style;

pub use document::{
    ComputedStyle, Document, DomError, FrameContext, MutationKind, MutationRecord, NodeId, QueryRoot, Rect, Viewport,
};
pub use memory::{ClickEffect, ClickSupport, ElementSpec, MemoryDocument};
pub use probe::{
    HIGH_Z_INDEX, hide_element, has_high_z_index, has_scroll_lock, is_fixed, is_overlay, is_visible, restore_scroll,
    safe_click, z_index,
};
pub use query::deep_query_all;
