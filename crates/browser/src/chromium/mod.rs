mod consent;
mod document;
mod launcher;
mod wait;

pub use consent::ConsentOverride;
pub use document::ChromiumDocument;
pub use launcher::{ChromiumBrowser, OpenedPage};
pub use wait::{WaitStrategy, watch_mutations};
