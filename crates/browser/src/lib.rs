//! Chromium backend: a live page as a [`unbanner_dom::Document`], plus the
//! consent override injected ahead of the page's own scripts.

pub mod chromium;
pub mod shared;

pub use chromium::{ChromiumBrowser, ChromiumDocument, ConsentOverride, OpenedPage, WaitStrategy, watch_mutations};
pub use shared::{LaunchOptions, TimeoutConfig};
