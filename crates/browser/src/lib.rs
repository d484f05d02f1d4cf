//! Browser automation over the Chrome DevTools Protocol.
//!
//! [`ChromeLauncher`] starts Chrome/Edge against a persistent profile and
//! hands back a [`BrowserHandle`] whose page implements [`PageDriver`].

pub mod cdp;
pub mod driver;
pub mod keys;
pub mod launcher;
pub mod page;

pub use driver::{BrowserHandle, BrowserLauncher, LaunchOptions, PageDriver, Probe, ProbePick, ProbeRead, RowRecord};
pub use launcher::{BrowserEngine, ChromeLauncher};
