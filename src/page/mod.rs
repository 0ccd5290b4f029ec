//! Host page abstraction
//!
//! The crawler never talks to a browser directly. It opens pages through a
//! [`PageDriver`] and reads them through [`HostPage`]: a rendered DOM snapshot,
//! clicks addressed by [`ClickTarget`], overlay dismissal and close.
//!
//! The Chrome DevTools backend lives behind the `chrome` feature.

#[cfg(feature = "chrome")]
mod chrome;
mod traits;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeDriver, ChromePage};
pub use traits::{ClickTarget, HostPage, OverlayTargets, PageDriver, PageError, PageResult};
