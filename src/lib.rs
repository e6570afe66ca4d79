//! edgegpio manages general-purpose I/O pins: exclusive opening and closing,
//! drive mode configuration, synchronous reads and writes, and edge-triggered
//! change notifications delivered through callbacks or a blocking wait.
//!
//! The physical line access is provided by a pluggable [`Backend`]. A
//! simulated backend is always available, and a `/sys/class/gpio` backend is
//! included on Linux.
//!
//! The library can be used in conjunction with a variety of platform-agnostic
//! drivers through its `embedded-hal` trait implementations. Both `embedded-hal`
//! v0.2.7 and v1.0 are supported through the optional `hal` feature. The unproven
//! `embedded-hal` v0.2.7 traits are enabled with `hal-unproven`.
//!
//! [`Backend`]: gpio/trait.Backend.html

// Used by rustdoc to link other crates to edgegpio's docs
#![doc(html_root_url = "https://docs.rs/edgegpio/0.1.0")]

#[cfg(target_os = "linux")]
#[macro_use]
mod macros;

pub mod gpio;
