//! USB Device subsystem - presents a CDC-ACM serial port to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`. The host talks to the reader over the port using the
//! `SCAN TAG<n>` line protocol; the USB stack itself runs in its own task.

pub mod serial;
