//! Real-time core of a PS/2 keyboard controller: matrix scanning with
//! debouncing, the two ring buffers that decouple scanning from the wire
//! protocol, the bit-banged PS/2 line engine, and the host command
//! processor.
//!
//! This crate is `no_std` in firmware builds and linked against `std` under
//! `cargo test`, so the core logic can be exercised on the host without any
//! hardware: `cfg_attr(not(test), no_std)` is the standard way to get both.
#![cfg_attr(not(test), no_std)]

pub mod command;
pub mod debounce;
pub mod hal;
pub mod keymap;
pub mod line_engine;
pub mod ringbuf;
pub mod scanner;

pub use command::CommandProcessor;
pub use debounce::KeyCell;
pub use hal::{ColumnPort, OpenDrainLine, RowStrobe};
pub use keymap::KeyMap;
pub use line_engine::LineEngine;
pub use ringbuf::RingBuffer;
pub use scanner::MatrixScanner;

/// Capacity of both the outbound (scan-code) and inbound (host-command) ring
/// buffers, in bytes. Fixed at 128 so a single index byte suffices, per the
/// ring buffer's data model.
pub const BUFFER_CAPACITY: usize = 128;

/// The outbound scan-code queue: scanner writes, line engine reads.
pub type OutBuffer = ringbuf::RingBuffer<BUFFER_CAPACITY>;
/// The inbound host-command queue: line engine writes, command processor
/// reads.
pub type InBuffer = ringbuf::RingBuffer<BUFFER_CAPACITY>;
