//! Bit-banged PS/2 line protocol, driven one half-bit-cell at a time by
//! [`LineEngine::tick`].
//!
//! A full bit period is two ticks: one with Clock driven low, one with it
//! released high. `tick_ix` tracks position within the 11-tick frame (start,
//! 8 data bits, parity, stop/ack); values past 11 are a one-tick gap before
//! arbitration runs again. This mirrors the reference engine's
//! `clockCount`/`clock` pair, made explicit as a tagged index plus a phase
//! enum so the re-entry paths after a host inhibit are easy to follow.

use crate::hal::OpenDrainLine;
use crate::{InBuffer, OutBuffer};

/// Which half of the current bit cell the engine is driving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockPhase {
    High,
    Low,
}

/// Which way the current (or next) frame is moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

/// Tick index past which a frame is done and a one-tick gap separates it
/// from the next arbitration.
const STOP_TICK: u8 = 11;

fn is_inhibited<C: OpenDrainLine>(clock: &C) -> bool {
    !clock.is_high()
}

/// The PS/2 line state machine. Holds every register that must survive
/// between calls to `tick`; owns no GPIO or buffer itself, so it can be
/// driven against host-side fakes in tests and real `stm32f1xx-hal` pins in
/// the firmware binary alike.
pub struct LineEngine {
    tick_ix: u8,
    clock_phase: ClockPhase,
    parity_ones: u8,
    shift: u8,
    direction: Direction,
}

impl LineEngine {
    /// An engine at power-on: idle, about to arbitrate.
    pub const fn new() -> Self {
        LineEngine {
            tick_ix: 0,
            clock_phase: ClockPhase::High,
            parity_ones: 0,
            shift: 0,
            direction: Direction::Send,
        }
    }

    /// True while idle at the start of arbitration (tick_ix == 0).
    pub fn is_idle(&self) -> bool {
        self.tick_ix == 0
    }

    /// Direction chosen by the most recent arbitration.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Advance the engine by one tick (one half of a bit cell).
    ///
    /// `skew` is called wherever the protocol requires the fixed
    /// data-to-clock setup/hold delay; in firmware this is a short
    /// `cortex_m::asm::delay`, in tests a no-op closure.
    pub fn tick<C, D>(
        &mut self,
        clock: &mut C,
        data: &mut D,
        out: &mut OutBuffer,
        inbound: &mut InBuffer,
        mut skew: impl FnMut(),
    ) where
        C: OpenDrainLine,
        D: OpenDrainLine,
    {
        match self.tick_ix {
            0 => self.arbitrate(clock, data),
            1 => self.frame_start(clock, data, out, &mut skew),
            2..=9 => self.data_bit(clock, data, &mut skew),
            10 => self.parity(clock, data, out, inbound, &mut skew),
            STOP_TICK => self.stop_ack(clock, data, out, &mut skew),
            _ => self.tick_ix = 0,
        }
    }

    fn arbitrate<C: OpenDrainLine, D: OpenDrainLine>(&mut self, clock: &mut C, data: &mut D) {
        if is_inhibited(clock) {
            // Host-held inhibit: note which way a pending request points,
            // but stay put until the host releases Clock.
            self.direction = if data.is_high() {
                Direction::Send
            } else {
                Direction::Recv
            };
            return;
        }
        self.direction = if data.is_high() {
            Direction::Send
        } else {
            Direction::Recv
        };
        self.tick_ix = 1;
        self.clock_phase = ClockPhase::High;
    }

    fn frame_start<C: OpenDrainLine, D: OpenDrainLine>(
        &mut self,
        clock: &mut C,
        data: &mut D,
        out: &mut OutBuffer,
        skew: &mut impl FnMut(),
    ) {
        match self.clock_phase {
            ClockPhase::High => {
                if self.direction == Direction::Send {
                    if is_inhibited(clock) {
                        data.release();
                        self.tick_ix = 0;
                        return;
                    }
                    match out.peek() {
                        None => {
                            self.tick_ix = 0;
                            return;
                        }
                        Some(byte) => {
                            self.shift = byte;
                            self.parity_ones = 0;
                            data.drive_low();
                        }
                    }
                } else {
                    self.shift = 0;
                    self.parity_ones = 0;
                }
                skew();
                clock.drive_low();
                self.clock_phase = ClockPhase::Low;
            }
            ClockPhase::Low => {
                skew();
                clock.release();
                self.clock_phase = ClockPhase::High;
                self.tick_ix = 2;
            }
        }
    }

    fn data_bit<C: OpenDrainLine, D: OpenDrainLine>(
        &mut self,
        clock: &mut C,
        data: &mut D,
        skew: &mut impl FnMut(),
    ) {
        match self.clock_phase {
            ClockPhase::High => {
                if self.direction == Direction::Send {
                    if is_inhibited(clock) {
                        data.release();
                        self.tick_ix = 0;
                        return;
                    }
                    if self.shift & 1 == 1 {
                        self.parity_ones += 1;
                        data.release();
                    } else {
                        data.drive_low();
                    }
                    self.shift >>= 1;
                } else {
                    let bit_high = data.is_high();
                    if bit_high {
                        self.parity_ones += 1;
                    }
                    self.shift = (self.shift >> 1) | if bit_high { 0x80 } else { 0 };
                }
                skew();
                clock.drive_low();
                self.clock_phase = ClockPhase::Low;
            }
            ClockPhase::Low => {
                skew();
                clock.release();
                self.clock_phase = ClockPhase::High;
                self.tick_ix += 1;
            }
        }
    }

    fn parity<C: OpenDrainLine, D: OpenDrainLine>(
        &mut self,
        clock: &mut C,
        data: &mut D,
        out: &mut OutBuffer,
        inbound: &mut InBuffer,
        skew: &mut impl FnMut(),
    ) {
        match self.clock_phase {
            ClockPhase::High => {
                if self.direction == Direction::Send {
                    if is_inhibited(clock) {
                        data.release();
                        self.tick_ix = 0;
                        return;
                    }
                    // Odd parity: the bit makes data-ones + parity-bit odd.
                    if self.parity_ones % 2 == 0 {
                        data.release();
                    } else {
                        data.drive_low();
                    }
                } else {
                    let parity_bit = data.is_high();
                    let total_ones = self.parity_ones + u8::from(parity_bit);
                    if total_ones % 2 == 1 {
                        // Accepting a host byte supersedes any stale
                        // outbound content per PS/2 convention.
                        out.clear();
                        inbound.push(self.shift);
                    }
                    // Invalid parity: drop the byte silently, no signal.
                }
                skew();
                clock.drive_low();
                self.clock_phase = ClockPhase::Low;
            }
            ClockPhase::Low => {
                skew();
                clock.release();
                self.clock_phase = ClockPhase::High;
                self.tick_ix = STOP_TICK;
            }
        }
    }

    fn stop_ack<C: OpenDrainLine, D: OpenDrainLine>(
        &mut self,
        clock: &mut C,
        data: &mut D,
        out: &mut OutBuffer,
        skew: &mut impl FnMut(),
    ) {
        match self.clock_phase {
            ClockPhase::High => {
                if self.direction == Direction::Send {
                    data.release();
                } else {
                    data.drive_low();
                }
                skew();
                clock.drive_low();
                self.clock_phase = ClockPhase::Low;
            }
            ClockPhase::Low => {
                skew();
                clock.release();
                data.release();
                if self.direction == Direction::Send {
                    // Commit point: only now is the byte actually gone
                    // from the outbound queue.
                    out.pop();
                }
                self.clock_phase = ClockPhase::High;
                self.tick_ix += 1;
            }
        }
    }
}

impl Default for LineEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Wire {
        device_low: bool,
        host_low: bool,
    }

    impl Wire {
        fn is_high(&self) -> bool {
            !self.device_low && !self.host_low
        }
    }

    struct DeviceLine<'a>(&'a mut Wire);

    impl<'a> OpenDrainLine for DeviceLine<'a> {
        fn drive_low(&mut self) {
            self.0.device_low = true;
        }
        fn release(&mut self) {
            self.0.device_low = false;
        }
        fn is_high(&self) -> bool {
            self.0.is_high()
        }
    }

    fn frames() -> (Wire, Wire) {
        (Wire::default(), Wire::default())
    }

    #[test]
    fn idle_bus_arbitrates_to_send() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut clock = DeviceLine(&mut clock_wire);
        let mut data = DeviceLine(&mut data_wire);
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();

        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        assert_eq!(engine.direction(), Direction::Send);
        assert!(!engine.is_idle());
    }

    #[test]
    fn sends_queued_byte_with_odd_parity_and_commits_on_stop() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();
        out.push(0x16); // 0b0001_0110, three one-bits

        {
            let mut clock = DeviceLine(&mut clock_wire);
            let mut data = DeviceLine(&mut data_wire);

            // tick_ix 0: arbitration, idle bus -> SEND.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            assert_eq!(engine.direction(), Direction::Send);

            // tick_ix 1 high half: start bit (0) driven.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            assert!(!data.is_high());
            // low half.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});

            let mut bits = std::vec::Vec::new();
            for _ in 0..8 {
                engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
                bits.push(data.is_high());
                engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            }
            let mut byte = 0u8;
            for (i, bit) in bits.iter().enumerate() {
                if *bit {
                    byte |= 1 << i;
                }
            }
            assert_eq!(byte, 0x16);

            // Parity tick: reconstruct total parity across data + parity bit.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            let parity_bit = data.is_high();
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            assert_eq!((byte.count_ones() + parity_bit as u32) % 2, 1);

            // Stop tick: high half releases Data (stop bit, idle high); the
            // byte is not yet gone from the outbound queue.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            assert!(data.is_high());
        }
        assert_eq!(out.peek(), Some(0x16));

        {
            let mut clock = DeviceLine(&mut clock_wire);
            let mut data = DeviceLine(&mut data_wire);
            // Stop tick low half: commit point.
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        }
        assert_eq!(out.peek(), None);
    }

    #[test]
    fn host_inhibit_mid_frame_aborts_without_consuming_byte() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();
        out.push(0x16);

        let mut clock = DeviceLine(&mut clock_wire);
        let mut data = DeviceLine(&mut data_wire);

        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // arbitrate
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start low
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit0 high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit0 low
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit1 high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit1 low

        // Host pulls Clock low right before bit2's high half.
        clock_wire.host_low = true;
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});

        assert!(engine.is_idle());
        assert!(data.is_high(), "Data released on abort");
        assert_eq!(out.peek(), Some(0x16), "byte stays queued for retry");
    }

    #[test]
    fn host_inhibit_during_stop_bit_still_completes_and_commits() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();
        out.push(0x16);

        let mut clock = DeviceLine(&mut clock_wire);
        let mut data = DeviceLine(&mut data_wire);

        // Walk the engine through arbitration, frame start, all eight data
        // bits, and parity without any inhibit.
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // arbitrate
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start low
        for _ in 0..8 {
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit high
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // bit low
        }
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // parity high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // parity low

        // Host asserts inhibit exactly between the parity bit and the stop
        // bit, i.e. during tick_ix = 11's high half.
        clock_wire.host_low = true;
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // stop high
        assert!(data.is_high(), "stop bit still driven despite host inhibit");
        assert_eq!(out.peek(), Some(0x16), "not committed before the stop low half");

        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // stop low
        assert_eq!(
            out.peek(),
            None,
            "stop half completes and the byte commits despite the inhibit"
        );

        // Gap tick, then arbitration resumes.
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        assert!(engine.is_idle());
    }

    #[test]
    fn parity_failed_receive_drops_byte_and_preserves_outbound() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();
        out.push(0x99); // pre-existing outbound content must survive

        let mut clock = DeviceLine(&mut clock_wire);
        let mut data = DeviceLine(&mut data_wire);

        // Host requests to send: Data held low while Clock is released.
        data_wire.host_low = true;
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        assert_eq!(engine.direction(), Direction::Recv);
        data_wire.host_low = false;

        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start high
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {}); // start low

        // Host clocks out 0xFF (all ones), eight data bits, LSB first.
        for _ in 0..8 {
            data_wire.host_low = false; // bit = 1 (released)
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        }

        // Parity bit chosen to make the total even (invalid for odd parity).
        data_wire.host_low = true; // parity bit = 0
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});

        assert_eq!(inbound.peek(), None, "invalid parity: nothing enqueued");
        assert_eq!(out.peek(), Some(0x99), "out_clear only runs on valid parity");
    }

    #[test]
    fn parity_valid_receive_clears_outbound_and_enqueues_inbound() {
        let (mut clock_wire, mut data_wire) = frames();
        let mut engine = LineEngine::new();
        let mut out = OutBuffer::new();
        let mut inbound = InBuffer::new();
        out.push(0xAA); // stale outbound content, must be cleared on accept

        let mut clock = DeviceLine(&mut clock_wire);
        let mut data = DeviceLine(&mut data_wire);

        data_wire.host_low = true;
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        data_wire.host_low = false;
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});

        // 0xFF data bits (all released/high), valid odd parity needs a
        // parity bit of 1 on top of eight one-bits (already odd, so parity
        // bit must be 0 to keep the total odd at nine... eight ones is even,
        // so the parity bit must be 1 to make the total nine, which is odd).
        for _ in 0..8 {
            data_wire.host_low = false;
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
            engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        }
        data_wire.host_low = false; // parity bit = 1, total ones = 9 (odd)
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});
        engine.tick(&mut clock, &mut data, &mut out, &mut inbound, || {});

        assert_eq!(out.peek(), None, "out_clear ran on accept");
        assert_eq!(inbound.peek(), Some(0xFF));
    }
}
