//! Hardware contracts the core logic is written against.
//!
//! Every trait here is small and specific to the one thing its caller needs,
//! rather than reaching for `embedded-hal`'s general `InputPin`/`OutputPin`
//! directly. That keeps `MatrixScanner` and `LineEngine` testable on the
//! host against plain in-memory fakes, with the real `stm32f1xx-hal` GPIO
//! types wired in only at the firmware binary's edge.

/// One open-collector (open-drain) signal line: either the PS/2 Clock or
/// Data wire.
///
/// PS/2 lines are never driven high by either side; "releasing" a line lets
/// the shared pull-up bring it high, and both host and device can read it
/// regardless of who, if anyone, is pulling it low. On real hardware a pin
/// configured once as `Output<OpenDrain>` implements this directly: driving
/// it high is electrically the same as releasing it, and the same pin can
/// still be read back.
pub trait OpenDrainLine {
    /// Pull the line low.
    fn drive_low(&mut self);

    /// Stop driving the line, letting the pull-up take it high.
    fn release(&mut self);

    /// Current electrical level: `true` = high, `false` = low.
    fn is_high(&self) -> bool;
}

/// Drives one row of the key matrix during a scan pass.
pub trait RowStrobe {
    /// Number of rows this strobe can address.
    const ROWS: usize;

    /// Assert (pull active-low) exactly one row, deasserting all others.
    fn select(&mut self, row: usize);

    /// Deassert every row. Used between scan passes and while idle.
    fn deselect_all(&mut self);
}

/// Reads the column lines for whichever row is currently strobed.
pub trait ColumnPort {
    /// Number of columns this port can sample.
    const COLS: usize;

    /// Sample column `col`. `true` means the switch is open (not pressed),
    /// matching the active-low wiring convention used throughout the
    /// debounce and scanning logic.
    fn sample(&self, col: usize) -> bool;
}

/// Any `embedded-hal` pin that is simultaneously an `OutputPin` and an
/// `InputPin` (true of an `Output<OpenDrain>` pin on `stm32f1xx-hal`)
/// already satisfies `OpenDrainLine`. This is what lets the firmware binary
/// hand real GPIO pins straight to `LineEngine::tick` with no adapter type.
impl<P> OpenDrainLine for P
where
    P: embedded_hal::digital::v2::OutputPin + embedded_hal::digital::v2::InputPin,
{
    fn drive_low(&mut self) {
        let _ = embedded_hal::digital::v2::OutputPin::set_low(self);
    }

    fn release(&mut self) {
        let _ = embedded_hal::digital::v2::OutputPin::set_high(self);
    }

    fn is_high(&self) -> bool {
        embedded_hal::digital::v2::InputPin::is_high(self).unwrap_or(false)
    }
}
