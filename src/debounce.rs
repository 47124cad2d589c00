//! Per-cell debouncing of the 8x8 matrix.
//!
//! Each matrix intersection gets one [`KeyCell`]. The algorithm favors the
//! first observed edge over chatter that follows it (see the module-level
//! note in [`KeyCell::sample`]), which is adequate for mechanical switches
//! and deliberately *not* the same as "wait for the signal to go quiet."

/// Number of confirming scan passes required before a candidate transition
/// commits.
pub const DEBOUNCE_TICKS: u8 = 20;

/// The debounce state of a single matrix cell.
///
/// `released` mirrors the cell's last-committed logical state (`true` =
/// open / not pressed). `debounce` is `0` when stable, and countsdown from
/// `DEBOUNCE_TICKS` while a candidate flip is being validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyCell {
    released: bool,
    debounce: u8,
}

/// What a confirmed transition produced, before keymap lookup turns it into
/// bytes on the wire. Returned by [`KeyCell::sample`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The key just went from open to closed.
    Pressed,
    /// The key just went from closed to open.
    Released,
}

impl KeyCell {
    /// A cell that starts out released and stable.
    pub const fn new() -> Self {
        KeyCell {
            released: true,
            debounce: 0,
        }
    }

    /// Current committed state: `true` if the cell reads as open.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Feed one freshly sampled level (`true` = released) through the
    /// debounce state machine. Returns `Some(transition)` the one pass a
    /// candidate flip is confirmed, `None` otherwise.
    ///
    /// The three-way branch on `debounce` implements the arm/confirm rule
    /// exactly:
    ///
    /// - `debounce > 1`: just counting down, no comparison is made.
    /// - `debounce == 1`: countdown has reached its last pass. The flip that
    ///   was armed when `released` last changed is committed here
    ///   unconditionally — even if the very latest sample now disagrees with
    ///   `released` again, since the only thing this branch compares is
    ///   whether the *current* sample agrees with the level armed 20 passes
    ///   ago. This is the "believe the first edge" behavior called out in
    ///   the design notes: do not add a re-arm path here.
    /// - `debounce == 0`: stable. A disagreeing sample arms a new candidate
    ///   flip.
    pub fn sample(&mut self, level: bool) -> Option<Transition> {
        if self.debounce > 1 {
            self.debounce -= 1;
            None
        } else if self.debounce == 1 {
            self.debounce = 0;
            if level == self.released {
                Some(if self.released {
                    Transition::Pressed
                } else {
                    Transition::Released
                })
            } else {
                None
            }
        } else if level != self.released {
            self.released = level;
            self.debounce = DEBOUNCE_TICKS;
            None
        } else {
            None
        }
    }
}

impl Default for KeyCell {
    fn default() -> Self {
        Self::new()
    }
}
