//! 8x8 matrix scan pass: strobe rows, sample columns, debounce, and push
//! scan-code bytes for confirmed transitions.

use crate::debounce::{KeyCell, Transition};
use crate::keymap::{is_extended, KeyMap, BREAK_PREFIX, EXTENDED_PREFIX};
use crate::hal::{ColumnPort, RowStrobe};

/// Owns the 64 per-cell debounce states and the keymap for one board, and
/// runs one full scan pass on demand.
///
/// Generic over the row-strobe and column-port HAL traits so the scan loop
/// can run against either real GPIO or an in-memory fake in tests.
pub struct MatrixScanner {
    keymap: KeyMap,
    cells: [[KeyCell; 8]; 8],
}

impl MatrixScanner {
    /// A scanner over `keymap` with every cell starting released and
    /// stable.
    pub const fn new(keymap: KeyMap) -> Self {
        MatrixScanner {
            keymap,
            cells: [[KeyCell::new(); 8]; 8],
        }
    }

    /// Strobe every row in turn, sample its columns, debounce each cell,
    /// and push the Set 2 byte sequence for any confirmed transition via
    /// `emit`. One call is one complete scan pass.
    pub fn scan<R, C>(&mut self, rows: &mut R, cols: &C, mut emit: impl FnMut(u8))
    where
        R: RowStrobe,
        C: ColumnPort,
    {
        for row in 0..8 {
            rows.select(row);
            for col in 0..8 {
                let level = cols.sample(col);
                if let Some(transition) = self.cells[row][col].sample(level) {
                    self.push_transition(row, col, transition, &mut emit);
                }
            }
        }
        rows.deselect_all();
    }

    fn push_transition(
        &self,
        row: usize,
        col: usize,
        transition: Transition,
        emit: &mut impl FnMut(u8),
    ) {
        let code = self.keymap.code_at(row, col);
        if code == 0x00 {
            return;
        }
        if is_extended(code) {
            emit(EXTENDED_PREFIX);
        }
        if let Transition::Released = transition {
            emit(BREAK_PREFIX);
        }
        emit(code);
    }
}
