//! Keypad matrix decoding
//!
//! The button driver reports matrix keys as a packed id: row in bits 0..7,
//! column in bits 7..14.

pub const KEYPAD_ROWS: usize = 4;
pub const KEYPAD_COLUMNS: usize = 3;

const KEY_ID_ROW_MASK: u16 = 0x007F;
const KEY_ID_COLUMN_MASK: u16 = 0x3F80;
const KEY_ID_COLUMN_SHIFT: u16 = 7;

pub const KEYPAD_MAP: [[char; KEYPAD_COLUMNS]; KEYPAD_ROWS] = [
    ['1', '2', '3'],
    ['4', '5', '6'],
    ['7', '8', '9'],
    ['*', '0', '#'],
];

/// A debounced edge from the button driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_id: u16,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn pressed(key_id: u16) -> Self {
        Self {
            key_id,
            pressed: true,
        }
    }

    pub fn released(key_id: u16) -> Self {
        Self {
            key_id,
            pressed: false,
        }
    }

    pub fn position(&self) -> KeyPosition {
        KeyPosition {
            row: (self.key_id & KEY_ID_ROW_MASK) as u8,
            column: ((self.key_id & KEY_ID_COLUMN_MASK) >> KEY_ID_COLUMN_SHIFT) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPosition {
    pub row: u8,
    pub column: u8,
}

impl KeyPosition {
    /// Packs a position back into a driver key id
    pub fn key_id(&self) -> u16 {
        (self.row as u16 & KEY_ID_ROW_MASK)
            | (((self.column as u16) << KEY_ID_COLUMN_SHIFT) & KEY_ID_COLUMN_MASK)
    }

    /// The character printed on the key, if the position exists
    pub fn character(&self) -> Option<char> {
        KEYPAD_MAP
            .get(self.row as usize)
            .and_then(|row| row.get(self.column as usize))
            .copied()
    }
}

/// Finds the key id for a printed character
pub fn key_id_for(ch: char) -> Option<u16> {
    KEYPAD_MAP.iter().enumerate().find_map(|(row, keys)| {
        keys.iter().position(|&k| k == ch).map(|column| {
            KeyPosition {
                row: row as u8,
                column: column as u8,
            }
            .key_id()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_positions() {
        let evt = KeyEvent::pressed(0x0000);
        assert_eq!(evt.position(), KeyPosition { row: 0, column: 0 });
        assert_eq!(evt.position().character(), Some('1'));

        // row 3, column 2
        let evt = KeyEvent::pressed(3 | (2 << 7));
        assert_eq!(evt.position(), KeyPosition { row: 3, column: 2 });
        assert_eq!(evt.position().character(), Some('#'));

        // row 3, column 1
        assert_eq!(KeyEvent::pressed(0x0083).position().character(), Some('0'));
    }

    #[test]
    fn test_out_of_range_position() {
        assert_eq!(KeyEvent::pressed(4).position().character(), None);
        assert_eq!(KeyEvent::pressed(3 << 7).position().character(), None);
    }

    #[test]
    fn test_key_id_lookup() {
        for row in KEYPAD_MAP.iter() {
            for &ch in row.iter() {
                let id = key_id_for(ch).unwrap();
                assert_eq!(KeyEvent::pressed(id).position().character(), Some(ch));
            }
        }
        assert_eq!(key_id_for('A'), None);
    }
}
