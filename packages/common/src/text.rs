//! Offset/position conversions over document text.

use crate::span::Position;

/// Convert a byte offset to a 0-indexed line/character position.
///
/// Offsets past the end of `source` clamp to the final position.
pub fn offset_to_position(source: &str, offset: usize) -> Position {
    let mut line = 0;
    let mut character = 0;
    let mut byte_pos = 0;

    for ch in source.chars() {
        if byte_pos >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += 1;
        }
        byte_pos += ch.len_utf8();
    }

    Position::new(line, character)
}

/// Convert a 0-indexed line/character position to a byte offset.
///
/// Returns `source.len()` if the position is out of bounds.
pub fn position_to_offset(source: &str, position: Position) -> usize {
    let mut line = 0;
    let mut character = 0;
    let mut byte_pos = 0;

    for ch in source.chars() {
        if line == position.line && character == position.character {
            return byte_pos;
        }
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += 1;
        }
        byte_pos += ch.len_utf8();
    }

    source.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_position_single_line() {
        let pos = offset_to_position("hello world", 6);
        assert_eq!(pos, Position::new(0, 6));
    }

    #[test]
    fn test_offset_to_position_multi_line() {
        let pos = offset_to_position("ab\ncd\nef", 4);
        assert_eq!(pos, Position::new(1, 1));
    }

    #[test]
    fn test_offset_to_position_clamps_past_end() {
        let pos = offset_to_position("ab\ncd", 100);
        assert_eq!(pos, Position::new(1, 2));
    }

    #[test]
    fn test_position_to_offset_round_trips() {
        let source = "component A {\n  render div {}\n}";
        for offset in 0..source.len() {
            let pos = offset_to_position(source, offset);
            assert_eq!(position_to_offset(source, pos), offset);
        }
    }

    #[test]
    fn test_position_to_offset_out_of_bounds() {
        assert_eq!(position_to_offset("ab", Position::new(5, 0)), 2);
    }
}
