use std::{fmt, str::FromStr};

use crate::error::Error;

/// A board square, zero based: `file` 0 is the a-file, `rank` 0 is the first rank.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Square {
    pub file: u8,
    pub rank: u8,
}

impl Square {
    pub const fn new(file: u8, rank: u8) -> Self {
        Square { file, rank }
    }

    pub fn is_on_board(self) -> bool {
        self.file < 8 && self.rank < 8
    }

    /// The file letter, `'?'` when off the board.
    pub fn file_char(self) -> char {
        if self.file < 8 {
            (b'a' + self.file) as char
        } else {
            '?'
        }
    }

    /// The rank as printed on the board, 1 through 8.
    pub fn rank_number(self) -> u32 {
        self.rank as u32 + 1
    }

    /// Same rank, different file.
    pub fn with_file(self, file: u8) -> Self {
        Square { file, ..self }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_on_board() {
            write!(f, "{}{}", self.file_char(), self.rank_number())
        } else {
            write!(f, "({}, {})", self.file, self.rank)
        }
    }
}

impl FromStr for Square {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sq = shakmaty::Square::from_ascii(s.to_ascii_lowercase().as_bytes())
            .map_err(|_| Error::InvalidSquare(s.to_owned()))?;
        Ok(sq.into())
    }
}

impl From<shakmaty::Square> for Square {
    fn from(sq: shakmaty::Square) -> Self {
        Square::new(u32::from(sq.file()) as u8, u32::from(sq.rank()) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_algebraic_names() {
        assert_eq!("a1".parse::<Square>().unwrap(), Square::new(0, 0));
        assert_eq!("e2".parse::<Square>().unwrap(), Square::new(4, 1));
        assert_eq!("H8".parse::<Square>().unwrap(), Square::new(7, 7));
    }

    #[test]
    fn rejects_squares_off_the_board() {
        for name in ["i1", "a9", "a0", "e", "e22", ""] {
            assert!(
                matches!(name.parse::<Square>(), Err(Error::InvalidSquare(_))),
                "{name} should not parse"
            );
        }
    }

    #[test]
    fn displays_lowercase() {
        assert_eq!(Square::new(4, 3).to_string(), "e4");
        assert_eq!(Square::new(9, 0).to_string(), "(9, 0)");
    }
}
