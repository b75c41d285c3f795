use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary ground-truth class of a clip or sequence.
///
/// The numeric value is the training target: `Normal = 0`, `Fall = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FallLabel {
    Normal,
    Fall,
}

impl FallLabel {
    pub const ALL: [FallLabel; 2] = [FallLabel::Normal, FallLabel::Fall];

    /// Directory / display name, matching the `data/raw/<Class>` layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            FallLabel::Normal => "Normal",
            FallLabel::Fall => "Fall",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            FallLabel::Normal => 0,
            FallLabel::Fall => 1,
        }
    }

    pub fn target(&self) -> f32 {
        self.index() as f32
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(FallLabel::Normal),
            1 => Some(FallLabel::Fall),
            _ => None,
        }
    }
}

impl fmt::Display for FallLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown class label {:?} (expected Normal or Fall)", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for FallLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Normal" | "normal" | "adl" | "ADL" => Ok(FallLabel::Normal),
            "Fall" | "fall" => Ok(FallLabel::Fall),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directory_names() {
        assert_eq!("Fall".parse::<FallLabel>().unwrap(), FallLabel::Fall);
        assert_eq!("adl".parse::<FallLabel>().unwrap(), FallLabel::Normal);
        assert!("Sitting".parse::<FallLabel>().is_err());
    }

    #[test]
    fn index_round_trips() {
        for label in FallLabel::ALL {
            assert_eq!(FallLabel::from_index(label.index()), Some(label));
        }
        assert_eq!(FallLabel::Fall.target(), 1.0);
    }
}
