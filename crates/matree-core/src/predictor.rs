//! Pixel predictor identifiers.
//!
//! The predictor formulae themselves live in the pixel pipeline; the tree
//! only ever names them. `Best` and `Variable` are configuration-time
//! placeholders ("try several") and must never appear on a serialized leaf.

use serde::{Deserialize, Serialize};

/// Number of real (non-synthetic) predictors.
pub const NUM_MODULAR_PREDICTORS: usize = 14;

/// Per-pixel prediction mode selectable by a tree leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predictor {
    Zero = 0,
    Left = 1,
    Top = 2,
    Average0 = 3,
    Select = 4,
    Gradient = 5,
    Weighted = 6,
    TopRight = 7,
    TopLeft = 8,
    LeftLeft = 9,
    Average1 = 10,
    Average2 = 11,
    Average3 = 12,
    Average4 = 13,
    /// Synthetic: train with `{Weighted, Gradient}` and keep the best.
    Best = 14,
    /// Synthetic: train with every real predictor.
    Variable = 15,
}

impl Predictor {
    /// All predictors in id order, synthetics last.
    pub const ALL: [Predictor; 16] = [
        Predictor::Zero,
        Predictor::Left,
        Predictor::Top,
        Predictor::Average0,
        Predictor::Select,
        Predictor::Gradient,
        Predictor::Weighted,
        Predictor::TopRight,
        Predictor::TopLeft,
        Predictor::LeftLeft,
        Predictor::Average1,
        Predictor::Average2,
        Predictor::Average3,
        Predictor::Average4,
        Predictor::Best,
        Predictor::Variable,
    ];

    /// Numeric id, as used on the wire.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Predictor> {
        Self::ALL.get(index).copied()
    }

    /// True for the configuration-time placeholders (`Best`, `Variable`).
    pub fn is_synthetic(self) -> bool {
        matches!(self, Predictor::Best | Predictor::Variable)
    }

    /// Lowercase name, as used in dataset column headers.
    pub fn name(self) -> &'static str {
        match self {
            Predictor::Zero => "zero",
            Predictor::Left => "left",
            Predictor::Top => "top",
            Predictor::Average0 => "average0",
            Predictor::Select => "select",
            Predictor::Gradient => "gradient",
            Predictor::Weighted => "weighted",
            Predictor::TopRight => "topright",
            Predictor::TopLeft => "topleft",
            Predictor::LeftLeft => "leftleft",
            Predictor::Average1 => "average1",
            Predictor::Average2 => "average2",
            Predictor::Average3 => "average3",
            Predictor::Average4 => "average4",
            Predictor::Best => "best",
            Predictor::Variable => "variable",
        }
    }
}

impl std::str::FromStr for Predictor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(Predictor::Zero),
            "left" => Ok(Predictor::Left),
            "top" => Ok(Predictor::Top),
            "average0" | "average" => Ok(Predictor::Average0),
            "select" => Ok(Predictor::Select),
            "gradient" => Ok(Predictor::Gradient),
            "weighted" => Ok(Predictor::Weighted),
            "topright" => Ok(Predictor::TopRight),
            "topleft" => Ok(Predictor::TopLeft),
            "leftleft" => Ok(Predictor::LeftLeft),
            "average1" => Ok(Predictor::Average1),
            "average2" => Ok(Predictor::Average2),
            "average3" => Ok(Predictor::Average3),
            "average4" => Ok(Predictor::Average4),
            "best" => Ok(Predictor::Best),
            "variable" => Ok(Predictor::Variable),
            other => Err(format!("unknown predictor '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        for (i, &p) in Predictor::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
            assert_eq!(Predictor::from_index(i), Some(p));
        }
        assert_eq!(Predictor::from_index(16), None);
    }

    #[test]
    fn synthetics() {
        assert!(Predictor::Best.is_synthetic());
        assert!(Predictor::Variable.is_synthetic());
        assert!(!Predictor::Weighted.is_synthetic());
        assert_eq!(NUM_MODULAR_PREDICTORS, Predictor::Best.index());
    }

    #[test]
    fn parse_names() {
        assert_eq!("gradient".parse::<Predictor>(), Ok(Predictor::Gradient));
        assert_eq!("Weighted".parse::<Predictor>(), Ok(Predictor::Weighted));
        assert!("nonsense".parse::<Predictor>().is_err());
    }

    #[test]
    fn names_roundtrip_through_parsing() {
        for &p in &Predictor::ALL {
            assert_eq!(p.name().parse::<Predictor>(), Ok(p));
        }
    }
}
