use crate::types::{Classification, ComfortBand};

/// Both bounds are inclusive: a value equal to floor or ceiling is within.
pub fn evaluate(value: f32, band: ComfortBand) -> Classification {
    if value < band.floor {
        Classification::Below
    } else if value > band.ceiling {
        Classification::Above
    } else {
        Classification::Within
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: ComfortBand = ComfortBand::new(61.0, 76.0);

    #[test]
    fn classifies_each_side() {
        assert_eq!(evaluate(55.0, BAND), Classification::Below);
        assert_eq!(evaluate(70.0, BAND), Classification::Within);
        assert_eq!(evaluate(80.5, BAND), Classification::Above);
    }

    #[test]
    fn boundaries_are_within() {
        assert_eq!(evaluate(61.0, BAND), Classification::Within);
        assert_eq!(evaluate(76.0, BAND), Classification::Within);
        assert_eq!(evaluate(60.999, BAND), Classification::Below);
        assert_eq!(evaluate(76.001, BAND), Classification::Above);
    }
}
