use std::fmt::Debug;

/// T values are primitive integers
pub trait PrimInt: ::num::PrimInt + Debug + Default {}
impl<T: ::num::PrimInt + Debug + Default> PrimInt for T {}

/// Ratio of two exact counts. Counts stay integers until this point, a zero denominator yields
/// `None` instead of NaN/inf.
pub fn ratio<N: ::num::ToPrimitive, D: ::num::ToPrimitive>(numerator: N, denominator: D) -> Option<f64> {
    let denominator = denominator.to_f64()?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator.to_f64()? / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(10_000u64, 1000u32), Some(10.0));
        assert_eq!(ratio(3u32, 10u32), Some(0.3));
        assert_eq!(ratio(0u32, 10u32), Some(0.0));
        assert_eq!(ratio(5u32, 0u32), None);
    }
}
