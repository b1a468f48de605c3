use rust_decimal::{Decimal, MathematicalOps};

/// Arithmetic mean; `None` for an empty slice or on overflow.
pub(crate) fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
}

/// Population standard deviation (divides by `n`); needs at least two samples.
pub(crate) fn population_std(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares = values.iter().try_fold(Decimal::ZERO, |acc, v| {
        let d = v.checked_sub(mean)?;
        acc.checked_add(d.checked_mul(d)?)
    })?;
    squares.checked_div(Decimal::from(values.len()))?.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn known_series() {
        let v = [dec!(100), dec!(110), dec!(90)];
        assert_eq!(mean(&v), Some(dec!(100)));

        let std = population_std(&v).unwrap();
        assert!((std - dec!(8.1649658)).abs() < dec!(0.0000001), "{std}");
    }

    #[test]
    fn small_samples() {
        assert_eq!(mean(&[]), None);
        assert_eq!(population_std(&[]), None);
        assert_eq!(mean(&[dec!(42.5)]), Some(dec!(42.5)));
        assert_eq!(population_std(&[dec!(42.5)]), None);
    }

    #[test]
    fn constant_series_has_zero_spread() {
        let v = [dec!(7.25); 5];
        assert_eq!(population_std(&v), Some(Decimal::ZERO));
    }

    fn prices() -> impl Strategy<Value = Vec<Decimal>> {
        prop::collection::vec(1i64..10_000_000, 2..60)
            .prop_map(|cents| cents.into_iter().map(|c| Decimal::new(c, 2)).collect())
    }

    proptest! {
        #[test]
        fn mean_lies_within_range(v in prices()) {
            let m = mean(&v).unwrap();
            let lo = v.iter().min().copied().unwrap();
            let hi = v.iter().max().copied().unwrap();
            prop_assert!(m >= lo && m <= hi);
        }

        #[test]
        fn std_is_non_negative_and_bounded(v in prices()) {
            let s = population_std(&v).unwrap();
            let lo = v.iter().min().copied().unwrap();
            let hi = v.iter().max().copied().unwrap();
            prop_assert!(s >= Decimal::ZERO);
            prop_assert!(s <= hi - lo);
        }

        #[test]
        fn shifting_series_keeps_std(v in prices(), shift in 0i64..1_000) {
            let shifted: Vec<_> = v.iter().map(|x| *x + Decimal::from(shift)).collect();
            let a = population_std(&v).unwrap();
            let b = population_std(&shifted).unwrap();
            prop_assert!((a - b).abs() < dec!(0.000001), "{} vs {}", a, b);
        }
    }
}
