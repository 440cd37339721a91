use std::collections::HashMap;
use std::sync::OnceLock;

static LITRE_FACTORS: OnceLock<HashMap<&'static str, f64>> = OnceLock::new();

/// Convert a pack size expressed in `unit` to litres. Non-volume units (kits, grams,
/// tubes) have no litre equivalent and yield `None`.
pub(crate) fn to_litres(pack_size: f64, unit: &str) -> Option<f64> {
    if !pack_size.is_finite() || pack_size <= 0.0 {
        return None;
    }
    let factor = litre_factors().get(normalize_unit(unit).as_str()).copied()?;
    Some(pack_size * factor)
}

fn normalize_unit(unit: &str) -> String {
    unit.trim().replace('\u{00b5}', "\u{03bc}").to_lowercase()
}

fn litre_factors() -> &'static HashMap<&'static str, f64> {
    LITRE_FACTORS.get_or_init(|| {
        const UNIT_TO_LITRES: &[(&str, f64)] = &[
            ("l", 1.0),
            ("litre", 1.0),
            ("liter", 1.0),
            ("litres", 1.0),
            ("liters", 1.0),
            ("ml", 1e-3),
            ("millilitre", 1e-3),
            ("milliliter", 1e-3),
            ("\u{03bc}l", 1e-6),
            ("ul", 1e-6),
            ("microlitre", 1e-6),
            ("microliter", 1e-6),
        ];
        UNIT_TO_LITRES.iter().copied().collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn converts_common_volume_units() {
        assert!(close(to_litres(500.0, "mL").expect("ml"), 0.5));
        assert!(close(to_litres(1.0, " L ").expect("litre"), 1.0));
        assert!(close(to_litres(100.0, "µL").expect("micro sign"), 1e-4));
        assert!(close(to_litres(100.0, "uL").expect("ascii micro"), 1e-4));
    }

    #[test]
    fn rejects_non_volume_units_and_bad_sizes() {
        assert_eq!(to_litres(1.0, "kit"), None);
        assert_eq!(to_litres(100.0, "g"), None);
        assert_eq!(to_litres(0.0, "mL"), None);
        assert_eq!(to_litres(f64::NAN, "mL"), None);
    }
}
