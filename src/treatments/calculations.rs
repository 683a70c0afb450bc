//! Pure dose and machine-load arithmetic.
//!
//! Quantities are litres or kilograms of product, rounded half-up to one
//! decimal place; money rounds to two. Degenerate inputs (zero field area,
//! zero carrier water for a volume-based dose type) yield a zero quantity
//! instead of an error; callers that need a nonzero result must validate
//! area/water themselves.

use crate::products::models::{DoseType, DoseUnit};
use crate::treatments::models::ApplicationType;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Leftover carrier water below this is treated as spillage, not a load.
pub const PARTIAL_LOAD_THRESHOLD_LITRES: i64 = 50;

pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_currency(value: Decimal) -> Decimal {
    // round_dp never extends scale, so whole amounts would serialize as
    // "150" instead of "150.00" without the rescale.
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

fn round_dose(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Absolute product quantity for a whole treatment.
///
/// Area-based doses scale with the field area; volume-based doses scale with
/// the total carrier water (`water_per_ha * field_area`) over the variant's
/// divisor (1000 L for per-1000L doses, 100 for percent).
pub fn absolute_quantity(
    dose: Decimal,
    dose_type: DoseType,
    field_area: Decimal,
    water_per_ha: Decimal,
) -> (Decimal, DoseUnit) {
    let quantity = match dose_type.water_divisor() {
        None => dose * field_area,
        Some(divisor) => {
            let total_water = water_per_ha * field_area;
            dose * total_water / divisor
        }
    };
    (round_quantity(quantity), dose_type.unit())
}

/// Inverse of [`absolute_quantity`]: the per-unit dose a given absolute
/// quantity corresponds to. Returns 0 when the denominator degenerates.
pub fn dose_from_quantity(
    quantity: Decimal,
    dose_type: DoseType,
    field_area: Decimal,
    water_per_ha: Decimal,
) -> Decimal {
    let dose = match dose_type.water_divisor() {
        None => {
            if field_area.is_zero() {
                Decimal::ZERO
            } else {
                quantity / field_area
            }
        }
        Some(divisor) => {
            let total_water = water_per_ha * field_area;
            if total_water.is_zero() {
                Decimal::ZERO
            } else {
                quantity * divisor / total_water
            }
        }
    };
    round_dose(dose)
}

/// Full and partial sprayer loads needed to cover a treatment's total water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MachineLoads {
    /// Total carrier water in litres, rounded to whole litres.
    pub total_water: i64,
    pub full_loads: i64,
    pub partial_load: bool,
    pub partial_water: i64,
}

/// Load plan for a spraying treatment. None for fertigation, without a
/// machine, or with no effective water volume.
pub fn plan_loads(
    application_type: ApplicationType,
    machine_capacity: Option<i32>,
    field_area: Decimal,
    water_per_ha: Decimal,
) -> Option<MachineLoads> {
    if application_type != ApplicationType::Spraying {
        return None;
    }
    let capacity = i64::from(machine_capacity?);
    if capacity <= 0 || water_per_ha <= Decimal::ZERO {
        return None;
    }

    let total_water = (field_area * water_per_ha)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()?;
    let full_loads = total_water / capacity;
    let partial_water = total_water % capacity;

    Some(MachineLoads {
        total_water,
        full_loads,
        partial_load: partial_water > PARTIAL_LOAD_THRESHOLD_LITRES,
        partial_water,
    })
}

/// Product quantity for a given carrier-water volume (one tank, or the
/// partial remainder). For area-based doses the volume is translated into
/// covered area via the water rate.
fn quantity_for_water_volume(
    dose: Decimal,
    dose_type: DoseType,
    water_litres: Decimal,
    water_per_ha: Decimal,
) -> Decimal {
    let quantity = match dose_type.water_divisor() {
        Some(divisor) => dose * water_litres / divisor,
        None => {
            if water_per_ha.is_zero() {
                Decimal::ZERO
            } else {
                dose * (water_litres / water_per_ha)
            }
        }
    };
    round_quantity(quantity)
}

/// Product quantity to mix into the partial load, 0 when the plan has none.
pub fn product_for_partial_load(
    loads: &MachineLoads,
    dose: Decimal,
    dose_type: DoseType,
    water_per_ha: Decimal,
) -> Decimal {
    if !loads.partial_load {
        return Decimal::ZERO;
    }
    quantity_for_water_volume(dose, dose_type, Decimal::from(loads.partial_water), water_per_ha)
}

/// Product quantity per full tank. Fertigation doses the whole plot at once,
/// so the treatment total is returned unchanged.
pub fn dose_per_full_load(
    application_type: ApplicationType,
    total_dose: Decimal,
    machine_capacity: Option<i32>,
    dose: Decimal,
    dose_type: DoseType,
    water_per_ha: Decimal,
) -> Option<Decimal> {
    if application_type == ApplicationType::Fertigation {
        return Some(total_dose);
    }
    let capacity = i64::from(machine_capacity?);
    if capacity <= 0 || water_per_ha <= Decimal::ZERO {
        return None;
    }
    Some(quantity_for_water_volume(
        dose,
        dose_type,
        Decimal::from(capacity),
        water_per_ha,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[rstest]
    #[case(DoseType::LitresPerHectare, "3.0", "5.0", "400", "15.0", DoseUnit::Litres)]
    #[case(DoseType::KilogramsPerHectare, "1.0", "7.5", "500", "7.5", DoseUnit::Kilograms)]
    #[case(DoseType::LitresPer1000L, "2.0", "5.0", "400", "4.0", DoseUnit::Litres)]
    #[case(DoseType::KilogramsPer1000L, "2.0", "6.0", "400", "4.8", DoseUnit::Kilograms)]
    #[case(DoseType::Percent, "2.0", "5.0", "400", "40.0", DoseUnit::Litres)]
    #[case(DoseType::Percent, "1.5", "7.5", "500", "56.3", DoseUnit::Litres)] // 56.25 rounds half-up
    fn absolute_quantity_per_dose_type(
        #[case] dose_type: DoseType,
        #[case] dose: &str,
        #[case] area: &str,
        #[case] water: &str,
        #[case] expected: &str,
        #[case] expected_unit: DoseUnit,
    ) {
        let (quantity, unit) = absolute_quantity(dec(dose), dose_type, dec(area), dec(water));
        assert_eq!(quantity, dec(expected));
        assert_eq!(unit, expected_unit);
    }

    #[rstest]
    #[case(DoseType::LitresPer1000L)]
    #[case(DoseType::KilogramsPer1000L)]
    #[case(DoseType::Percent)]
    fn volume_based_quantity_is_zero_without_water(#[case] dose_type: DoseType) {
        let (quantity, _) = absolute_quantity(dec("2.0"), dose_type, dec("5.0"), Decimal::ZERO);
        assert_eq!(quantity, Decimal::ZERO);
    }

    #[rstest]
    #[case("150", "150.00")]
    #[case("29.995", "30.00")]
    #[case("0", "0.00")]
    fn currency_always_carries_two_decimals(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(round_currency(dec(input)).to_string(), expected);
    }

    #[test]
    fn area_based_quantity_is_zero_without_area() {
        let (quantity, _) = absolute_quantity(
            dec("3.0"),
            DoseType::LitresPerHectare,
            Decimal::ZERO,
            dec("400"),
        );
        assert_eq!(quantity, Decimal::ZERO);
    }

    #[rstest]
    #[case(DoseType::LitresPerHectare, "3.0", "5.0", "400")]
    #[case(DoseType::KilogramsPerHectare, "2.5", "6.0", "0")]
    #[case(DoseType::LitresPer1000L, "2.0", "5.0", "400")]
    #[case(DoseType::KilogramsPer1000L, "1.2", "4.0", "500")]
    #[case(DoseType::Percent, "2.0", "5.0", "400")]
    fn dose_round_trips_through_total(
        #[case] dose_type: DoseType,
        #[case] dose: &str,
        #[case] area: &str,
        #[case] water: &str,
    ) {
        let (total, _) = absolute_quantity(dec(dose), dose_type, dec(area), dec(water));
        let back = dose_from_quantity(total, dose_type, dec(area), dec(water));
        let diff = (back - dec(dose)).abs();
        assert!(
            diff <= dec("0.05"),
            "{dose_type:?}: {dose} -> {total} -> {back}"
        );
    }

    #[test]
    fn dose_from_quantity_is_zero_on_degenerate_input() {
        assert_eq!(
            dose_from_quantity(dec("10.0"), DoseType::LitresPerHectare, Decimal::ZERO, dec("400")),
            Decimal::ZERO
        );
        assert_eq!(
            dose_from_quantity(dec("10.0"), DoseType::Percent, dec("5.0"), Decimal::ZERO),
            Decimal::ZERO
        );
    }

    #[test]
    fn plan_loads_with_exact_loads_has_no_partial() {
        let loads = plan_loads(ApplicationType::Spraying, Some(1000), dec("5.0"), dec("400"))
            .expect("plan expected");
        assert_eq!(loads.total_water, 2000);
        assert_eq!(loads.full_loads, 2);
        assert!(!loads.partial_load);
        assert_eq!(loads.partial_water, 0);
    }

    #[test]
    fn plan_loads_with_remainder_has_partial() {
        let loads = plan_loads(ApplicationType::Spraying, Some(1000), dec("6.0"), dec("400"))
            .expect("plan expected");
        assert_eq!(loads.total_water, 2400);
        assert_eq!(loads.full_loads, 2);
        assert!(loads.partial_load);
        assert_eq!(loads.partial_water, 400);
    }

    #[test]
    fn plan_loads_rounds_fractional_water_to_whole_litres() {
        // 4.15 ha at 1328 L/ha in a 2000 L sprayer
        let loads = plan_loads(ApplicationType::Spraying, Some(2000), dec("4.15"), dec("1328"))
            .expect("plan expected");
        assert_eq!(loads.total_water, 5511);
        assert_eq!(loads.full_loads, 2);
        assert!(loads.partial_load);
        assert_eq!(loads.partial_water, 1511);
    }

    #[test]
    fn remainder_at_threshold_is_spillage() {
        // 2050 L total with a 1000 L tank: 50 L leftover is not a pass
        let loads = plan_loads(ApplicationType::Spraying, Some(1000), dec("4.1"), dec("500"))
            .expect("plan expected");
        assert_eq!(loads.partial_water, 50);
        assert!(!loads.partial_load);
    }

    #[rstest]
    #[case(ApplicationType::Fertigation, Some(1000))]
    #[case(ApplicationType::Spraying, None)]
    fn plan_loads_requires_spraying_and_machine(
        #[case] application_type: ApplicationType,
        #[case] capacity: Option<i32>,
    ) {
        assert!(plan_loads(application_type, capacity, dec("6.0"), dec("400")).is_none());
    }

    #[test]
    fn plan_loads_requires_effective_water() {
        assert!(
            plan_loads(ApplicationType::Spraying, Some(1000), dec("6.0"), Decimal::ZERO).is_none()
        );
    }

    #[rstest]
    #[case(DoseType::LitresPer1000L, "3.0", "1.2")] // 3.0 * 400 / 1000
    #[case(DoseType::Percent, "1.5", "6.0")] // 1.5 * 400 / 100
    #[case(DoseType::LitresPerHectare, "2.5", "2.5")] // 400 L covers 1 ha at 400 L/ha
    fn partial_load_product_quantities(
        #[case] dose_type: DoseType,
        #[case] dose: &str,
        #[case] expected: &str,
    ) {
        let loads = plan_loads(ApplicationType::Spraying, Some(1000), dec("6.0"), dec("400"))
            .expect("plan expected");
        assert_eq!(loads.partial_water, 400);
        let quantity = product_for_partial_load(&loads, dec(dose), dose_type, dec("400"));
        assert_eq!(quantity, dec(expected));
    }

    #[test]
    fn partial_load_product_covers_fractional_area() {
        let loads = plan_loads(ApplicationType::Spraying, Some(2000), dec("4.15"), dec("1328"))
            .expect("plan expected");
        // 1511 L / 1328 L/ha = 1.1378 ha at 2.5 L/ha
        let quantity =
            product_for_partial_load(&loads, dec("2.5"), DoseType::LitresPerHectare, dec("1328"));
        assert_eq!(quantity, dec("2.8"));
    }

    #[test]
    fn no_partial_load_means_no_product() {
        let loads = plan_loads(ApplicationType::Spraying, Some(1000), dec("5.0"), dec("400"))
            .expect("plan expected");
        let quantity =
            product_for_partial_load(&loads, dec("3.0"), DoseType::LitresPer1000L, dec("400"));
        assert_eq!(quantity, Decimal::ZERO);
    }

    #[rstest]
    #[case(DoseType::LitresPer1000L, "2.5", "3.0")] // 2.5 * 1200 / 1000
    #[case(DoseType::Percent, "1.5", "18.0")] // 1.5 * 1200 / 100
    #[case(DoseType::KilogramsPerHectare, "1.0", "2.4")] // 1200 L covers 2.4 ha at 500 L/ha
    fn full_load_product_quantities(
        #[case] dose_type: DoseType,
        #[case] dose: &str,
        #[case] expected: &str,
    ) {
        let quantity = dose_per_full_load(
            ApplicationType::Spraying,
            dec("9.4"),
            Some(1200),
            dec(dose),
            dose_type,
            dec("500"),
        );
        assert_eq!(quantity, Some(dec(expected)));
    }

    #[test]
    fn fertigation_full_load_is_the_plot_total() {
        let quantity = dose_per_full_load(
            ApplicationType::Fertigation,
            dec("40.0"),
            None,
            dec("5.0"),
            DoseType::LitresPerHectare,
            Decimal::ZERO,
        );
        assert_eq!(quantity, Some(dec("40.0")));
    }

    #[test]
    fn spraying_full_load_requires_machine_and_water() {
        assert!(
            dose_per_full_load(
                ApplicationType::Spraying,
                dec("9.4"),
                None,
                dec("2.5"),
                DoseType::LitresPer1000L,
                dec("500"),
            )
            .is_none()
        );
        assert!(
            dose_per_full_load(
                ApplicationType::Spraying,
                dec("9.4"),
                Some(1200),
                dec("2.5"),
                DoseType::LitresPer1000L,
                Decimal::ZERO,
            )
            .is_none()
        );
    }
}
