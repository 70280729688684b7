use crate::input::Terrain;

/// Anemometer height at the weather station, in ft
pub const STATION_HEIGHT_FT: f64 = 32.8;
const STATION_TERRAIN_MULTIPLIER: f64 = 1.0;
const STATION_TERRAIN_EXPONENT: f64 = 0.15;
const STATION_BOUNDARY_LAYER_THICKNESS_FT: f64 = 270.;
const STATION_BOUNDARY_LAYER_EXPONENT: f64 = 0.14;

// Shelter coefficients (AIM-2 shelter classes) chosen from the distance to the nearest neighbour
const SHELTER_ISOLATED: f64 = 0.90;
const SHELTER_ACROSS_STREET: f64 = 0.70;
const SHELTER_URBAN_DENSE: f64 = 0.50;

/// Power-law (multiplier, exponent) and ASHRAE (boundary layer thickness in ft, exponent)
/// parameters for a terrain class
fn terrain_parameters(terrain: Terrain) -> (f64, f64, f64, f64) {
    match terrain {
        Terrain::Ocean => (1.30, 0.10, 210., 0.10),
        Terrain::Plains => (1.00, 0.15, 270., 0.14),
        Terrain::Rural => (0.85, 0.20, 270., 0.14),
        Terrain::Suburban => (0.67, 0.25, 370., 0.22),
        Terrain::City => (0.47, 0.35, 460., 0.33),
    }
}

/// Wind profile at the building site relative to the weather station.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindSpeedProfile {
    terrain: Terrain,
    site_terrain_multiplier: f64,
    site_terrain_exponent: f64,
    site_boundary_layer_thickness: f64, // ft
    site_boundary_layer_exponent: f64,
    shelter_coefficient: f64,
}

impl WindSpeedProfile {
    /// Arguments:
    /// * `terrain` - terrain class around the building
    /// * `shelter_coefficient` - explicit shelter coefficient; derived from `neighbour_distance` when absent
    /// * `neighbour_distance` - distance to the nearest neighbouring building, in ft
    /// * `building_height` - in ft
    pub fn new(
        terrain: Terrain,
        shelter_coefficient: Option<f64>,
        neighbour_distance: Option<f64>,
        building_height: f64,
    ) -> Self {
        let (multiplier, exponent, thickness, boundary_layer_exponent) =
            terrain_parameters(terrain);

        Self {
            terrain,
            site_terrain_multiplier: multiplier,
            site_terrain_exponent: exponent,
            site_boundary_layer_thickness: thickness,
            site_boundary_layer_exponent: boundary_layer_exponent,
            shelter_coefficient: shelter_coefficient.unwrap_or_else(|| {
                shelter_coefficient_from_neighbours(neighbour_distance, building_height)
            }),
        }
    }

    pub fn terrain(&self) -> Terrain {
        self.terrain
    }

    pub fn shelter_coefficient(&self) -> f64 {
        self.shelter_coefficient
    }

    pub fn shielding_coefficient(&self) -> f64 {
        self.shelter_coefficient / 3.
    }

    pub fn site_terrain_exponent(&self) -> f64 {
        self.site_terrain_exponent
    }

    pub fn site_boundary_layer_exponent(&self) -> f64 {
        self.site_boundary_layer_exponent
    }

    /// Ratio of site wind speed at `height_ft` to station wind speed using the simple
    /// power-law profile (Sherman-Grimsrud)
    pub fn power_law_terrain_factor(&self, height_ft: f64) -> f64 {
        self.site_terrain_multiplier * (height_ft / STATION_HEIGHT_FT).powf(self.site_terrain_exponent)
            / (STATION_TERRAIN_MULTIPLIER
                * (STATION_HEIGHT_FT / STATION_HEIGHT_FT).powf(STATION_TERRAIN_EXPONENT))
    }

    /// Ratio of site wind speed at `height_ft` to station wind speed using the ASHRAE
    /// boundary layer profile
    pub fn ashrae_terrain_factor(&self, height_ft: f64) -> f64 {
        (STATION_BOUNDARY_LAYER_THICKNESS_FT / STATION_HEIGHT_FT)
            .powf(STATION_BOUNDARY_LAYER_EXPONENT)
            * (height_ft / self.site_boundary_layer_thickness)
                .powf(self.site_boundary_layer_exponent)
    }
}

fn shelter_coefficient_from_neighbours(neighbour_distance: Option<f64>, building_height: f64) -> f64 {
    match neighbour_distance {
        None => SHELTER_ISOLATED,
        Some(distance) if distance <= 0. => SHELTER_ISOLATED,
        Some(distance) if distance > building_height => SHELTER_ACROSS_STREET,
        Some(_) => SHELTER_URBAN_DENSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(None, None, 0.90)]
    #[case(None, Some(0.), 0.90)]
    #[case(None, Some(40.), 0.70)]
    #[case(None, Some(10.), 0.50)]
    #[case(Some(0.3), Some(10.), 0.3)]
    fn should_select_shelter_coefficient(
        #[case] explicit: Option<f64>,
        #[case] neighbour_distance: Option<f64>,
        #[case] expected: f64,
    ) {
        let profile = WindSpeedProfile::new(Terrain::Suburban, explicit, neighbour_distance, 20.);
        assert_eq!(profile.shelter_coefficient(), expected);
        assert_relative_eq!(profile.shielding_coefficient(), expected / 3.);
    }

    #[rstest]
    fn should_have_unit_power_law_factor_for_plains_at_station_height() {
        let profile = WindSpeedProfile::new(Terrain::Plains, Some(0.5), None, 20.);
        assert_relative_eq!(profile.power_law_terrain_factor(STATION_HEIGHT_FT), 1.);
        assert_relative_eq!(
            profile.ashrae_terrain_factor(STATION_HEIGHT_FT),
            1.,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_calc_suburban_terrain_factors() {
        let profile = WindSpeedProfile::new(Terrain::Suburban, Some(0.5), None, 20.);
        assert_relative_eq!(
            profile.power_law_terrain_factor(20.),
            0.67 * (20. / 32.8f64).powf(0.25),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            profile.ashrae_terrain_factor(20.),
            (270. / 32.8f64).powf(0.14) * (20. / 370f64).powf(0.22),
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_reduce_wind_with_rougher_terrain() {
        let factors = Terrain::iter()
            .map(|terrain| {
                WindSpeedProfile::new(terrain, None, None, 20.).power_law_terrain_factor(20.)
            })
            .collect::<Vec<_>>();
        assert!(factors.windows(2).all(|pair| pair[0] > pair[1]));
    }
}
