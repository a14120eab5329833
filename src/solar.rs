//! Solar position math for the internal station's `sun-elevation` datum.
//!
//! NOAA's general solar position calculation: elevation of the sun for a
//! given instant and site, in degrees. The observatory's height above sea
//! level enters as a horizon-dip term. Accuracy is a small fraction of a
//! degree, far below the dawn/dusk thresholds the safety rules use.

use chrono::{DateTime, Timelike, Utc};

/// Elevation of the sun above the site's horizon in degrees, negative below.
pub fn sun_elevation_degrees(
    when: DateTime<Utc>,
    latitude_deg: f64,
    longitude_deg: f64,
    elevation_m: f64,
) -> f64 {
    let julian_day = when.timestamp() as f64 / 86_400.0 + 2_440_587.5;
    let t = (julian_day - 2_451_545.0) / 36_525.0;

    let mean_long = (280.46646 + t * (36_000.76983 + 0.000_3032 * t)).rem_euclid(360.0);
    let mean_anom = 357.52911 + t * (35_999.05029 - 0.000_1537 * t);
    let eccentricity = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anom.to_radians();
    let eq_of_center = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;

    let true_long = mean_long + eq_of_center;
    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_long = true_long - 0.005_69 - 0.004_78 * omega.sin();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - 0.001_813 * t))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.to_radians().sin()).asin();

    let var_y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eq_of_time_minutes = 4.0
        * (var_y * (2.0 * l0).sin() - 2.0 * eccentricity * m.sin()
            + 4.0 * eccentricity * var_y * m.sin() * (2.0 * l0).cos()
            - 0.5 * var_y * var_y * (4.0 * l0).sin()
            - 1.25 * eccentricity * eccentricity * (2.0 * m).sin())
        .to_degrees();

    let minutes_utc = when.hour() as f64 * 60.0
        + when.minute() as f64
        + when.second() as f64 / 60.0;
    let true_solar_minutes =
        (minutes_utc + eq_of_time_minutes + 4.0 * longitude_deg).rem_euclid(1_440.0);
    let mut hour_angle_deg = true_solar_minutes / 4.0 - 180.0;
    if hour_angle_deg < -180.0 {
        hour_angle_deg += 360.0;
    }

    let latitude = latitude_deg.to_radians();
    let hour_angle = hour_angle_deg.to_radians();
    let cos_zenith = latitude.sin() * declination.sin()
        + latitude.cos() * declination.cos() * hour_angle.cos();
    let geometric = 90.0 - cos_zenith.clamp(-1.0, 1.0).acos().to_degrees();
    geometric + horizon_dip_degrees(elevation_m)
}

/// An elevated observer sees a depressed horizon: dip ~ 1.76' per sqrt(meter).
fn horizon_dip_degrees(elevation_m: f64) -> f64 {
    0.0293 * elevation_m.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn equinox_noon_on_the_equator_is_near_zenith() {
        let when = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).single().unwrap();
        let elevation = sun_elevation_degrees(when, 0.0, 0.0, 0.0);
        assert!(elevation > 85.0, "elevation={elevation}");
    }

    #[test]
    fn equinox_midnight_on_the_equator_is_deeply_negative() {
        let when = Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).single().unwrap();
        let elevation = sun_elevation_degrees(when, 0.0, 0.0, 0.0);
        assert!(elevation < -80.0, "elevation={elevation}");
    }

    #[test]
    fn solstice_noon_at_the_tropic_is_near_zenith() {
        let when = Utc.with_ymd_and_hms(2026, 6, 21, 12, 0, 0).single().unwrap();
        let elevation = sun_elevation_degrees(when, 23.44, 0.0, 0.0);
        assert!(elevation > 85.0, "elevation={elevation}");
    }

    #[test]
    fn winter_noon_at_high_latitude_stays_low() {
        let when = Utc.with_ymd_and_hms(2026, 12, 21, 12, 0, 0).single().unwrap();
        let elevation = sun_elevation_degrees(when, 60.0, 0.0, 0.0);
        assert!(
            (4.0..9.0).contains(&elevation),
            "elevation={elevation}"
        );
    }

    #[test]
    fn longitude_shifts_local_noon() {
        // 90 degrees west means local solar noon happens six hours after UTC noon.
        let when = Utc.with_ymd_and_hms(2026, 3, 20, 18, 0, 0).single().unwrap();
        let at_greenwich = sun_elevation_degrees(when, 0.0, 0.0, 0.0);
        let at_west = sun_elevation_degrees(when, 0.0, -90.0, 0.0);
        assert!(at_west > 80.0, "at_west={at_west}");
        assert!(at_greenwich < 10.0, "at_greenwich={at_greenwich}");
    }

    #[test]
    fn observer_height_dips_the_horizon() {
        let when = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).single().unwrap();
        let at_sea_level = sun_elevation_degrees(when, 30.6, 34.8, 0.0);
        let at_summit = sun_elevation_degrees(when, 30.6, 34.8, 876.0);
        // dip(876 m) = 0.0293 * sqrt(876) ~ 0.87 degrees
        let dip = at_summit - at_sea_level;
        assert!((dip - 0.867).abs() < 0.01, "dip={dip}");

        let below = sun_elevation_degrees(when, 30.6, 34.8, -10.0);
        assert_eq!(below, at_sea_level, "negative heights contribute no dip");
    }
}
