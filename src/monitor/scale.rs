//! Monitor scale heuristics.

use super::{Monitor, MonitorMode};
use crate::hardware::{ConnectorType, Hardware};

/// Smallest DPI considered HiDPI.
const HIDPI_LIMIT: f64 = 192.0;
/// Below this vertical resolution a monitor is never HiDPI.
const HIDPI_MIN_HEIGHT: i32 = 1200;
/// Width of the smallest "4K" HDMI television mode.
const SMALLEST_4K_WIDTH: i32 = 3656;

pub const MINIMUM_SCALE_FACTOR: f32 = 1.0;
pub const MAXIMUM_SCALE_FACTOR: f32 = 4.0;
const SCALE_FACTORS_PER_INTEGER: u32 = 4;
const SCALE_FACTORS_STEPS: f32 = 1.0 / SCALE_FACTORS_PER_INTEGER as f32;
const MINIMUM_LOGICAL_AREA: f32 = 800.0 * 480.0;

/// Physical sizes some EDIDs report that are really an aspect ratio.
const ASPECT_AS_SIZE: [(i32, i32); 6] = [
    (1600, 900),
    (1600, 1000),
    (160, 90),
    (160, 100),
    (16, 9),
    (16, 10),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalesConstraint {
    #[default]
    None,
    NoFractional,
}

pub fn has_aspect_as_size(width_mm: i32, height_mm: i32) -> bool {
    ASPECT_AS_SIZE.contains(&(width_mm, height_mm))
}

/// Integer scale for a resolution on a panel of the given physical size.
pub fn calculate_scale_for(
    width: i32,
    height: i32,
    width_mm: i32,
    height_mm: i32,
    connector_type: ConnectorType,
) -> f32 {
    if height < HIDPI_MIN_HEIGHT {
        return 1.0;
    }

    // HDMI televisions report their physical size in a way that makes
    // anything but real 4K modes look dense.
    if connector_type.is_hdmi() && width < SMALLEST_4K_WIDTH {
        return 1.0;
    }

    if width_mm <= 0 || height_mm <= 0 || has_aspect_as_size(width_mm, height_mm) {
        return 1.0;
    }

    let dpi_x = width as f64 / (width_mm as f64 / 25.4);
    let dpi_y = height as f64 / (height_mm as f64 / 25.4);
    if dpi_x > HIDPI_LIMIT && dpi_y > HIDPI_LIMIT {
        2.0
    } else {
        1.0
    }
}

pub fn calculate_scale(hw: &Hardware, monitor: &Monitor, mode: &MonitorMode) -> f32 {
    let (width_mm, height_mm) = monitor.physical_dimensions(hw);
    calculate_scale_for(
        mode.spec.width,
        mode.spec.height,
        width_mm,
        height_mm,
        monitor.connector_type(hw),
    )
}

fn is_scale_valid_for_size(width: f32, height: f32, scale: f32) -> bool {
    if !(MINIMUM_SCALE_FACTOR..=MAXIMUM_SCALE_FACTOR).contains(&scale) {
        return false;
    }
    (width / scale).floor() * (height / scale).floor() >= MINIMUM_LOGICAL_AREA
}

/// The scale closest to `scale` (within `threshold`) that divides both
/// dimensions into whole pixels, or 0 if there is none.
pub fn get_closest_scale_factor_for_resolution(
    width: f32,
    height: f32,
    scale: f32,
    threshold: f32,
) -> f32 {
    if !is_scale_valid_for_size(width, height, scale) {
        return 0.0;
    }

    if width % scale == 0.0 && height % scale == 0.0 {
        return scale;
    }

    let base_scaled_w = (width / scale).floor() as i32;
    let mut best_scale = 0.0f32;
    let mut found_one = false;
    let mut i = 0;

    while !found_one {
        for offset in [-i, i] {
            let scaled_w = (base_scaled_w + offset) as f32;
            let current_scale = width / scaled_w;
            let scaled_h = height / current_scale;

            if current_scale >= scale + threshold
                || current_scale <= scale - threshold
                || current_scale < MINIMUM_SCALE_FACTOR
                || current_scale > MAXIMUM_SCALE_FACTOR
            {
                return best_scale;
            }

            if scaled_h.floor() == scaled_h {
                found_one = true;
                if (current_scale - scale).abs() < (best_scale - scale).abs() {
                    best_scale = current_scale;
                }
            }
        }
        i += 1;
    }

    best_scale
}

/// Scales usable for a `width`x`height` mode, in increasing order.
pub fn calculate_supported_scales(
    width: i32,
    height: i32,
    constraint: ScalesConstraint,
) -> Vec<f32> {
    let (width, height) = (width as f32, height as f32);
    let mut scales: Vec<f32> = Vec::new();

    for i in MINIMUM_SCALE_FACTOR as u32..=MAXIMUM_SCALE_FACTOR as u32 {
        for j in 0..SCALE_FACTORS_PER_INTEGER {
            let scale_value = i as f32 + j as f32 * SCALE_FACTORS_STEPS;

            let scale = match constraint {
                ScalesConstraint::NoFractional => {
                    if scale_value.fract() != 0.0
                        || !is_scale_valid_for_size(width, height, scale_value)
                    {
                        continue;
                    }
                    scale_value
                }
                ScalesConstraint::None => {
                    let threshold = if scale_value == MINIMUM_SCALE_FACTOR
                        || scale_value == MAXIMUM_SCALE_FACTOR
                    {
                        SCALE_FACTORS_STEPS / 2.0
                    } else {
                        SCALE_FACTORS_STEPS
                    };
                    get_closest_scale_factor_for_resolution(width, height, scale_value, threshold)
                }
            };

            if scale > 0.0 && scales.last() != Some(&scale) {
                scales.push(scale);
            }
        }
    }

    if scales.is_empty() {
        scales.push(1.0);
    }
    scales
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_calculate_scale() {
        // 13.3" 4K laptop panel.
        assert_eq!(calculate_scale_for(3840, 2160, 294, 165, ConnectorType::Edp), 2.0);
        // 27" 4K monitor is not dense enough.
        assert_eq!(calculate_scale_for(3840, 2160, 597, 336, ConnectorType::DisplayPort), 1.0);
        assert_eq!(calculate_scale_for(1920, 1080, 294, 165, ConnectorType::Edp), 1.0);
        assert_eq!(calculate_scale_for(2560, 1600, 160, 100, ConnectorType::Edp), 1.0);
        assert_eq!(calculate_scale_for(3200, 1800, 100, 56, ConnectorType::HdmiA), 1.0);
        assert_eq!(calculate_scale_for(3840, 2160, 0, 0, ConnectorType::Edp), 1.0);
    }

    #[test]
    fn test_closest_scale_exact() {
        assert_eq!(get_closest_scale_factor_for_resolution(1920.0, 1080.0, 1.25, 0.125), 1.25);
        assert_eq!(get_closest_scale_factor_for_resolution(1920.0, 1080.0, 2.0, 0.25), 2.0);
    }

    #[test]
    fn test_closest_scale_snaps() {
        let scale = get_closest_scale_factor_for_resolution(2560.0, 1440.0, 1.75, 0.25);
        assert!(scale > 1.5 && scale < 2.0, "{}", scale);
        assert_eq!(2560.0 / scale, 1456.0);
        assert_eq!(1440.0 / scale, 819.0);
    }

    #[test]
    fn test_closest_scale_too_small() {
        assert_eq!(get_closest_scale_factor_for_resolution(800.0, 600.0, 2.0, 0.25), 0.0);
        assert_eq!(get_closest_scale_factor_for_resolution(1920.0, 1080.0, 0.5, 0.25), 0.0);
    }

    #[test]
    fn test_supported_scales() {
        assert_eq!(calculate_supported_scales(640, 480, ScalesConstraint::None), [1.0]);
        assert_eq!(
            calculate_supported_scales(1024, 768, ScalesConstraint::NoFractional),
            [1.0]
        );
        assert_eq!(
            calculate_supported_scales(3840, 2160, ScalesConstraint::NoFractional),
            [1.0, 2.0, 3.0, 4.0]
        );

        let scales = calculate_supported_scales(1920, 1080, ScalesConstraint::None);
        assert_eq!(scales.first(), Some(&1.0));
        assert!(scales.contains(&1.25));
        assert!(scales.contains(&2.0));
        assert!(!scales.contains(&3.0));
    }

    proptest! {
        #[test]
        fn closest_scale_divides_exactly(
            width in 800u32..7680,
            height in 480u32..4320,
            step in 0u32..12,
        ) {
            let scale = 1.0 + step as f32 * SCALE_FACTORS_STEPS;
            let found = get_closest_scale_factor_for_resolution(
                width as f32,
                height as f32,
                scale,
                SCALE_FACTORS_STEPS,
            );
            if found != 0.0 {
                prop_assert!((found - scale).abs() < SCALE_FACTORS_STEPS);
                prop_assert_eq!((height as f32 / found).floor(), height as f32 / found);
            }
        }
    }
}
