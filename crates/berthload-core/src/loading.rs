//! Loading-time estimate

use berthload_api::ShipLine;

/// Loading effort of one 20-foot container
pub const TWENTY_FOOT_UNITS: f64 = 2.0;

/// Loading effort of one 40-foot container
pub const FORTY_FOOT_UNITS: f64 = 3.0;

/// Cranes across every assigned ship unit.
///
/// Summed in `f64` so oversized rows cannot overflow.
pub fn total_cranes(lines: &[ShipLine]) -> f64 {
    lines
        .iter()
        .map(|line| line.cranes as f64 * line.quantity as f64)
        .sum()
}

/// Container units to load
pub fn container_units(containers_20ft: i64, containers_40ft: i64) -> f64 {
    containers_20ft as f64 * TWENTY_FOOT_UNITS + containers_40ft as f64 * FORTY_FOOT_UNITS
}

/// Estimated loading time: container units spread over the total crane count.
///
/// Zero cranes yields zero rather than a division error.
pub fn loading_time(lines: &[ShipLine], containers_20ft: i64, containers_40ft: i64) -> f64 {
    let cranes = total_cranes(lines);
    if cranes <= 0.0 {
        return 0.0;
    }
    container_units(containers_20ft, containers_40ft) / cranes
}
