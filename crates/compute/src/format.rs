/// `"{m:.2} m"` below one kilometre, else `"{km:.2} km"`.
pub fn format_distance_km(km: f64) -> String {
    if km < 1.0 {
        format!("{:.2} m", km * 1_000.0)
    } else {
        format!("{km:.2} km")
    }
}

/// `"{m2:.2} m²"` below one square kilometre, else `"{km2:.4} km²"`.
pub fn format_area_km2(km2: f64) -> String {
    if km2 < 1.0 {
        format!("{:.2} m²", km2 * 1_000_000.0)
    } else {
        format!("{km2:.4} km²")
    }
}
