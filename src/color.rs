/// Default color cycle for newly created categories.
///
/// Chosen to stay distinguishable on both light and dark canvases.
pub const CATEGORY_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2",
    "#7f7f7f", "#bcbd22", "#17becf",
];

/// Palette color for the n-th category, cycling when the palette runs out.
pub fn palette_color(index: usize) -> &'static str {
    CATEGORY_PALETTE[index % CATEGORY_PALETTE.len()]
}

/// Utility for parsing user-supplied color strings (hex, named, or [r,g,b] arrays)
pub fn parse_color(val: &str) -> Option<String> {
    let val = val.trim();
    if val.is_empty() {
        return None;
    }
    if val.starts_with('#') {
        return Some(val.to_ascii_lowercase());
    }
    if val.starts_with('[') && val.ends_with(']') {
        // Parse [r,g,b] array with float components in 0..=1
        let inner = &val[1..val.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
        if parts.len() == 3 {
            let r = parts[0].parse::<f32>().ok()?;
            let g = parts[1].parse::<f32>().ok()?;
            let b = parts[2].parse::<f32>().ok()?;
            return Some(format!(
                "#{:02x}{:02x}{:02x}",
                (r.clamp(0.0, 1.0) * 255.0).round() as u8,
                (g.clamp(0.0, 1.0) * 255.0).round() as u8,
                (b.clamp(0.0, 1.0) * 255.0).round() as u8
            ));
        }
        return None;
    }
    match val.to_ascii_lowercase().as_str() {
        "white" => Some("#ffffff".to_string()),
        "black" => Some("#000000".to_string()),
        "red" => Some("#ff0000".to_string()),
        "green" => Some("#00ff00".to_string()),
        "blue" => Some("#0000ff".to_string()),
        "yellow" => Some("#ffff00".to_string()),
        "orange" => Some("#ffa500".to_string()),
        "cyan" => Some("#00ffff".to_string()),
        "magenta" => Some("#ff00ff".to_string()),
        "gray" | "grey" => Some("#808080".to_string()),
        "brown" => Some("#a52a2a".to_string()),
        "purple" => Some("#800080".to_string()),
        "pink" => Some("#ffc0cb".to_string()),
        "navy" => Some("#000080".to_string()),
        "teal" => Some("#008080".to_string()),
        "olive" => Some("#808000".to_string()),
        "maroon" => Some("#800000".to_string()),
        _ => None,
    }
}
