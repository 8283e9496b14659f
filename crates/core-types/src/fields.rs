//! Display metadata for the hourly metric fields the data sources understand.

/// The field every new region tracks unless configured otherwise.
pub const DEFAULT_FIELD: &str = "temperature_2m";

/// Source identifier recorded on regions fed by the Open-Meteo endpoints.
pub const DEFAULT_SOURCE: &str = "open-meteo";

struct FieldInfo {
    name: &'static str,
    label: &'static str,
    unit: &'static str,
}

const KNOWN_FIELDS: &[FieldInfo] = &[
    FieldInfo { name: "temperature_2m", label: "Temperature", unit: "°C" },
    FieldInfo { name: "relative_humidity_2m", label: "Humidity", unit: "%" },
    FieldInfo { name: "precipitation", label: "Precipitation", unit: "mm" },
];

fn lookup(field: &str) -> Option<&'static FieldInfo> {
    KNOWN_FIELDS.iter().find(|f| f.name == field)
}

/// Returns a label such as `"Temperature (°C)"`, or the raw field name if it is not known.
pub fn field_label(field: &str) -> String {
    match lookup(field) {
        Some(info) => format!("{} ({})", info.label, info.unit),
        None => field.to_string(),
    }
}

/// Returns the unit suffix for a field, empty if unknown.
pub fn field_unit(field: &str) -> &'static str {
    lookup(field).map(|f| f.unit).unwrap_or("")
}

/// Formats a metric value with one decimal and the field's unit, e.g. `"16.7°C"`.
pub fn format_value(value: f64, field: &str) -> String {
    format!("{:.1}{}", value, field_unit(field))
}
