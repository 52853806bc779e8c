//! Compiled-in sensors deployed at the site.

use super::SensorConfig;

const DETECTION_MODEL: &str = "YOLOv8 + BoT-SORT Head Count";

/// (id, name, location, port)
const FIXED_SENSORS: [(&str, &str, &str, u16); 4] = [
    ("gate_02_entry", "Gate 02 Entry", "Main Gate 02 - Entry Point", 5000),
    ("gate1_main_entry", "Gate 1 Main Entry", "Gate 1 - Main Entry Point", 5001),
    ("gate1_outside_left", "Gate 1 Outside Left", "Gate 1 - Left Exterior", 5002),
    ("gate2_exit", "Gate 2 Exit", "Gate 2 - Exit Point", 5003),
];

/// The fixed catalog, each backend on its own port of `host`
pub fn fixed_catalog(host: &str) -> Vec<SensorConfig> {
    let host = host.trim().trim_end_matches('/');
    FIXED_SENSORS
        .iter()
        .map(|(id, name, location, port)| SensorConfig {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            model: DETECTION_MODEL.to_string(),
            stream_uri: format!("{host}:{port}/stream"),
            stats_uri: format!("{host}:{port}/stats"),
        })
        .collect()
}
