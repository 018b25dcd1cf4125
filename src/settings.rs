//! Machine settings consumed by generation, with precondition validation.

use serde::{Deserialize, Serialize};

/// Machine and output settings for G-code generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Work area width in millimeters.
    pub machine_width_mm: f64,
    /// Work area height in millimeters.
    pub machine_height_mm: f64,
    /// Default cutting feed rate in mm/min.
    pub feed_rate: f64,
    /// Preamble emitted before generated toolpaths.
    pub gcode_start: String,
    /// Postamble emitted after generated toolpaths.
    pub gcode_end: String,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            machine_width_mm: 300.0,
            machine_height_mm: 200.0,
            feed_rate: 600.0,
            gcode_start: "G21\nG90\n".to_string(),
            gcode_end: "M2\n".to_string(),
        }
    }
}

/// Outcome of settings validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub problems: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

impl MachineSettings {
    /// Check generation preconditions.
    ///
    /// A job may not start unless the report passes; callers surface the
    /// problems instead of throwing.
    pub fn validate(&self) -> ValidationReport {
        let mut problems = Vec::new();
        if !(self.machine_width_mm > 0.0) {
            problems.push("machine width must be positive".to_string());
        }
        if !(self.machine_height_mm > 0.0) {
            problems.push("machine height must be positive".to_string());
        }
        if !(self.feed_rate > 0.0) {
            problems.push("feed rate must be positive".to_string());
        }
        ValidationReport { problems }
    }
}
