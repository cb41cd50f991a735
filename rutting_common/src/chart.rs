//! Severity bar chart, as a plain description of what to draw.
//!
//! Every bar has the same height; only its color carries information. The
//! y axis therefore shows no values.

use crate::classifier::PredictionResult;
use crate::severity::SeverityClass;

pub const CHART_TITLE: &str = "Rutting Severity for Each Image";
pub const X_AXIS_TITLE: &str = "Image File";
pub const Y_AXIS_TITLE: &str = "Predicted Severity (Color Coded)";
pub const BAR_THICKNESS: u32 = 45;
/// Fraction of each category slot taken by its bar.
pub const CATEGORY_SPACING: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityColors {
    pub fill: Color,
    pub border: Color,
}

const SEVERE: SeverityColors = SeverityColors {
    fill: Color::rgb(0xFF, 0x23, 0x23),
    border: Color::rgb(0xFF, 0x23, 0x23),
};
const MODERATE: SeverityColors = SeverityColors {
    fill: Color::rgb(0xFF, 0xFF, 0x00),
    border: Color::rgb(0xE0, 0xE0, 0x00),
};
const NORMAL: SeverityColors = SeverityColors {
    fill: Color::rgb(0x00, 0xFF, 0x00),
    border: Color::rgb(0x00, 0xCC, 0x00),
};

/// Severe is red, Moderate yellow, everything else green.
pub fn severity_colors(class: &SeverityClass) -> SeverityColors {
    match class {
        SeverityClass::Severe => SEVERE,
        SeverityClass::Moderate => MODERATE,
        SeverityClass::Normal | SeverityClass::Unrecognized(_) => NORMAL,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub class: SeverityClass,
    pub value: f32,
    pub fill: Color,
    pub border: Color,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub label: &'static str,
    pub colors: SeverityColors,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: &'static str,
    pub x_axis_title: &'static str,
    pub y_axis_title: &'static str,
    pub show_y_values: bool,
    pub bar_thickness: u32,
    pub category_spacing: f32,
    pub bars: Vec<Bar>,
    pub legend: Vec<LegendEntry>,
}

impl ChartSpec {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

pub fn legend() -> Vec<LegendEntry> {
    vec![
        LegendEntry {
            label: "Normal",
            colors: NORMAL,
        },
        LegendEntry {
            label: "Moderate",
            colors: MODERATE,
        },
        LegendEntry {
            label: "Severe",
            colors: SEVERE,
        },
    ]
}

/// One bar per result, in the order given.
pub fn render<'a>(results: impl IntoIterator<Item = &'a PredictionResult>) -> ChartSpec {
    let bars = results
        .into_iter()
        .map(|result| {
            let colors = severity_colors(&result.predicted_class);
            Bar {
                label: result.file_name.clone(),
                class: result.predicted_class.clone(),
                value: 1.0,
                fill: colors.fill,
                border: colors.border,
                tooltip: format!("Severity: {}", result.predicted_class),
            }
        })
        .collect();

    ChartSpec {
        title: CHART_TITLE,
        x_axis_title: X_AXIS_TITLE,
        y_axis_title: Y_AXIS_TITLE,
        show_y_values: false,
        bar_thickness: BAR_THICKNESS,
        category_spacing: CATEGORY_SPACING,
        bars,
        legend: legend(),
    }
}
