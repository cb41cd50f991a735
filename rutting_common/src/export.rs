//! Export of a rendered chart as a dated, captioned PNG.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, PxScale};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DEFAULT_DATE_FORMAT;
use crate::session::BoundResult;
use crate::severity::SeverityCounts;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const HEADER_HEIGHT: u32 = 56;
const PADDING: u32 = 16;
const CAPTION_SCALE: f32 = 20.0;
const DATE_SCALE: f32 = 16.0;

/// Optional route endpoints typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteContext {
    pub start: String,
    pub end: String,
}

impl RouteContext {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start_or_default(&self) -> &str {
        if self.start.is_empty() {
            "Start"
        } else {
            &self.start
        }
    }

    pub fn end_or_default(&self) -> &str {
        if self.end.is_empty() {
            "End"
        } else {
            &self.end
        }
    }

    /// `None` when neither endpoint was given.
    pub fn caption(&self) -> Option<String> {
        if self.start.is_empty() && self.end.is_empty() {
            return None;
        }
        Some(format!(
            "From {} → {}",
            self.start_or_default(),
            self.end_or_default()
        ))
    }
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub file_name: String,
    pub date_stamp: String,
    pub caption: Option<String>,
    pub image: RgbImage,
}

impl ExportArtifact {
    /// Writes the PNG into `dir`, creating it if needed. The file is RGB
    /// without alpha.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {dir:?}"))?;
        let path = dir.join(&self.file_name);
        self.image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {path:?}"))?;
        info!("Saved chart to {path:?}");
        Ok(path)
    }

    /// Writes the bound results next to the PNG, same stem, `.json` extension.
    pub fn save_results_json(
        &self,
        dir: &Path,
        route: &RouteContext,
        results: &[BoundResult],
    ) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct Sidecar<'a> {
            date: &'a str,
            route: &'a RouteContext,
            counts: SeverityCounts,
            results: &'a [BoundResult],
        }

        let sidecar = Sidecar {
            date: &self.date_stamp,
            route,
            counts: SeverityCounts::tally(results.iter().map(|r| &r.prediction.predicted_class)),
            results,
        };
        let path = dir.join(&self.file_name).with_extension("json");
        let json = serde_json::to_vec_pretty(&sidecar).context("Failed to serialize results")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {path:?}"))?;
        info!("Saved results to {path:?}");
        Ok(path)
    }
}

/// Replaces characters that cannot appear in a file name on common platforms.
fn sanitize_file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// `rutting_{start}_{end}_{date}.png`, with "Start"/"End" for empty endpoints.
pub fn artifact_file_name(route: &RouteContext, date_stamp: &str) -> String {
    format!(
        "rutting_{}_{}_{}.png",
        sanitize_file_component(route.start_or_default()),
        sanitize_file_component(route.end_or_default()),
        sanitize_file_component(date_stamp)
    )
}

fn try_format(timestamp: NaiveDateTime, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", timestamp.format(format)).ok()?;
    Some(out)
}

pub struct ExportComposer<F> {
    font: F,
    date_format: String,
}

impl<F: Font> ExportComposer<F> {
    /// Fails if `date_format` is not a usable chrono format string.
    pub fn new(font: F, date_format: impl Into<String>) -> Result<Self> {
        let date_format = date_format.into();
        let sample = NaiveDate::from_ymd_opt(2024, 12, 31)
            .and_then(|date| date.and_hms_opt(23, 59, 59))
            .context("Failed to build sample date")?;
        try_format(sample, &date_format)
            .with_context(|| format!("Invalid date format {date_format:?}"))?;
        Ok(Self { font, date_format })
    }

    pub fn format_date(&self, timestamp: NaiveDateTime) -> String {
        try_format(timestamp, &self.date_format).unwrap_or_else(|| {
            warn!("Date format {:?} failed, using default", self.date_format);
            timestamp.format(DEFAULT_DATE_FORMAT).to_string()
        })
    }

    /// Builds the export image: a white header band with the optional route
    /// caption on the left and the date on the right, the chart pasted
    /// unchanged beneath it. Without a chart there is nothing to export.
    pub fn compose(
        &self,
        chart: Option<&RgbImage>,
        route: &RouteContext,
        timestamp: NaiveDateTime,
    ) -> Option<ExportArtifact> {
        let chart = chart?;
        let date_stamp = self.format_date(timestamp);
        let caption = route.caption();

        let date_width = text_size(PxScale::from(DATE_SCALE), &self.font, &date_stamp).0;
        let caption_width = caption
            .as_deref()
            .map(|text| text_size(PxScale::from(CAPTION_SCALE), &self.font, text).0)
            .unwrap_or(0);
        let width = chart
            .width()
            .max(caption_width + date_width + 3 * PADDING);
        let height = HEADER_HEIGHT + chart.height();

        let mut canvas = RgbImage::from_pixel(width, height, WHITE);
        if let Some(text) = caption.as_deref() {
            draw_text_mut(
                &mut canvas,
                TEXT,
                PADDING as i32,
                PADDING as i32,
                PxScale::from(CAPTION_SCALE),
                &self.font,
                text,
            );
        }
        draw_text_mut(
            &mut canvas,
            TEXT,
            (width - PADDING - date_width) as i32,
            (PADDING + 2) as i32,
            PxScale::from(DATE_SCALE),
            &self.font,
            &date_stamp,
        );
        imageops::replace(&mut canvas, chart, 0, i64::from(HEADER_HEIGHT));

        Some(ExportArtifact {
            file_name: artifact_file_name(route, &date_stamp),
            date_stamp,
            caption,
            image: canvas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetId, AssetOrigin};
    use crate::classifier::PredictionResult;
    use crate::font::default_font;

    fn new_year() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn composer() -> ExportComposer<ab_glyph::FontArc> {
        ExportComposer::new(default_font().unwrap(), DEFAULT_DATE_FORMAT).unwrap()
    }

    fn striped_chart() -> RgbImage {
        RgbImage::from_fn(120, 80, |x, y| Rgb([(x * 2) as u8, (y * 3) as u8, 77]))
    }

    #[test]
    fn test_caption_rules() {
        assert_eq!(RouteContext::default().caption(), None);
        assert_eq!(
            RouteContext::new("A", "").caption().as_deref(),
            Some("From A → End")
        );
        assert_eq!(
            RouteContext::new("", "B").caption().as_deref(),
            Some("From Start → B")
        );
    }

    #[test]
    fn test_compose_start_only() {
        let chart = striped_chart();
        let artifact = composer()
            .compose(Some(&chart), &RouteContext::new("A", ""), new_year())
            .unwrap();

        assert_eq!(artifact.caption.as_deref(), Some("From A → End"));
        assert_eq!(artifact.date_stamp, "2024-01-01");
        assert!(artifact.file_name.contains("A_End_2024-01-01"));
        assert_eq!(artifact.file_name, "rutting_A_End_2024-01-01.png");
    }

    #[test]
    fn test_compose_copies_chart_pixels_unchanged() {
        let chart = striped_chart();
        let artifact = composer()
            .compose(Some(&chart), &RouteContext::default(), new_year())
            .unwrap();

        assert_eq!(artifact.caption, None);
        assert_eq!(artifact.image.height(), chart.height() + HEADER_HEIGHT);
        for (x, y, pixel) in chart.enumerate_pixels() {
            assert_eq!(artifact.image.get_pixel(x, y + HEADER_HEIGHT), pixel);
        }
        assert_eq!(*artifact.image.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn test_saved_export_is_opaque() {
        let dir = std::env::temp_dir().join(format!("rutting-opaque-{}", std::process::id()));
        let chart = RgbImage::from_pixel(300, 40, WHITE);
        let artifact = composer()
            .compose(Some(&chart), &RouteContext::new("A", ""), new_year())
            .unwrap();

        let path = artifact.save(&dir).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.color(), image::ColorType::Rgb8);
        assert!(reloaded.to_rgba8().pixels().all(|p| p.0[3] == 255));
        // The caption and date did draw something.
        assert!(reloaded.to_rgb8().pixels().any(|p| *p != WHITE));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_date_is_right_aligned() {
        let chart = RgbImage::from_pixel(600, 40, WHITE);
        let artifact = composer()
            .compose(Some(&chart), &RouteContext::default(), new_year())
            .unwrap();

        let header_ink: Vec<u32> = (0..HEADER_HEIGHT)
            .flat_map(|y| (0..artifact.image.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| *artifact.image.get_pixel(x, y) != WHITE)
            .map(|(x, _)| x)
            .collect();
        assert!(!header_ink.is_empty());
        assert!(header_ink.iter().all(|&x| x > 600 / 2));
    }

    #[test]
    fn test_no_chart_is_noop() {
        assert!(composer()
            .compose(None, &RouteContext::new("A", "B"), new_year())
            .is_none());
    }

    #[test]
    fn test_file_name_sanitizes_route_only_in_name() {
        let chart = striped_chart();
        let route = RouteContext::new("I-95/North", "Exit 4: \"Mill\"");
        let artifact = composer().compose(Some(&chart), &route, new_year()).unwrap();

        assert_eq!(artifact.file_name, "rutting_I-95_North_Exit 4_ _Mill__2024-01-01.png");
        assert_eq!(
            artifact.caption.as_deref(),
            Some("From I-95/North → Exit 4: \"Mill\"")
        );
    }

    #[test]
    fn test_custom_date_format() {
        let composer = ExportComposer::new(default_font().unwrap(), "%d/%m/%Y").unwrap();
        let artifact = composer
            .compose(Some(&striped_chart()), &RouteContext::default(), new_year())
            .unwrap();
        assert_eq!(artifact.date_stamp, "01/01/2024");
        assert_eq!(artifact.file_name, "rutting_Start_End_01_01_2024.png");
    }

    #[test]
    fn test_invalid_date_format_is_rejected() {
        assert!(ExportComposer::new(default_font().unwrap(), "%Q").is_err());
    }

    #[test]
    fn test_save_png_and_sidecar() {
        let dir = std::env::temp_dir().join(format!("rutting-export-{}", std::process::id()));
        let route = RouteContext::new("A", "B");
        let artifact = composer()
            .compose(Some(&striped_chart()), &route, new_year())
            .unwrap();
        let results = vec![BoundResult {
            asset_id: AssetId {
                origin: AssetOrigin::FileUpload,
                seq: 1,
            },
            prediction: PredictionResult::new("a.png", "Severe"),
        }];

        let png = artifact.save(&dir).unwrap();
        let json = artifact.save_results_json(&dir, &route, &results).unwrap();

        let reloaded = image::open(&png).unwrap().to_rgb8();
        assert_eq!(reloaded, artifact.image);
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&json).unwrap()).unwrap();
        assert_eq!(value["counts"]["severe"], 1);
        assert_eq!(value["results"][0]["prediction"]["predictedClass"], "Severe");
        assert_eq!(value["route"]["start"], "A");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
