use std::fmt::Write as _;

use rutting_common::{BoundResult, ImageAsset, SeverityCounts};

/// One line per image in submission order, then the per-class counts.
pub fn format_results(assets: &[ImageAsset], results: &[BoundResult]) -> String {
    let name_width = results
        .iter()
        .map(|r| display_name(assets, r).len())
        .max()
        .unwrap_or(0)
        .max("Image".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:>3}  {:<name_width$}  {:<10}  Confidence", "#", "Image", "Severity");
    for (i, result) in results.iter().enumerate() {
        let confidence = result
            .prediction
            .confidence()
            .map(|c| format!("{:.1}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>3}  {:<name_width$}  {:<10}  {}",
            i + 1,
            display_name(assets, result),
            result.prediction.predicted_class,
            confidence
        );
    }

    let counts = SeverityCounts::tally(results.iter().map(|r| &r.prediction.predicted_class));
    let _ = write!(
        out,
        "\n{} images: {} normal, {} moderate, {} severe",
        counts.total(),
        counts.normal,
        counts.moderate,
        counts.severe
    );
    if counts.unrecognized > 0 {
        let _ = write!(out, ", {} unrecognized", counts.unrecognized);
    }
    out.push('\n');
    out
}

fn display_name<'a>(assets: &'a [ImageAsset], result: &'a BoundResult) -> &'a str {
    assets
        .iter()
        .find(|asset| asset.id() == result.asset_id)
        .map(ImageAsset::display_name)
        .unwrap_or(result.prediction.file_name.as_str())
}
