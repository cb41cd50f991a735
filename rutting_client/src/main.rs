mod capture;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use capture_common::CaptureSource;
use clap::Parser;
use rutting_common::chart_raster::rasterize;
use rutting_common::font::load_font;
use rutting_common::{
    render, Config, ExportComposer, FileInput, HttpClassifier, InferenceSession, RouteContext,
};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(about = "Classify pavement rutting severity for a batch of road images")]
pub struct Args {
    /// Image files (.jpeg/.jpg/.png) to classify, in submission order.
    files: Vec<PathBuf>,
    /// Inference endpoint receiving the multipart batch.
    #[arg(long)]
    endpoint: Option<String>,
    /// Request timeout in seconds; 0 waits indefinitely.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Capture source: a device path like "/dev/video0", "webcam", "test"
    /// for the gstreamer test pattern or "fake" for in-memory frames.
    #[arg(long)]
    camera: Option<String>,
    /// Number of camera snapshots to add after the files.
    #[arg(long, default_value_t = 0)]
    captures: usize,
    /// Delay between consecutive snapshots.
    #[arg(long, default_value_t = 500)]
    capture_interval_ms: u64,
    /// Route start, shown in the export caption and file name.
    #[arg(long, default_value = "")]
    start: String,
    /// Route end, shown in the export caption and file name.
    #[arg(long, default_value = "")]
    end: String,
    /// Directory the exported chart is written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Also write the results as JSON next to the chart.
    #[arg(long, action, default_value = "false")]
    json: bool,
}

impl Args {
    /// Flags take precedence over `RUTTING_*` environment variables.
    fn apply_to(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(camera) = &self.camera {
            config.camera = camera.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warn,rutting_client=info,rutting_common=info,capture_common=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    args.apply_to(&mut config);
    tracing::debug!("{config:?}");

    let session = InferenceSession::new();

    for path in &args.files {
        match FileInput::read(path) {
            Ok(file) => {
                session.add_from_files([file]);
            }
            Err(err) => tracing::warn!("Skipping {path:?}: {err:#}"),
        }
    }

    if args.captures > 0 {
        let source: CaptureSource = config.camera.parse()?;
        let snapshots = capture::take_snapshots(
            source,
            config.capture_width,
            config.capture_height,
            args.captures,
            Duration::from_millis(args.capture_interval_ms),
        )
        .await;
        for frame in snapshots.frames {
            let id = session.add_from_capture(frame);
            tracing::info!("Captured {id}");
        }
        if let Some(err) = snapshots.error {
            tracing::warn!("Capture failed: {err}");
            eprintln!("{}", err.user_message());
        }
    }

    let classifier = HttpClassifier::from_config(&config)?;
    let results = match session.submit(&classifier).await {
        Ok(results) => results,
        Err(err) => {
            eprintln!("{}", err.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    print!("{}", report::format_results(&session.assets(), &results));

    let font = load_font(config.font_path.as_deref())?;
    let chart = rasterize(&render(results.iter().map(|r| &r.prediction)), &font);
    let composer = ExportComposer::new(font, config.date_format.clone())?;
    let route = RouteContext::new(args.start, args.end);

    let Some(artifact) = composer.compose(Some(&chart), &route, chrono::Local::now().naive_local())
    else {
        return Ok(ExitCode::SUCCESS);
    };
    let png = artifact
        .save(&config.output_dir)
        .context("Failed to export chart")?;
    println!("Chart saved to {}", png.display());

    if args.json {
        let json = artifact
            .save_results_json(&config.output_dir, &route, &results)
            .context("Failed to export results")?;
        println!("Results saved to {}", json.display());
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "rutting_client",
            "a.png",
            "--endpoint",
            "http://backend:9000/predict/",
            "--timeout-secs",
            "0",
            "--camera",
            "fake",
            "--captures",
            "2",
            "--start",
            "A",
        ]);
        let mut config = Config::default();
        args.apply_to(&mut config);

        assert_eq!(args.files, [PathBuf::from("a.png")]);
        assert_eq!(config.endpoint, "http://backend:9000/predict/");
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.camera, "fake");
        assert_eq!(args.captures, 2);
        assert_eq!(args.start, "A");
        assert_eq!(args.end, "");
        assert!(!args.json);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::parse_from(["rutting_client"]);
        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config, Config::default());
        assert_eq!(args.capture_interval_ms, 500);
    }
}
