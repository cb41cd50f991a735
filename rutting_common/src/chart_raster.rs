//! Draws a [`ChartSpec`] onto a white RGB canvas.

use ab_glyph::{Font, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::chart::{ChartSpec, SeverityColors};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT: Rgb<u8> = Rgb([40, 40, 40]);
const AXIS: Rgb<u8> = Rgb([120, 120, 120]);

const MARGIN: u32 = 20;
const TITLE_SCALE: f32 = 22.0;
const AXIS_TITLE_SCALE: f32 = 15.0;
const LABEL_SCALE: f32 = 13.0;
const SWATCH: u32 = 14;
const PLOT_HEIGHT: u32 = 240;
/// Bars top out at this share of the plot height.
const BAR_FILL: f32 = 0.8;
const MIN_WIDTH: u32 = 360;

struct Layout {
    width: u32,
    height: u32,
    legend_y: i32,
    y_title_y: i32,
    plot_left: u32,
    plot_top: u32,
    slot_width: u32,
    labels_y: i32,
    x_title_y: i32,
}

impl Layout {
    fn plot_width(&self, bars: usize) -> u32 {
        self.slot_width * bars.max(1) as u32
    }

    fn plot_bottom(&self) -> u32 {
        self.plot_top + PLOT_HEIGHT
    }
}

fn text_width(font: &impl Font, scale: f32, text: &str) -> u32 {
    text_size(PxScale::from(scale), font, text).0
}

fn legend_width(chart: &ChartSpec, font: &impl Font) -> u32 {
    chart
        .legend
        .iter()
        .map(|entry| SWATCH + 6 + text_width(font, LABEL_SCALE, entry.label) + 16)
        .sum()
}

fn layout(chart: &ChartSpec, font: &impl Font) -> Layout {
    let widest_label = chart
        .bars
        .iter()
        .map(|bar| text_width(font, LABEL_SCALE, &bar.label))
        .max()
        .unwrap_or(0);
    let bar_slot = (chart.bar_thickness as f32 / chart.category_spacing).ceil() as u32;
    let slot_width = bar_slot.max(widest_label + 10);

    let legend_y = (MARGIN + TITLE_SCALE as u32 + 10) as i32;
    let y_title_y = legend_y + SWATCH as i32 + 14;
    let plot_top = y_title_y as u32 + AXIS_TITLE_SCALE as u32 + 10;
    let plot_left = MARGIN + 10;
    let labels_y = (plot_top + PLOT_HEIGHT + 6) as i32;
    let x_title_y = labels_y + LABEL_SCALE as i32 + 10;

    let plot_width = slot_width * chart.bars.len().max(1) as u32;
    let width = [
        plot_left + plot_width + MARGIN,
        text_width(font, TITLE_SCALE, chart.title) + 2 * MARGIN,
        legend_width(chart, font) + 2 * MARGIN,
        plot_left + text_width(font, AXIS_TITLE_SCALE, chart.y_axis_title) + MARGIN,
        MIN_WIDTH,
    ]
    .into_iter()
    .max()
    .unwrap_or(MIN_WIDTH);
    let height = x_title_y as u32 + AXIS_TITLE_SCALE as u32 + MARGIN;

    Layout {
        width,
        height,
        legend_y,
        y_title_y,
        plot_left,
        plot_top,
        slot_width,
        labels_y,
        x_title_y,
    }
}

fn draw_centered(canvas: &mut RgbImage, font: &impl Font, scale: f32, center_x: i32, y: i32, text: &str) {
    let width = text_width(font, scale, text) as i32;
    draw_text_mut(canvas, TEXT, center_x - width / 2, y, PxScale::from(scale), font, text);
}

fn draw_box(canvas: &mut RgbImage, rect: Rect, colors: SeverityColors) {
    draw_filled_rect_mut(canvas, rect, colors.fill.to_rgb());
    draw_hollow_rect_mut(canvas, rect, colors.border.to_rgb());
    if rect.width() > 2 && rect.height() > 2 {
        let inner = Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2);
        draw_hollow_rect_mut(canvas, inner, colors.border.to_rgb());
    }
}

/// Renders the chart at its natural size. The canvas has no alpha channel.
pub fn rasterize(chart: &ChartSpec, font: &impl Font) -> RgbImage {
    let layout = layout(chart, font);
    let mut canvas = RgbImage::from_pixel(layout.width, layout.height, WHITE);
    let center_x = (layout.width / 2) as i32;

    draw_centered(&mut canvas, font, TITLE_SCALE, center_x, MARGIN as i32, chart.title);

    let mut x = (layout.width.saturating_sub(legend_width(chart, font)) / 2) as i32;
    for entry in &chart.legend {
        draw_box(
            &mut canvas,
            Rect::at(x, layout.legend_y).of_size(SWATCH, SWATCH),
            entry.colors,
        );
        x += (SWATCH + 6) as i32;
        draw_text_mut(
            &mut canvas,
            TEXT,
            x,
            layout.legend_y,
            PxScale::from(LABEL_SCALE),
            font,
            entry.label,
        );
        x += (text_width(font, LABEL_SCALE, entry.label) + 16) as i32;
    }

    draw_text_mut(
        &mut canvas,
        TEXT,
        layout.plot_left as i32,
        layout.y_title_y,
        PxScale::from(AXIS_TITLE_SCALE),
        font,
        chart.y_axis_title,
    );

    let left = layout.plot_left as f32;
    let bottom = layout.plot_bottom() as f32;
    let right = (layout.plot_left + layout.plot_width(chart.bars.len())) as f32;
    draw_line_segment_mut(&mut canvas, (left, layout.plot_top as f32), (left, bottom), AXIS);
    draw_line_segment_mut(&mut canvas, (left, bottom), (right, bottom), AXIS);

    let bar_height = (PLOT_HEIGHT as f32 * BAR_FILL).round() as u32;
    for (i, bar) in chart.bars.iter().enumerate() {
        let slot_left = layout.plot_left + layout.slot_width * i as u32;
        let slot_center = (slot_left + layout.slot_width / 2) as i32;
        let height = (bar_height as f32 * bar.value.clamp(0.0, 1.0)).round() as u32;
        if height > 0 {
            let rect = Rect::at(
                slot_center - (chart.bar_thickness / 2) as i32,
                (layout.plot_bottom() - height) as i32,
            )
            .of_size(chart.bar_thickness, height);
            draw_box(
                &mut canvas,
                rect,
                SeverityColors {
                    fill: bar.fill,
                    border: bar.border,
                },
            );
        }
        draw_centered(&mut canvas, font, LABEL_SCALE, slot_center, layout.labels_y, &bar.label);
    }

    let plot_center = ((left + right) / 2.0) as i32;
    draw_centered(
        &mut canvas,
        font,
        AXIS_TITLE_SCALE,
        plot_center,
        layout.x_title_y,
        chart.x_axis_title,
    );

    canvas
}
