use earmix::MixTimingEvent;
use egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};
use std::collections::VecDeque;

/// Passes kept for the timing graph
pub const TIMING_HISTORY: usize = 300;

/// Format time in microseconds to the most appropriate unit (µs, ms, or s)
fn format_time_auto(time_us: u64) -> String {
    let time_us_f = time_us as f64;

    if time_us < 1_000 {
        format!("{:.2} µs", time_us_f)
    } else if time_us < 1_000_000 {
        format!("{:.2} ms", time_us_f / 1_000.0)
    } else {
        format!("{:.2} s", time_us_f / 1_000_000.0)
    }
}

/// One plotted line of the timing graph
struct Series {
    label: &'static str,
    color: Color32,
    width: f32,
    value: fn(&MixTimingEvent) -> u64,
}

const SERIES: [Series; 3] = [
    Series {
        label: "Total",
        color: Color32::WHITE,
        width: 2.0,
        value: |t| t.total_time_us,
    },
    Series {
        label: "Mixing",
        color: Color32::LIGHT_BLUE,
        width: 1.5,
        value: |t| t.mixing_time_us,
    },
    Series {
        label: "Submit",
        color: Color32::YELLOW,
        width: 1.5,
        value: |t| t.submit_time_us,
    },
];

/// Horizontal bar showing the mixer's published output level.
///
/// `level` is the average absolute sample value; it is drawn on a log scale
/// so quiet distant sources still register.
pub fn draw_level_meter(ui: &mut egui::Ui, level: f32) {
    let normalized = (level / i16::MAX as f32).clamp(0.0, 1.0);
    let db = 20.0 * normalized.max(1e-4).log10();
    let fill = ((db + 80.0) / 80.0).clamp(0.0, 1.0);

    let color = if fill > 0.9 {
        Color32::RED
    } else if fill > 0.7 {
        Color32::YELLOW
    } else {
        Color32::GREEN
    };

    ui.label(format!("Output level: {:.0} ({:.1} dBFS)", level, db));
    ui.add(
        egui::ProgressBar::new(fill)
            .fill(color)
            .desired_width(ui.available_width()),
    );
}

/// Draw a performance profiling widget showing mixer timing history
///
/// # Arguments
/// * `ui` - The egui UI context
/// * `timing_history` - History of mixer timing events
/// * `budget_us` - Mixer cadence (the pass budget) in microseconds
pub fn draw_profiling_widget(
    ui: &mut egui::Ui,
    timing_history: &VecDeque<MixTimingEvent>,
    budget_us: u64,
) {
    ui.collapsing("Mixer Profiling", |ui| {
        let Some(latest) = timing_history.back() else {
            ui.label("No timing data available yet...");
            return;
        };

        let utilization = (latest.total_time_us as f32 / budget_us as f32 * 100.0).min(999.0);

        ui.label(format!(
            "Total: {} ({:.1}% of {})",
            format_time_auto(latest.total_time_us),
            utilization,
            format_time_auto(budget_us)
        ));
        ui.label(format!(
            "Mixing: {}  Submit: {}",
            format_time_auto(latest.mixing_time_us),
            format_time_auto(latest.submit_time_us)
        ));
        ui.label(format!("Instances mixed: {}", latest.mixed_instances));

        if utilization > 90.0 {
            ui.colored_label(Color32::RED, "⚠ Mixer is close to missing its cadence");
        } else if utilization > 70.0 {
            ui.colored_label(Color32::YELLOW, "⚠ High mixer load");
        }

        ui.add_space(6.0);

        let (response, painter) = ui.allocate_painter(
            Vec2::new(ui.available_width(), 160.0),
            egui::Sense::hover(),
        );
        let rect = response.rect;
        painter.rect_filled(rect, 0.0, Color32::from_gray(20));

        if timing_history.len() < 2 {
            return;
        }

        let peak = timing_history
            .iter()
            .map(|t| t.total_time_us)
            .max()
            .unwrap_or(budget_us);
        let max_y = (budget_us as f32 * 1.2).max(peak as f32);

        let budget_y = rect.max.y - (budget_us as f32 / max_y) * rect.height();
        painter.line_segment(
            [Pos2::new(rect.min.x, budget_y), Pos2::new(rect.max.x, budget_y)],
            Stroke::new(2.0, Color32::RED),
        );
        painter.text(
            Pos2::new(rect.max.x - 5.0, budget_y - 5.0),
            egui::Align2::RIGHT_BOTTOM,
            format_time_auto(budget_us),
            egui::FontId::proportional(10.0),
            Color32::RED,
        );

        for series in &SERIES {
            plot(&painter, rect, timing_history, max_y, series);
        }

        for (row, series) in SERIES.iter().enumerate() {
            let y = rect.min.y + 10.0 + row as f32 * 15.0;
            let x = rect.min.x + 10.0;
            painter.line_segment(
                [Pos2::new(x, y), Pos2::new(x + 20.0, y)],
                Stroke::new(series.width, series.color),
            );
            painter.text(
                Pos2::new(x + 25.0, y),
                egui::Align2::LEFT_CENTER,
                series.label,
                egui::FontId::proportional(10.0),
                series.color,
            );
        }
    });
}

fn plot(
    painter: &Painter,
    rect: Rect,
    history: &VecDeque<MixTimingEvent>,
    max_y: f32,
    series: &Series,
) {
    let x_step = rect.width() / (history.len() - 1) as f32;
    let points: Vec<Pos2> = history
        .iter()
        .enumerate()
        .map(|(i, timing)| {
            let value = (series.value)(timing) as f32;
            Pos2::new(
                rect.min.x + i as f32 * x_step,
                rect.max.y - (value / max_y) * rect.height(),
            )
        })
        .collect();

    for window in points.windows(2) {
        painter.line_segment([window[0], window[1]], Stroke::new(series.width, series.color));
    }
}
