use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use ::palette::{FromColor, Hsv, Srgb};
use plotters::prelude::*;
use rayon::prelude::*;
use schelling_common::{GridLabels, Snapshot};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin, written by the engine with format = "bincode")
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the rendered PNG files
    #[arg(short, long, default_value = "renders")]
    output_dir: PathBuf,

    /// Side length of one home in pixels
    #[arg(long, default_value_t = 8)]
    cell_px: u32,

    /// Render a map for every snapshot that holds a grid, not only the last one
    #[arg(long)]
    all_frames: bool,

    /// Chart width in pixels
    #[arg(long, default_value_t = 1024)]
    chart_width: u32,

    /// Chart height in pixels
    #[arg(long, default_value_t = 600)]
    chart_height: u32,
}

const EMPTY_COLOR: [u8; 3] = [255, 255, 255];

// Group colours 1..=8; further groups get generated hues.
const GROUP_COLORS: &[[u8; 3]] = &[
    [0x00, 0x3f, 0x5c],
    [0xd4, 0x50, 0x87],
    [0xff, 0xa6, 0x00],
    [0x66, 0x51, 0x91],
    [0xff, 0x7c, 0x43],
    [0x2f, 0x4b, 0x7c],
    [0xf9, 0x5d, 0x6a],
    [0xa0, 0x51, 0x95],
];

/// Colour per label: index 0 (empty) is white, then one colour per group.
fn label_palette(group_count: usize) -> Vec<[u8; 3]> {
    let mut colors = Vec::with_capacity(group_count + 1);
    colors.push(EMPTY_COLOR);
    colors.extend(GROUP_COLORS.iter().take(group_count).copied());

    let extra = group_count.saturating_sub(GROUP_COLORS.len());
    for i in 0..extra {
        // Spread the remaining hues evenly around the wheel
        let hue = (i as f32 + 0.5) / extra as f32 * 360.0;
        let rgb = Srgb::from_color(Hsv::new(hue, 0.7, 0.8));
        colors.push([
            (rgb.red * 255.0) as u8,
            (rgb.green * 255.0) as u8,
            (rgb.blue * 255.0) as u8,
        ]);
    }
    colors
}

/// Draws the grid as `cell_px`-sized squares separated by white lines.
fn render_map(grid: &GridLabels, cell_px: u32, colors: &[[u8; 3]]) -> RgbImage {
    let side = grid.side as u32;
    let size = side * cell_px;
    let mut image = RgbImage::from_pixel(size, size, Rgb(EMPTY_COLOR));
    // Leave a 1px gutter once cells are large enough to show it
    let fill = if cell_px >= 3 { cell_px - 1 } else { cell_px };

    for row in 0..grid.side {
        for col in 0..grid.side {
            let label = grid.get(row, col) as usize;
            let color = colors.get(label).copied().unwrap_or_else(|| {
                warn!("No colour for label {}, drawing it black.", label);
                [0, 0, 0]
            });
            let x0 = col as u32 * cell_px;
            let y0 = row as u32 * cell_px;
            for dy in 0..fill {
                for dx in 0..fill {
                    image.put_pixel(x0 + dx, y0 + dy, Rgb(color));
                }
            }
        }
    }
    image
}

fn read_snapshots(path: &Path) -> Result<Vec<Snapshot>> {
    let input_file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = BufReader::new(input_file);
    bincode::deserialize_from(reader)
        .with_context(|| format!("Failed to decode snapshots from {}", path.display()))
}

/// Mean similarity per recorded iteration.
fn draw_similarity_chart(snapshots: &[Snapshot], path: &Path, size: (u32, u32)) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let max_iteration = snapshots.last().map_or(1, |s| s.iteration.max(1));
    let mut chart = ChartBuilder::on(&root)
        .caption("Mean Similarity Score", ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0u32..max_iteration, -1.0f64..1.0f64)?;

    chart
        .configure_mesh()
        .x_desc("iteration")
        .y_desc("similarity ratio")
        .draw()?;

    let points: Vec<(u32, f64)> = snapshots
        .iter()
        .filter_map(|s| s.mean_similarity.map(|m| (s.iteration, m)))
        .collect();
    chart.draw_series(LineSeries::new(points.iter().copied(), BLACK.stroke_width(2)))?;

    if let Some(&(_, last)) = points.last() {
        chart.draw_series(std::iter::once(Text::new(
            format!("Similarity Ratio: {:.4}", last),
            (0u32, 0.9f64),
            ("sans-serif", 18),
        )))?;
    } else {
        warn!("No snapshot has a defined mean similarity; the chart is empty.");
    }

    root.present()?;
    Ok(())
}

/// Threshold of every group per recorded iteration.
fn draw_threshold_chart(
    snapshots: &[Snapshot],
    colors: &[[u8; 3]],
    path: &Path,
    size: (u32, u32),
) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let max_iteration = snapshots.last().map_or(1, |s| s.iteration.max(1));
    let mut chart = ChartBuilder::on(&root)
        .caption("Thresholds", ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0u32..max_iteration, -1.0f64..1.0f64)?;

    chart
        .configure_mesh()
        .x_desc("iteration")
        .y_desc("threshold")
        .draw()?;

    let group_count = snapshots.first().map_or(0, |s| s.thresholds.len());
    for group in 0..group_count {
        let [r, g, b] = colors.get(group + 1).copied().unwrap_or([0, 0, 0]);
        let color = RGBColor(r, g, b);
        let series = snapshots
            .iter()
            .filter_map(move |s| s.thresholds.get(group).map(|&t| (s.iteration, t)));
        chart
            .draw_series(LineSeries::new(series, color.stroke_width(2)))?
            .label(format!("Group {}", group + 1))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    info!("Starting Schelling Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output_dir.display());

    if args.cell_px == 0 {
        anyhow::bail!("cell_px must be greater than 0.");
    }

    let start_time = Instant::now();
    let snapshots = read_snapshots(&args.input)?;
    info!("Found {} snapshots in the file", snapshots.len());
    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory {}", args.output_dir.display()))?;

    let group_count = snapshots
        .iter()
        .map(|s| s.label_counts.len().saturating_sub(1))
        .max()
        .unwrap_or(0);
    let colors = label_palette(group_count);
    debug!("Palette for {} groups: {:?}", group_count, colors);

    // --- Maps ---
    let with_grid: Vec<&Snapshot> = snapshots.iter().filter(|s| s.grid.is_some()).collect();
    let frames: Vec<&Snapshot> = if args.all_frames {
        with_grid
    } else {
        with_grid.last().copied().into_iter().collect()
    };

    if frames.is_empty() {
        warn!("No snapshot holds a grid (set save_grid_in_snapshot = true). Skipping maps.");
    } else {
        let progress_bar = ProgressBar::new(frames.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} maps ({percent}%) [{eta}]")?
                .progress_chars("#>-"),
        );

        frames.par_iter().try_for_each(|snapshot| -> Result<()> {
            if let Some(grid) = &snapshot.grid {
                let path = args.output_dir.join(format!("map_{:04}.png", snapshot.iteration));
                render_map(grid, args.cell_px, &colors)
                    .save(&path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
            }
            progress_bar.inc(1);
            Ok(())
        })?;
        progress_bar.finish_with_message("Maps rendered");
        info!("Rendered {} maps.", frames.len());
    }

    // --- Charts ---
    let chart_size = (args.chart_width, args.chart_height);
    let similarity_path = args.output_dir.join("similarity.png");
    draw_similarity_chart(&snapshots, &similarity_path, chart_size)
        .with_context(|| format!("Failed to draw {}", similarity_path.display()))?;
    info!("Similarity chart saved to {}", similarity_path.display());

    let thresholds_path = args.output_dir.join("thresholds.png");
    draw_threshold_chart(&snapshots, &colors, &thresholds_path, chart_size)
        .with_context(|| format!("Failed to draw {}", thresholds_path.display()))?;
    info!("Threshold chart saved to {}", thresholds_path.display());

    info!(
        "Rendering finished in {:.2} seconds.",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
