//! Visualization functions using Plotters for cluster analysis

use std::collections::BTreeSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use plotters::prelude::*;

use crate::model::SEGMENT_CLUSTERS;
use crate::pipeline::{AnalysisReport, VisualizationInputs};

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 6] = [RED, BLUE, GREEN, MAGENTA, CYAN, YELLOW];

const HISTOGRAM_BINS: usize = 20;

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS[cluster % CLUSTER_COLORS.len()]
}

/// One histogram bar, `[start, end)` except for the last bin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins spanning the data. A constant series gets one bin of
/// width 1 centred on its value.
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return vec![HistogramBin {
            start: min - 0.5,
            end: max + 0.5,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let index = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[index] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

/// Data range widened by `pad_ratio` of its span on both sides
pub fn padded_range(values: impl IntoIterator<Item = f64>, pad_ratio: f64) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let pad = if max > min { (max - min) * pad_ratio } else { 1.0 };
    (min - pad)..(max + pad)
}

/// Cluster labels that occur in the scatter data, ascending
fn clusters_present(inputs: &VisualizationInputs) -> BTreeSet<usize> {
    inputs.scatter_2d.iter().map(|p| p.cluster).collect()
}

/// 2x2 grid with one histogram per feature
pub fn create_feature_histograms(
    inputs: &VisualizationInputs,
    output_path: &Path,
) -> anyhow::Result<()> {
    let root = BitMapBackend::new(output_path, (1000, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    for (area, distribution) in root.split_evenly((2, 2)).iter().zip(&inputs.distributions) {
        let bins = histogram_bins(&distribution.values, HISTOGRAM_BINS);
        let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
            continue;
        };
        let max_count = bins.iter().map(|b| b.count).max().unwrap_or(1) as f64;

        let mut chart = ChartBuilder::on(area)
            .caption(format!("Histogram of {}", distribution.feature), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(45)
            .build_cartesian_2d(first.start..last.end, 0f64..(max_count * 1.1))?;

        chart
            .configure_mesh()
            .x_desc(distribution.feature)
            .y_desc("Count")
            .draw()?;

        chart.draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], BLUE.mix(0.6).filled())
        }))?;
    }

    root.present()?;
    info!("feature histograms saved to: {}", output_path.display());
    Ok(())
}

/// WCSS against k, with the elbow estimate marked when there is one
pub fn create_elbow_chart(
    inputs: &VisualizationInputs,
    output_path: &Path,
) -> anyhow::Result<()> {
    let points = inputs
        .curve
        .points()
        .iter()
        .map(|p| (p.clusters as f64, p.wcss))
        .collect::<Vec<_>>();
    if points.is_empty() {
        anyhow::bail!("dispersion curve is empty");
    }

    let root = BitMapBackend::new(output_path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Elbow Method For Optimal k", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(
            0.5f64..(points.len() as f64 + 0.5),
            padded_range(points.iter().map(|p| p.1), 0.05),
        )?;

    chart
        .configure_mesh()
        .x_desc("K Value")
        .y_desc("WCSS")
        .x_labels(points.len())
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(points.clone(), RED.stroke_width(2)))?;
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 5, RED.filled())))?;

    if let Some(elbow) = inputs.elbow {
        if let Some(&point) = points.iter().find(|p| p.0 == elbow as f64) {
            chart
                .draw_series(std::iter::once(Cross::new(point, 10, BLACK.stroke_width(2))))?
                .label(format!("elbow: k = {}", elbow))
                .legend(|(x, y)| Cross::new((x, y), 6, BLACK.stroke_width(2)));
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }

    root.present()?;
    info!("elbow chart saved to: {}", output_path.display());
    Ok(())
}

/// Age vs flight distance colored by cluster, centroids in original units
pub fn create_cluster_scatter(
    inputs: &VisualizationInputs,
    output_path: &Path,
) -> anyhow::Result<()> {
    let x_range = padded_range(
        inputs
            .scatter_2d
            .iter()
            .map(|p| p.age)
            .chain(inputs.centroids_2d.iter().map(|c| c.0)),
        0.05,
    );
    let y_range = padded_range(
        inputs
            .scatter_2d
            .iter()
            .map(|p| p.flight_distance)
            .chain(inputs.centroids_2d.iter().map(|c| c.1)),
        0.05,
    );

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Clusters: Age vs Flight Distance", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc("Age")
        .y_desc("Flight Distance")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for cluster in clusters_present(inputs) {
        let color = cluster_color(cluster);
        chart
            .draw_series(
                inputs
                    .scatter_2d
                    .iter()
                    .filter(|p| p.cluster == cluster)
                    .map(|p| Circle::new((p.age, p.flight_distance), 4, color.filled())),
            )?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .draw_series(
            inputs
                .centroids_2d
                .iter()
                .map(|&c| Cross::new(c, 9, BLACK.stroke_width(3))),
        )?
        .label("Centroid")
        .legend(|(x, y)| Cross::new((x, y), 6, BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!("cluster scatter saved to: {}", output_path.display());
    Ok(())
}

/// Age, flight distance and seat comfort in 3-D, one series per cluster
pub fn create_cluster_scatter_3d(
    inputs: &VisualizationInputs,
    output_path: &Path,
) -> anyhow::Result<()> {
    let x_range = padded_range(inputs.scatter_3d.iter().map(|p| p.age), 0.05);
    let y_range = padded_range(inputs.scatter_3d.iter().map(|p| p.flight_distance), 0.05);
    let z_range = padded_range(inputs.scatter_3d.iter().map(|p| p.seat_comfort), 0.05);

    let root = BitMapBackend::new(output_path, (1400, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("3D Clustering Plot", ("sans-serif", 30))
        .margin(20)
        .build_cartesian_3d(x_range, y_range, z_range)?;

    chart.with_projection(|mut pb| {
        pb.yaw = 0.6;
        pb.pitch = 0.35;
        pb.scale = 0.85;
        pb.into_matrix()
    });
    chart.configure_axes().draw()?;

    for cluster in clusters_present(inputs) {
        let color = cluster_color(cluster);
        chart
            .draw_series(
                inputs
                    .scatter_3d
                    .iter()
                    .filter(|p| p.cluster == cluster)
                    .map(|p| {
                        Circle::new((p.age, p.flight_distance, p.seat_comfort), 4, color.filled())
                    }),
            )?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!("3-D cluster scatter saved to: {}", output_path.display());
    Ok(())
}

/// Render every chart into `output_dir` and return the written paths
pub fn generate_visualization_report(
    inputs: &VisualizationInputs,
    output_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let histograms = output_dir.join("feature_histograms.png");
    create_feature_histograms(inputs, &histograms)?;

    let elbow = output_dir.join("elbow.png");
    create_elbow_chart(inputs, &elbow)?;

    let scatter = output_dir.join("clusters_2d.png");
    create_cluster_scatter(inputs, &scatter)?;

    let scatter_3d = output_dir.join("clusters_3d.png");
    create_cluster_scatter_3d(inputs, &scatter_3d)?;

    Ok(vec![histograms, elbow, scatter, scatter_3d])
}

/// Print cluster statistics to console
pub fn print_cluster_summary(report: &AnalysisReport) {
    println!("\n=== Cluster Summary ===");
    println!("Passengers: {}", report.passengers);
    match report.elbow {
        Some(k) => println!(
            "Elbow estimate: {} clusters (segmentation uses {})",
            k, SEGMENT_CLUSTERS
        ),
        None => println!(
            "Elbow estimate: none (segmentation uses {})",
            SEGMENT_CLUSTERS
        ),
    }
    println!("Within-cluster sum of squares: {:.2}", report.segmentation.inertia);

    println!();
    println!("  Cluster | Mean Age | Mean Flight Distance | Mean Seat Comfort | Mean Cleanliness | Passengers");
    println!("  --------|----------|----------------------|-------------------|------------------|-----------");
    for p in &report.summary.profiles {
        println!(
            "  {:7} | {:8.2} | {:20.2} | {:17.2} | {:16.2} | {:10}",
            p.cluster,
            p.mean_age,
            p.mean_flight_distance,
            p.mean_seat_comfort,
            p.mean_cleanliness,
            p.passengers
        );
    }

    println!("\nWCSS by k:");
    for point in report.curve.points() {
        println!("  k = {:2}: {:.4}", point.clusters, point.wcss);
    }

    for diagnostic in &report.diagnostics {
        println!("note: {}", diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ScatterPoint2;
    use crate::search::DispersionCurve;
    use crate::summary::ClusterSummary;

    #[test]
    fn test_histogram_bins_cover_all_values() {
        let values = [1.0, 2.0, 2.0, 3.0, 4.0, 5.0];
        let bins = histogram_bins(&values, 4);

        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].start, 1.0);
        assert_eq!(bins[3].end, 5.0);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), values.len());
        // the maximum falls into the last bin
        assert_eq!(bins[3].count, 2);
    }

    #[test]
    fn test_histogram_of_constant_series() {
        let bins = histogram_bins(&[3.0, 3.0, 3.0], 10);
        assert_eq!(
            bins,
            vec![HistogramBin {
                start: 2.5,
                end: 3.5,
                count: 3
            }]
        );
        assert!(histogram_bins(&[], 10).is_empty());
    }

    #[test]
    fn test_padded_range() {
        let range = padded_range([0.0, 10.0], 0.1);
        assert_eq!(range, -1.0..11.0);

        assert_eq!(padded_range([4.0], 0.1), 3.0..5.0);
        assert_eq!(padded_range(std::iter::empty(), 0.1), 0.0..1.0);
    }

    #[test]
    fn test_clusters_present_is_sorted_and_unique() {
        let point = |cluster| ScatterPoint2 {
            age: 30.0,
            flight_distance: 500.0,
            cluster,
        };
        let inputs = VisualizationInputs {
            distributions: Vec::new(),
            curve: DispersionCurve::default(),
            elbow: None,
            scatter_2d: vec![point(2), point(0), point(2)],
            centroids_2d: Vec::new(),
            scatter_3d: Vec::new(),
            summary: ClusterSummary::default(),
        };
        assert_eq!(clusters_present(&inputs).into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_cluster_colors_wrap() {
        assert_eq!(
            cluster_color(0).rgb(),
            cluster_color(CLUSTER_COLORS.len()).rgb()
        );
    }
}
