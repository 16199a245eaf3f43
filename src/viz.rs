//! 2-D PCA projection of the preprocessed feature space, rendered with Plotters

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_reduction::Pca;
use ndarray::{concatenate, Array2, Axis};
use plotters::prelude::*;

/// Color palette for different clusters
static CLUSTER_COLORS: [RGBColor; 6] = [BLUE, RED, RGBColor(255, 140, 0), GREEN, MAGENTA, CYAN];

/// Points and centroids mapped onto the first two principal components
#[derive(Debug, Clone)]
pub struct Projection {
    pub points: Array2<f64>,
    pub centroids: Array2<f64>,
}

/// Fit a 2-component PCA on `features` and project both the rows and the
/// cluster centroids. A single feature column is paired with a zero axis.
pub fn project(features: &Array2<f64>, centroids: &Array2<f64>) -> crate::Result<Projection> {
    if features.nrows() < 2 {
        anyhow::bail!("Projection needs at least 2 rows, got {}", features.nrows());
    }
    if features.ncols() != centroids.ncols() {
        anyhow::bail!(
            "Centroids have {} columns but features have {}",
            centroids.ncols(),
            features.ncols()
        );
    }

    match features.ncols() {
        0 => anyhow::bail!("Projection needs at least one feature column"),
        1 => Ok(Projection {
            points: pad_zero_axis(features)?,
            centroids: pad_zero_axis(centroids)?,
        }),
        _ => {
            let dataset = DatasetBase::from(features.clone());
            let pca = Pca::params(2).fit(&dataset)?;
            let points: Array2<f64> = pca.predict(features);
            let centroids: Array2<f64> = pca.predict(centroids);
            Ok(Projection { points, centroids })
        }
    }
}

fn pad_zero_axis(x: &Array2<f64>) -> crate::Result<Array2<f64>> {
    let zeros = Array2::<f64>::zeros((x.nrows(), 1));
    Ok(concatenate(Axis(1), &[x.view(), zeros.view()])?)
}

fn cluster_color(cluster: usize) -> &'static RGBColor {
    CLUSTER_COLORS.get(cluster).unwrap_or(&BLACK)
}

/// Scatter plot of projected rows colored by cluster, centroids as squares
pub fn create_cluster_visualization(
    projection: &Projection,
    clusters: &[usize],
    output_path: &str,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    if clusters.len() != projection.points.nrows() {
        anyhow::bail!(
            "{} cluster labels for {} projected points",
            clusters.len(),
            projection.points.nrows()
        );
    }

    let title = plot_title.unwrap_or("Transaction Clusters: PCA Projection of Preprocessed Features");

    let xs = projection.points.column(0);
    let ys = projection.points.column(1);
    let cxs = projection.centroids.column(0);
    let cys = projection.centroids.column(1);
    let all_x = xs.iter().chain(cxs.iter());
    let all_y = ys.iter().chain(cys.iter());

    let x_min = all_x.clone().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let x_max = all_x.fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;
    let y_min = all_y.clone().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.5;
    let y_max = all_y.fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.5;

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Principal Component 1")
        .y_desc("Principal Component 2")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        xs.iter()
            .zip(ys.iter())
            .zip(clusters.iter())
            .map(|((&x, &y), &cluster)| Circle::new((x, y), 4, cluster_color(cluster).filled())),
    )?;

    for (cluster_id, centroid) in projection.centroids.outer_iter().enumerate() {
        let (cx, cy) = (centroid[0], centroid[1]);
        let color = cluster_color(cluster_id);

        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(cx - 0.1, cy - 0.1), (cx + 0.1, cy + 0.1)],
                color.filled(),
            )))?
            .label(format!("Cluster {}", cluster_id))
            .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    tracing::info!(path = output_path, points = clusters.len(), "Cluster projection saved");

    Ok(())
}
