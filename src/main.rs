use anyhow::Result;
use gas_demand_forecast::{config, pipeline, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    info!(
        input = %cfg.data.input_path.display(),
        output_dir = %cfg.output.dir.display(),
        "starting natural gas demand forecast"
    );

    let summary = pipeline::run(&cfg)?;

    for model in &summary.models {
        info!(
            model = %model.kind,
            mae = model.test_metrics.mae,
            rmse = model.test_metrics.rmse,
            r2 = model.test_metrics.r2,
            table = %model.table_path.display(),
            chart = %model.chart_path.display(),
            "model results"
        );
        if !model.chart_labeled {
            warn!(model = %model.kind, "chart written without labels; set chart.font_path to a TTF font");
        }
    }

    info!(
        train_rows = summary.train_rows,
        test_rows = summary.test_rows,
        "training complete"
    );
    Ok(())
}
