use measure_overlay::logging;
use measure_overlay::measure::app;
use measure_overlay::settings::MeasureSettings;

fn main() -> anyhow::Result<()> {
    let loaded = MeasureSettings::resolve_path().and_then(|path| MeasureSettings::load(&path));
    let (settings, load_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(err) => (MeasureSettings::default(), Some(err)),
    };

    logging::init(settings.debug_logging, settings.log_file.clone());
    if let Some(err) = load_error {
        tracing::warn!(?err, "failed to load measure settings; using defaults");
    }

    app::run(settings)?;
    tracing::info!("overlay closed");
    Ok(())
}
