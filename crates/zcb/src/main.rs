use std::sync::Arc;

use zcb_core::{config::Config, store::JsonFileKvStore, telemetry::TelemetryLogger};
use zcb_telegram::router::{self, Adapters};
use zcb_zoom::{ZoomClient, ZoomSettings};

#[tokio::main]
async fn main() -> Result<(), zcb_core::Error> {
    zcb_core::logging::init("zcb")?;

    let cfg = Config::load()?;

    let kv = Arc::new(JsonFileKvStore::open(cfg.store_file.clone()).await?);
    let telemetry = Arc::new(TelemetryLogger::new(cfg.telemetry_log_path.clone()));
    let provider = Arc::new(ZoomClient::new(ZoomSettings::from_config(&cfg))?);

    let state = router::build_state(
        cfg,
        Adapters {
            provider,
            kv,
            telemetry,
        },
    )
    .await
    .map_err(|e| zcb_core::Error::External(format!("telegram setup failed: {e}")))?;

    router::run_polling(state)
        .await
        .map_err(|e| zcb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
