use std::sync::Arc;

use tcb_core::{
    config::Config,
    ports::{FormClient, Store},
};
use tcb_form::{FormHttpClient, FormSettings};
use tcb_sqlite::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), tcb_core::Error> {
    let cfg = Arc::new(Config::load()?);
    tcb_core::logging::init("tcb", &cfg.log_level)?;

    let sqlite = SqliteStore::connect(&cfg.database_url).await?;
    let store: Arc<dyn Store> = Arc::new(sqlite.clone());

    let form: Arc<dyn FormClient> = Arc::new(FormHttpClient::new(FormSettings {
        base_url: cfg.form_base_url.clone(),
        page: cfg.form_page.clone(),
        fetch_timeout: cfg.form_fetch_timeout,
        submit_timeout: cfg.form_submit_timeout,
    })?);

    let result = tcb_telegram::router::run_polling(cfg, store, form)
        .await
        .map_err(|e| tcb_core::Error::External(format!("telegram bot failed: {e}")));

    info!("closing database");
    sqlite.close().await;
    result
}
