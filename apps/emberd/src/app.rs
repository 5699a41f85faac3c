//! Wires configuration into the flash backend and the control surface.

use std::path::{Path, PathBuf};

use tokio::net::TcpListener;

use ember_flash::ImageFlash;
use ember_rest::{DeviceState, RestServer};

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let flash = ImageFlash::open(
        Path::new(&config.flash_image),
        config.layout.flash_size,
        config.layout.erase_unit,
    )?;

    let store_root = PathBuf::from(&config.store_root);
    std::fs::create_dir_all(&store_root)?;

    let state = DeviceState {
        flash: Box::new(flash),
        partition: config.partition,
        layout: config.layout,
        store_root,
    };

    let listener = TcpListener::bind(&config.listen).await?;
    let server = RestServer::new(state);
    let cancel = server.cancel_token();

    // Ctrl-C stops the accept loop.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    server.run(listener).await?;
    Ok(())
}
