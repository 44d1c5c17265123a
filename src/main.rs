use roadnet_import::app::{AppState, create_app};
use roadnet_import::blob_store::BlobStore;
use roadnet_import::config::{load_config, save_default_config};
use roadnet_import::constants::{CONFIG_PATH, DATA_DIR, DIFFS_DIR, SNAPSHOTS_DIR, UPLOADS_DIR};
use roadnet_import::database::{create_pool, init_database, run_migrations};
use roadnet_import::logging::{init_logging, install_panic_hook};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

fn init_directories() {
    for dir in [&*DATA_DIR, &*UPLOADS_DIR, &*SNAPSHOTS_DIR, &*DIFFS_DIR] {
        std::fs::create_dir_all(dir).ok();
    }
}

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--init-config") {
        match save_default_config(&CONFIG_PATH) {
            Ok(_) => {
                println!("Default configuration saved to {:?}", *CONFIG_PATH);
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to save default configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    init_logging();
    install_panic_hook();

    let config = Arc::new(load_config(&CONFIG_PATH));

    init_directories();

    let pool = create_pool().expect("Failed to create database pool");

    {
        let conn = pool.get().expect("Failed to get connection");
        init_database(&conn).expect("Failed to initialize database");
        run_migrations(&conn).expect("Failed to run migrations");
    }

    let blob_store = BlobStore::new(DATA_DIR.join("blobs"));

    let state = AppState {
        config: Arc::clone(&config),
        pool,
        blob_store,
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Starting roadnet-import on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server failed");
}
