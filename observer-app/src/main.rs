use envconfig::Envconfig;
use eyre::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use observer_app::buildinfo::BuildInfo;
use observer_app::config::Config;
use observer_app::{logging, App};

async fn shutdown_signal(token: CancellationToken) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(err) => {
            error!("failed to register SIGTERM handler: {err}");
            None
        }
    };
    let terminate = async {
        match term.as_mut() {
            Some(term) => {
                term.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()?;
    logging::init(&config.log)?;

    let build = BuildInfo::from_env()
        .with_extra("client_version", youless_client::VERSION)
        .with_extra("observer_version", youless_observer::VERSION);
    info!(version = %build.version, revision = %build.revision, "starting");

    let app = App::new(&config, tracing::info_span!("observer"), build)?;

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    let run = app.run(token.clone()).await;
    if let Err(err) = &run {
        error!("run failed: {err}");
    }
    token.cancel();

    let shutdown = app.shutdown(config.shutdown_timeout.0).await;
    run?;
    shutdown?;
    Ok(())
}
